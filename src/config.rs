use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::platform::AccessLevel;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Root directory served by the local photo library.
    pub library_path: PathBuf,
    /// Watch the library for changes and push refreshed album lists.
    pub watch_changes: bool,
    /// Options applied to every asset request.
    pub requests: RequestSettings,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.library_path.as_os_str().is_empty(),
            "library-path must be set"
        );
        self.requests
            .validate()
            .context("invalid request settings")?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            library_path: PathBuf::new(),
            watch_changes: true,
            requests: RequestSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RequestSettings {
    /// Time allowed for an original image to arrive, from subscription.
    #[serde(with = "humantime_serde")]
    pub original_image_timeout: Duration,
    /// Offset of the frame used as a video thumbnail.
    #[serde(with = "humantime_serde")]
    pub video_thumbnail_offset: Duration,
    /// Allow the platform to download assets that are not stored locally.
    pub network_access_allowed: bool,
    /// Access level asked for when requesting authorization.
    pub access_level: AccessLevel,
}

impl RequestSettings {
    const fn default_original_image_timeout() -> Duration {
        Duration::from_secs(60)
    }

    const fn default_video_thumbnail_offset() -> Duration {
        Duration::from_millis(750)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.original_image_timeout > Duration::ZERO,
            "requests.original-image-timeout must be positive"
        );
        Ok(())
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            original_image_timeout: Self::default_original_image_timeout(),
            video_thumbnail_offset: Self::default_video_thumbnail_offset(),
            network_access_allowed: true,
            access_level: AccessLevel::default(),
        }
    }
}
