//! Directory scanning utilities for the local library.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;
use walkdir::{DirEntry, WalkDir};

use super::{AssetSourceType, PlatformAsset, PlaybackStyle};

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tif", "tiff"];
const ANIMATED_EXTS: &[&str] = &["gif"];
const VIDEO_EXTS: &[&str] = &["mp4", "mov", "m4v"];

/// Playback style implied by `path`'s extension, or `None` for non-media files.
#[must_use]
pub fn playback_style(path: &Path) -> Option<PlaybackStyle> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let ext = ext.as_str();
    if IMAGE_EXTS.contains(&ext) {
        Some(PlaybackStyle::Image)
    } else if ANIMATED_EXTS.contains(&ext) {
        Some(PlaybackStyle::ImageAnimated)
    } else if VIDEO_EXTS.contains(&ext) {
        Some(PlaybackStyle::Video)
    } else {
        None
    }
}

/// Uniform type identifier for the file at `path`.
pub fn uniform_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let uti = match ext.as_str() {
        "jpg" | "jpeg" => "public.jpeg",
        "png" => "public.png",
        "webp" => "org.webmproject.webp",
        "gif" => "com.compuserve.gif",
        "bmp" => "com.microsoft.bmp",
        "tif" | "tiff" => "public.tiff",
        "mp4" => "public.mpeg-4",
        "mov" => "com.apple.quicktime-movie",
        "m4v" => "com.apple.m4v-video",
        _ => return None,
    };
    Some(uti)
}

/// All media files below `dir`, skipping hidden directories.
pub fn media_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !should_skip_dir(e))
        .flatten()
        .filter(|e| e.file_type().is_file() && playback_style(e.path()).is_some())
        .map(DirEntry::into_path)
        .collect()
}

/// Describe the media file at `path` as an asset identified relative to `root`.
pub fn describe(root: &Path, path: &Path) -> Option<PlatformAsset> {
    let style = playback_style(path)?;
    let relative = path.strip_prefix(root).ok()?;
    let local_identifier = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let metadata = fs::metadata(path).ok()?;
    let creation_date = metadata.created().or_else(|_| metadata.modified()).ok();
    let (pixel_width, pixel_height) = match style {
        PlaybackStyle::Video => (0, 0),
        _ => image::image_dimensions(path).unwrap_or_else(|err| {
            trace!(path = %path.display(), %err, "could not read dimensions");
            (0, 0)
        }),
    };
    Some(PlatformAsset {
        local_identifier,
        pixel_width,
        pixel_height,
        playback_style: style,
        creation_date,
        source_type: AssetSourceType::UserLibrary,
        duration: None,
    })
}

/// Newest modification time among media below `dir`.
pub fn newest_modification(dir: &Path) -> Option<SystemTime> {
    media_files(dir)
        .iter()
        .filter_map(|p| fs::metadata(p).and_then(|m| m.modified()).ok())
        .max()
}

/// Join a `/`-separated identifier onto `root`, refusing anything that
/// would escape it.
pub fn resolve(root: &Path, identifier: &str) -> Option<PathBuf> {
    let relative = Path::new(identifier);
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    (contained && !identifier.is_empty()).then(|| root.join(relative))
}

fn should_skip_dir(entry: &DirEntry) -> bool {
    // Never skip the root; tempfile roots can be dot-dirs.
    if entry.depth() == 0 {
        return false;
    }
    if !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}
