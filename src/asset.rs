use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, future};
use image::DynamicImage;
use tracing::{debug, instrument};

use crate::config::RequestSettings;
use crate::error::{LoaderError, Result};
use crate::imaging;
use crate::platform::{
    ContentMode, DeliveryMode, FrameRequest, ImageData, ImageRequestOptions, PhotoPlatform,
    PlatformAsset, PlaybackStyle, ProgressHandler, ResultInfo, Size, VideoAsset, VideoRequestOptions,
};
use crate::request::{self, RequestStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoAssetType {
    Photo,
    Video,
}

impl PhotoAssetType {
    pub fn uniform_type_identifier(&self) -> &'static str {
        match self {
            Self::Photo => "public.image",
            Self::Video => "public.movie",
        }
    }
}

impl fmt::Display for PhotoAssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photo => f.write_str("photo"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// One photo or video in the library.
#[derive(Clone)]
pub struct PhotoAsset {
    platform: Arc<dyn PhotoPlatform>,
    asset: Arc<PlatformAsset>,
    settings: Arc<RequestSettings>,
}

impl fmt::Debug for PhotoAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoAsset")
            .field("id", &self.id())
            .field("type", &self.asset_type())
            .finish()
    }
}

impl PhotoAsset {
    pub fn new(platform: Arc<dyn PhotoPlatform>, asset: Arc<PlatformAsset>) -> Self {
        Self::with_settings(platform, asset, Arc::new(RequestSettings::default()))
    }

    pub fn with_settings(
        platform: Arc<dyn PhotoPlatform>,
        asset: Arc<PlatformAsset>,
        settings: Arc<RequestSettings>,
    ) -> Self {
        Self {
            platform,
            asset,
            settings,
        }
    }

    pub fn id(&self) -> &str {
        &self.asset.local_identifier
    }

    pub fn asset_type(&self) -> PhotoAssetType {
        match self.asset.playback_style {
            PlaybackStyle::Video => PhotoAssetType::Video,
            _ => PhotoAssetType::Photo,
        }
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.asset.pixel_width, self.asset.pixel_height)
    }

    pub fn platform_asset(&self) -> &PlatformAsset {
        &self.asset
    }

    /// Fill-cropped thumbnail at `size`.
    ///
    /// Degraded previews are emitted before the final image. A size with a
    /// non-positive dimension yields a single `None` without asking the platform.
    pub fn thumb_image(&self, size: Size) -> BoxStream<'static, Result<Option<DynamicImage>>> {
        if size.is_empty() {
            debug!(asset = %self.id(), ?size, "empty thumbnail size; skipping request");
            return stream::once(future::ready(Ok(None))).boxed();
        }
        let options = ImageRequestOptions {
            network_access_allowed: self.settings.network_access_allowed,
            delivery_mode: DeliveryMode::Opportunistic,
            synchronous: false,
        };
        let platform = Arc::clone(&self.platform);
        let asset = Arc::clone(&self.asset);
        RequestStream::start(&self.platform, move |sink| {
            platform.request_image(
                &asset,
                size,
                ContentMode::AspectFill,
                &options,
                Box::new(move |image: Option<DynamicImage>, info: ResultInfo| {
                    if let Some(error) = info.error {
                        sink.fail(error.into());
                        return;
                    }
                    if let Some(image) = image {
                        sink.next(Some(image));
                    }
                    if !info.degraded {
                        sink.finish();
                    }
                }),
            )
        })
        .boxed()
    }

    /// Full-resolution image, decoded and rotated upright.
    ///
    /// `progress` receives download progress in `0.0..=1.0`. The stream fails
    /// with [`LoaderError::Timeout`] if no result arrives within the configured
    /// timeout. Undecodable data yields `None`.
    #[instrument(skip_all, fields(asset = %self.id()))]
    pub fn original_image<F>(&self, progress: F) -> BoxStream<'static, Result<Option<DynamicImage>>>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let options = ImageRequestOptions {
            network_access_allowed: self.settings.network_access_allowed,
            delivery_mode: DeliveryMode::HighQualityFormat,
            synchronous: true,
        };
        let progress: ProgressHandler = Arc::new(progress);
        let platform = Arc::clone(&self.platform);
        let asset = Arc::clone(&self.asset);
        let data: RequestStream<ImageData> = RequestStream::start(&self.platform, move |sink| {
            platform.request_image_data(
                &asset,
                &options,
                Some(progress),
                Box::new(move |data: Option<ImageData>, info: ResultInfo| {
                    if let Some(error) = info.error {
                        sink.fail(error.into());
                    } else if let Some(data) = data {
                        sink.next(data);
                        sink.finish();
                    }
                }),
            )
        });
        let decoded = data
            .then(|delivered| async move {
                let data = delivered?;
                let image = tokio::task::spawn_blocking(move || {
                    imaging::decode_oriented(&data.bytes, data.orientation)
                })
                .await?;
                Ok::<_, LoaderError>(image)
            })
            .boxed();
        request::with_timeout(decoded, self.settings.original_image_timeout).boxed()
    }

    /// The playable video behind this asset. Meaningful for videos only.
    pub fn video_asset(&self) -> BoxStream<'static, Result<Option<Arc<dyn VideoAsset>>>> {
        if self.asset_type() != PhotoAssetType::Video {
            debug!(asset = %self.id(), "requesting video for a non-video asset");
        }
        let options = VideoRequestOptions {
            network_access_allowed: self.settings.network_access_allowed,
        };
        let platform = Arc::clone(&self.platform);
        let asset = Arc::clone(&self.asset);
        RequestStream::start(&self.platform, move |sink| {
            platform.request_video(
                &asset,
                &options,
                Box::new(move |video: Option<Arc<dyn VideoAsset>>, info: ResultInfo| {
                    if let Some(error) = info.error {
                        sink.fail(error.into());
                        return;
                    }
                    sink.next(video);
                    sink.finish();
                }),
            )
        })
        .boxed()
    }

    /// Still frame taken from the video at the configured offset.
    ///
    /// A missing video or a failed extraction yields `None`.
    pub fn generate_video_thumb(&self) -> BoxStream<'static, Result<Option<DynamicImage>>> {
        let frame = FrameRequest::exact(self.settings.video_thumbnail_offset);
        let id = self.id().to_owned();
        self.video_asset()
            .then(move |delivered| {
                let id = id.clone();
                async move {
                    let Some(video) = delivered? else {
                        return Ok(None);
                    };
                    match tokio::task::spawn_blocking(move || video.copy_frame(frame)).await? {
                        Ok(image) => Ok::<_, LoaderError>(Some(image)),
                        Err(err) => {
                            debug!(asset = %id, %err, "frame extraction failed");
                            Ok(None)
                        }
                    }
                }
            })
            .boxed()
    }
}
