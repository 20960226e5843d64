//! The media library service the loader adapts.
//!
//! Everything the loader knows about a photo library goes through
//! [`PhotoPlatform`]: synchronous fetches that return ordered [`FetchResult`]s,
//! callback-based requests that hand back a cancellable [`RequestId`], the
//! authorization prompt, and change notification. Results are delivered on
//! whatever thread the platform chooses.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use image::DynamicImage;
use serde::Deserialize;

use crate::error::PlatformError;

pub mod local;
pub mod scan;
pub mod watch;

/// Opaque handle for an in-flight platform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub i32);

/// Handle for a registered change observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackStyle {
    Unsupported,
    Image,
    ImageAnimated,
    LivePhoto,
    Video,
    VideoLooping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetSourceType {
    UserLibrary,
    CloudShared,
    ITunesSynced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Album,
    SmartAlbum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionSubtype {
    Any,
    SmartAlbumUserLibrary,
    SmartAlbumFavorites,
}

/// A single photo or video as described by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformAsset {
    pub local_identifier: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub playback_style: PlaybackStyle,
    pub creation_date: Option<SystemTime>,
    pub source_type: AssetSourceType,
    pub duration: Option<Duration>,
}

/// An album or smart album.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetCollection {
    pub local_identifier: String,
    pub localized_title: Option<String>,
    pub kind: CollectionKind,
    pub subtype: CollectionSubtype,
    pub end_date: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreationDate,
    EndDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortDescriptor {
    pub key: SortKey,
    pub ascending: bool,
}

impl SortDescriptor {
    pub const fn descending(key: SortKey) -> Self {
        Self {
            key,
            ascending: false,
        }
    }
}

/// Filtering and ordering applied by the platform to a fetch.
///
/// An empty `include_source_types` means every source type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub sort: Option<SortDescriptor>,
    pub include_source_types: Vec<AssetSourceType>,
}

impl FetchOptions {
    pub fn includes(&self, source: AssetSourceType) -> bool {
        self.include_source_types.is_empty() || self.include_source_types.contains(&source)
    }
}

/// Ordered, indexable result of a synchronous fetch.
#[derive(Debug)]
pub struct FetchResult<T> {
    items: Vec<Arc<T>>,
}

impl<T> Clone for FetchResult<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> Default for FetchResult<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> FetchResult<T> {
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn object_at(&self, index: usize) -> Option<&Arc<T>> {
        self.items.get(index)
    }

    pub fn first_object(&self) -> Option<&Arc<T>> {
        self.items.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.iter()
    }
}

impl<T> FromIterator<T> for FetchResult<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

/// Target size of an image request, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True unless both dimensions are strictly positive. NaN counts as empty.
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    #[default]
    AspectFit,
    AspectFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Degraded previews may precede the final result.
    #[default]
    Opportunistic,
    HighQualityFormat,
    FastFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageRequestOptions {
    pub network_access_allowed: bool,
    pub delivery_mode: DeliveryMode,
    /// Ask the platform to block its worker until the final result is ready.
    pub synchronous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoRequestOptions {
    pub network_access_allowed: bool,
}

/// Metadata accompanying every request callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultInfo {
    pub error: Option<PlatformError>,
    /// Set on low-fidelity previews that will be followed by more results.
    pub degraded: bool,
}

impl ResultInfo {
    pub fn final_result() -> Self {
        Self::default()
    }

    pub fn degraded() -> Self {
        Self {
            error: None,
            degraded: true,
        }
    }

    pub fn failed(error: PlatformError) -> Self {
        Self {
            error: Some(error),
            degraded: false,
        }
    }
}

/// EXIF-style orientation of image data, named after the display transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

impl Orientation {
    /// Map an EXIF orientation tag (1..=8); anything else is `Up`.
    pub fn from_exif(value: u16) -> Self {
        match value {
            2 => Self::UpMirrored,
            3 => Self::Down,
            4 => Self::DownMirrored,
            5 => Self::LeftMirrored,
            6 => Self::Right,
            7 => Self::RightMirrored,
            8 => Self::Left,
            _ => Self::Up,
        }
    }
}

/// Raw encoded bytes of an asset's full-resolution image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub uniform_type: Option<String>,
    pub orientation: Orientation,
}

/// Parameters for extracting a still frame from a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest {
    pub at: Duration,
    pub tolerance_before: Duration,
    pub tolerance_after: Duration,
    pub apply_track_transform: bool,
}

impl FrameRequest {
    /// The frame exactly at `at`, with the track transform applied.
    pub const fn exact(at: Duration) -> Self {
        Self {
            at,
            tolerance_before: Duration::ZERO,
            tolerance_after: Duration::ZERO,
            apply_track_transform: true,
        }
    }
}

/// A playable video delivered by the platform.
pub trait VideoAsset: Send + Sync {
    fn duration(&self) -> Option<Duration>;

    /// Synchronously decode one frame.
    fn copy_frame(&self, request: FrameRequest) -> Result<DynamicImage, PlatformError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    AddOnly,
    ReadWrite,
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::ReadWrite
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
    Limited,
}

impl AuthorizationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::NotDetermined => "not-determined",
            Self::Restricted => "restricted",
            Self::Denied => "denied",
            Self::Authorized => "authorized",
            Self::Limited => "limited",
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What changed in the library, as far as the platform reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryChange {
    pub identifiers: Vec<String>,
}

pub type ImageCallback = Box<dyn FnMut(Option<DynamicImage>, ResultInfo) + Send>;
pub type ImageDataCallback = Box<dyn FnMut(Option<ImageData>, ResultInfo) + Send>;
pub type VideoCallback = Box<dyn FnMut(Option<Arc<dyn VideoAsset>>, ResultInfo) + Send>;
pub type AuthorizationCallback = Box<dyn FnMut(AuthorizationStatus) + Send>;
pub type ProgressHandler = Arc<dyn Fn(f64) + Send + Sync>;
pub type ChangeObserver = Arc<dyn Fn(&LibraryChange) + Send + Sync>;

/// A host media library service.
///
/// Request methods return `None` when no cancellable request was issued.
/// Callbacks may be invoked from any thread, possibly before the request
/// method returns, and may fire more than once.
pub trait PhotoPlatform: Send + Sync + 'static {
    fn fetch_asset_collections(
        &self,
        kind: CollectionKind,
        subtype: CollectionSubtype,
        options: &FetchOptions,
    ) -> FetchResult<AssetCollection>;

    fn fetch_assets(
        &self,
        collection: &AssetCollection,
        options: &FetchOptions,
    ) -> FetchResult<PlatformAsset>;

    fn request_image(
        &self,
        asset: &PlatformAsset,
        target_size: Size,
        content_mode: ContentMode,
        options: &ImageRequestOptions,
        on_result: ImageCallback,
    ) -> Option<RequestId>;

    fn request_image_data(
        &self,
        asset: &PlatformAsset,
        options: &ImageRequestOptions,
        progress: Option<ProgressHandler>,
        on_result: ImageDataCallback,
    ) -> Option<RequestId>;

    fn request_video(
        &self,
        asset: &PlatformAsset,
        options: &VideoRequestOptions,
        on_result: VideoCallback,
    ) -> Option<RequestId>;

    fn cancel_request(&self, id: RequestId);

    /// The callback may report `NotDetermined` before the final status.
    fn request_authorization(&self, level: AccessLevel, on_status: AuthorizationCallback);

    fn register_change_observer(&self, observer: ChangeObserver) -> ObserverId;

    fn unregister_change_observer(&self, id: ObserverId);
}
