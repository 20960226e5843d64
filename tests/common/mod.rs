//! In-memory photo platform shared by the integration tests.
//!
//! Requests are recorded and only answered when a test says so, which lets
//! tests drive callback order, degraded previews, errors and cancellation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use image::{DynamicImage, RgbaImage};
use photo_loader::PlatformError;
use photo_loader::platform::{
    AccessLevel, AssetCollection, AssetSourceType, AuthorizationCallback, AuthorizationStatus,
    ChangeObserver, CollectionKind, CollectionSubtype, ContentMode, FetchOptions, FetchResult,
    FrameRequest, ImageCallback, ImageData, ImageDataCallback, ImageRequestOptions, LibraryChange,
    ObserverId, PhotoPlatform, PlatformAsset, PlaybackStyle, ProgressHandler, RequestId,
    ResultInfo, Size, VideoAsset, VideoCallback, VideoRequestOptions,
};

pub struct ImageRequest {
    pub id: Option<RequestId>,
    pub asset: String,
    pub target_size: Size,
    pub content_mode: ContentMode,
    pub options: ImageRequestOptions,
    callback: ImageCallback,
}

pub struct DataRequest {
    pub id: Option<RequestId>,
    pub asset: String,
    pub options: ImageRequestOptions,
    progress: Option<ProgressHandler>,
    callback: ImageDataCallback,
}

pub struct VideoRequest {
    pub id: Option<RequestId>,
    pub asset: String,
    callback: VideoCallback,
}

#[derive(Default)]
struct State {
    groups: HashMap<(CollectionKind, CollectionSubtype), Vec<AssetCollection>>,
    assets: HashMap<String, Vec<PlatformAsset>>,
    collection_fetches: Vec<FetchOptions>,
    asset_fetches: usize,
    image_requests: Vec<ImageRequest>,
    data_requests: Vec<DataRequest>,
    video_requests: Vec<VideoRequest>,
    auth_requests: Vec<(AccessLevel, AuthorizationCallback)>,
    auto_status: Option<AuthorizationStatus>,
    cancelled: Vec<RequestId>,
    observers: HashMap<ObserverId, ChangeObserver>,
}

pub struct FakePlatform {
    state: Mutex<State>,
    next_request: AtomicI32,
    next_observer: AtomicU64,
    issue_handles: bool,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_handles(true))
    }

    /// A platform whose requests never hand back a cancellable handle.
    pub fn without_handles() -> Arc<Self> {
        Arc::new(Self::with_handles(false))
    }

    fn with_handles(issue_handles: bool) -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_request: AtomicI32::new(100),
            next_observer: AtomicU64::new(1),
            issue_handles,
        }
    }

    pub fn as_platform(self: &Arc<Self>) -> Arc<dyn PhotoPlatform> {
        Arc::clone(self) as Arc<dyn PhotoPlatform>
    }

    fn issue(&self) -> Option<RequestId> {
        self.issue_handles
            .then(|| RequestId(self.next_request.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn add_collection(
        &self,
        kind: CollectionKind,
        subtype: CollectionSubtype,
        id: &str,
        assets: Vec<PlatformAsset>,
    ) -> AssetCollection {
        let collection = AssetCollection {
            local_identifier: id.to_owned(),
            localized_title: Some(id.to_owned()),
            kind,
            subtype,
            end_date: None,
        };
        let mut state = self.state.lock().unwrap();
        state
            .groups
            .entry((kind, subtype))
            .or_default()
            .push(collection.clone());
        state.assets.insert(id.to_owned(), assets);
        collection
    }

    pub fn remove_collection(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        for group in state.groups.values_mut() {
            group.retain(|c| c.local_identifier != id);
        }
        state.assets.remove(id);
    }

    pub fn set_auto_authorization(&self, status: Option<AuthorizationStatus>) {
        self.state.lock().unwrap().auto_status = status;
    }

    /// Answer every pending authorization request with `status`.
    pub fn respond_authorization(&self, status: AuthorizationStatus) {
        let mut pending = std::mem::take(&mut self.state.lock().unwrap().auth_requests);
        for (_, callback) in pending.iter_mut() {
            callback(status);
        }
        self.state.lock().unwrap().auth_requests.extend(pending);
    }

    pub fn authorization_requests(&self) -> usize {
        self.state.lock().unwrap().auth_requests.len()
    }

    pub fn collection_fetches(&self) -> Vec<FetchOptions> {
        self.state.lock().unwrap().collection_fetches.clone()
    }

    pub fn asset_fetches(&self) -> usize {
        self.state.lock().unwrap().asset_fetches
    }

    pub fn image_requests(&self) -> usize {
        self.state.lock().unwrap().image_requests.len()
    }

    pub fn image_request(&self, index: usize) -> (Option<RequestId>, String, Size, ContentMode, ImageRequestOptions) {
        let state = self.state.lock().unwrap();
        let r = &state.image_requests[index];
        (r.id, r.asset.clone(), r.target_size, r.content_mode, r.options)
    }

    pub fn data_requests(&self) -> usize {
        self.state.lock().unwrap().data_requests.len()
    }

    pub fn data_request_options(&self, index: usize) -> ImageRequestOptions {
        self.state.lock().unwrap().data_requests[index].options
    }

    pub fn video_requests(&self) -> usize {
        self.state.lock().unwrap().video_requests.len()
    }

    pub fn cancelled(&self) -> Vec<RequestId> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().unwrap().observers.len()
    }

    pub fn deliver_image(&self, index: usize, image: Option<DynamicImage>, info: ResultInfo) {
        let mut state = self.state.lock().unwrap();
        (state.image_requests[index].callback)(image, info);
    }

    pub fn deliver_data(&self, index: usize, data: Option<ImageData>, info: ResultInfo) {
        let mut state = self.state.lock().unwrap();
        (state.data_requests[index].callback)(data, info);
    }

    pub fn report_progress(&self, index: usize, fraction: f64) {
        let progress = self.state.lock().unwrap().data_requests[index]
            .progress
            .clone();
        if let Some(progress) = progress {
            progress(fraction);
        }
    }

    pub fn deliver_video(
        &self,
        index: usize,
        video: Option<Arc<dyn VideoAsset>>,
        info: ResultInfo,
    ) {
        let mut state = self.state.lock().unwrap();
        (state.video_requests[index].callback)(video, info);
    }

    /// Simulate a library mutation.
    pub fn fire_change(&self) {
        let observers: Vec<ChangeObserver> =
            self.state.lock().unwrap().observers.values().cloned().collect();
        let change = LibraryChange {
            identifiers: vec!["changed".to_owned()],
        };
        for observer in observers {
            observer(&change);
        }
    }
}

impl PhotoPlatform for FakePlatform {
    fn fetch_asset_collections(
        &self,
        kind: CollectionKind,
        subtype: CollectionSubtype,
        options: &FetchOptions,
    ) -> FetchResult<AssetCollection> {
        let mut state = self.state.lock().unwrap();
        state.collection_fetches.push(options.clone());
        state
            .groups
            .get(&(kind, subtype))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    fn fetch_assets(
        &self,
        collection: &AssetCollection,
        options: &FetchOptions,
    ) -> FetchResult<PlatformAsset> {
        let mut state = self.state.lock().unwrap();
        state.asset_fetches += 1;
        let mut assets: Vec<PlatformAsset> = state
            .assets
            .get(&collection.local_identifier)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|a| options.includes(a.source_type))
            .collect();
        assets.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
        assets.into_iter().collect()
    }

    fn request_image(
        &self,
        asset: &PlatformAsset,
        target_size: Size,
        content_mode: ContentMode,
        options: &ImageRequestOptions,
        on_result: ImageCallback,
    ) -> Option<RequestId> {
        let id = self.issue();
        self.state.lock().unwrap().image_requests.push(ImageRequest {
            id,
            asset: asset.local_identifier.clone(),
            target_size,
            content_mode,
            options: *options,
            callback: on_result,
        });
        id
    }

    fn request_image_data(
        &self,
        asset: &PlatformAsset,
        options: &ImageRequestOptions,
        progress: Option<ProgressHandler>,
        on_result: ImageDataCallback,
    ) -> Option<RequestId> {
        let id = self.issue();
        self.state.lock().unwrap().data_requests.push(DataRequest {
            id,
            asset: asset.local_identifier.clone(),
            options: *options,
            progress,
            callback: on_result,
        });
        id
    }

    fn request_video(
        &self,
        asset: &PlatformAsset,
        _options: &VideoRequestOptions,
        on_result: VideoCallback,
    ) -> Option<RequestId> {
        let id = self.issue();
        self.state.lock().unwrap().video_requests.push(VideoRequest {
            id,
            asset: asset.local_identifier.clone(),
            callback: on_result,
        });
        id
    }

    fn cancel_request(&self, id: RequestId) {
        self.state.lock().unwrap().cancelled.push(id);
    }

    fn request_authorization(&self, level: AccessLevel, mut on_status: AuthorizationCallback) {
        let auto = self.state.lock().unwrap().auto_status;
        match auto {
            Some(status) => on_status(status),
            None => self
                .state
                .lock()
                .unwrap()
                .auth_requests
                .push((level, on_status)),
        }
    }

    fn register_change_observer(&self, observer: ChangeObserver) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.state.lock().unwrap().observers.insert(id, observer);
        id
    }

    fn unregister_change_observer(&self, id: ObserverId) {
        self.state.lock().unwrap().observers.remove(&id);
    }
}

pub fn photo(id: &str, age_secs: u64) -> PlatformAsset {
    asset(id, age_secs, PlaybackStyle::Image)
}

pub fn video(id: &str, age_secs: u64) -> PlatformAsset {
    asset(id, age_secs, PlaybackStyle::Video)
}

pub fn asset(id: &str, age_secs: u64, playback_style: PlaybackStyle) -> PlatformAsset {
    PlatformAsset {
        local_identifier: id.to_owned(),
        pixel_width: 40,
        pixel_height: 30,
        playback_style,
        creation_date: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs)),
        source_type: AssetSourceType::UserLibrary,
        duration: None,
    }
}

pub fn solid(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::new(width, height))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    solid(width, height)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Video whose frame extraction succeeds or fails on demand.
pub struct FakeVideo {
    pub frame: Option<DynamicImage>,
    pub requested: Mutex<Vec<FrameRequest>>,
}

impl FakeVideo {
    pub fn new(frame: Option<DynamicImage>) -> Arc<Self> {
        Arc::new(Self {
            frame,
            requested: Mutex::new(Vec::new()),
        })
    }
}

impl VideoAsset for FakeVideo {
    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs(3))
    }

    fn copy_frame(&self, request: FrameRequest) -> Result<DynamicImage, PlatformError> {
        self.requested.lock().unwrap().push(request);
        self.frame
            .clone()
            .ok_or_else(|| PlatformError::new("FakeVideo", 7, "no frame"))
    }
}
