//! A [`PhotoPlatform`] backed by a directory tree.
//!
//! Layout:
//! - the root itself is the "Recents" smart album (every media file below it);
//! - a top-level `Favorites` directory, when present, is the favorites smart album;
//! - every other top-level directory is a user album.
//!
//! Asset identifiers are `/`-separated paths relative to the root. Requests
//! run on tokio's blocking pool and are cancelled through per-request
//! [`CancellationToken`]s.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use image::DynamicImage;
use notify::RecommendedWatcher;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{
    AccessLevel, AssetCollection, AssetSourceType, AuthorizationCallback, AuthorizationStatus,
    ChangeObserver, CollectionKind, CollectionSubtype, ContentMode, DeliveryMode, FetchOptions,
    FetchResult, FrameRequest, ImageCallback, ImageData, ImageDataCallback, ImageRequestOptions,
    LibraryChange, ObserverId, PhotoPlatform, PlatformAsset, PlaybackStyle, ProgressHandler,
    RequestId, ResultInfo, Size, SortDescriptor, SortKey, VideoAsset, VideoCallback,
    VideoRequestOptions, scan, watch,
};
use crate::config::Configuration;
use crate::error::{PlatformError, Result};
use crate::imaging;

pub const RECENTS_ID: &str = "local:recents";
pub const FAVORITES_ID: &str = "local:favorites";
pub const ALBUM_PREFIX: &str = "local:album:";
pub const FAVORITES_DIR: &str = "Favorites";

pub const ERROR_DOMAIN: &str = "LocalLibrary";
pub const CODE_IO: i64 = 1;
pub const CODE_DECODE: i64 = 2;
pub const CODE_UNSUPPORTED: i64 = 3;
pub const CODE_NOT_FOUND: i64 = 4;

const READ_CHUNK: usize = 64 * 1024;

type Observers = Arc<Mutex<HashMap<ObserverId, ChangeObserver>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn io_error(path: &Path, err: &io::Error) -> PlatformError {
    PlatformError::new(ERROR_DOMAIN, CODE_IO, format!("{}: {err}", path.display()))
}

pub struct LocalLibrary {
    root: PathBuf,
    runtime: Handle,
    watch_changes: bool,
    next_request: AtomicI32,
    in_flight: Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
    next_observer: AtomicU64,
    observers: Observers,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl LocalLibrary {
    /// Open the library rooted at `root`.
    ///
    /// Must be called from within a tokio runtime; requests run on its
    /// blocking pool.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            )
            .into());
        }
        let runtime = Handle::try_current().map_err(io::Error::other)?;
        info!(root = %root.display(), "opened local photo library");
        Ok(Self {
            root,
            runtime,
            watch_changes: true,
            next_request: AtomicI32::new(1),
            in_flight: Arc::default(),
            next_observer: AtomicU64::new(1),
            observers: Arc::default(),
            watcher: Mutex::new(None),
        })
    }

    pub fn from_config(cfg: &Configuration) -> Result<Self> {
        Ok(Self::open(&cfg.library_path)?.with_change_watching(cfg.watch_changes))
    }

    /// Enable or disable the filesystem watcher behind change observers.
    pub fn with_change_watching(mut self, enabled: bool) -> Self {
        self.watch_changes = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deliver `change` to every registered observer.
    pub fn notify_observers(&self, change: &LibraryChange) {
        dispatch(&self.observers, change);
    }

    fn collection_dir(&self, collection: &AssetCollection) -> Option<PathBuf> {
        match collection.local_identifier.as_str() {
            RECENTS_ID => Some(self.root.clone()),
            FAVORITES_ID => Some(self.root.join(FAVORITES_DIR)),
            id => id
                .strip_prefix(ALBUM_PREFIX)
                .and_then(|name| scan::resolve(&self.root, name)),
        }
    }

    fn favorites_dir(&self) -> Option<PathBuf> {
        let dir = self.root.join(FAVORITES_DIR);
        dir.is_dir().then_some(dir)
    }

    fn user_album_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|e| {
                e.file_name().to_str().is_some_and(|name| {
                    !name.starts_with('.') && !name.eq_ignore_ascii_case(FAVORITES_DIR)
                })
            })
            .map(|e| e.path())
            .collect()
    }

    fn describe_collection(
        &self,
        local_identifier: String,
        title: String,
        kind: CollectionKind,
        subtype: CollectionSubtype,
        dir: &Path,
    ) -> AssetCollection {
        AssetCollection {
            local_identifier,
            localized_title: Some(title),
            kind,
            subtype,
            end_date: scan::newest_modification(dir),
        }
    }

    fn smart_albums(&self, subtype: CollectionSubtype) -> Vec<AssetCollection> {
        let mut out = Vec::new();
        if matches!(
            subtype,
            CollectionSubtype::Any | CollectionSubtype::SmartAlbumUserLibrary
        ) {
            out.push(self.describe_collection(
                RECENTS_ID.to_owned(),
                "Recents".to_owned(),
                CollectionKind::SmartAlbum,
                CollectionSubtype::SmartAlbumUserLibrary,
                &self.root,
            ));
        }
        if matches!(
            subtype,
            CollectionSubtype::Any | CollectionSubtype::SmartAlbumFavorites
        ) && let Some(dir) = self.favorites_dir()
        {
            out.push(self.describe_collection(
                FAVORITES_ID.to_owned(),
                FAVORITES_DIR.to_owned(),
                CollectionKind::SmartAlbum,
                CollectionSubtype::SmartAlbumFavorites,
                &dir,
            ));
        }
        out
    }

    fn user_albums(&self) -> Vec<AssetCollection> {
        self.user_album_dirs()
            .into_iter()
            .filter_map(|dir| {
                let name = dir.file_name()?.to_str()?.to_owned();
                Some(self.describe_collection(
                    format!("{ALBUM_PREFIX}{name}"),
                    name,
                    CollectionKind::Album,
                    CollectionSubtype::Any,
                    &dir,
                ))
            })
            .collect()
    }

    fn issue_request(&self) -> (RequestId, CancellationToken) {
        let id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        lock(&self.in_flight).insert(id, token.clone());
        (id, token)
    }

    /// Run `job` on the blocking pool unless the request is cancelled first.
    fn spawn_request<F>(&self, id: RequestId, token: CancellationToken, job: F)
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        self.runtime.spawn_blocking(move || {
            if token.is_cancelled() {
                debug!(request = ?id, "request cancelled before it started");
            } else {
                job(&token);
            }
            lock(&in_flight).remove(&id);
        });
    }

    fn ensure_watcher(&self) {
        if !self.watch_changes {
            return;
        }
        let mut slot = lock(&self.watcher);
        if slot.is_some() {
            return;
        }
        let observers = Arc::clone(&self.observers);
        match watch::start_watcher(&self.root, move |change| dispatch(&observers, &change)) {
            Ok(watcher) => {
                info!(watching = %self.root.display(), "library watcher started (recursive)");
                *slot = Some(watcher);
            }
            Err(err) => warn!(%err, "could not start library watcher"),
        }
    }
}

fn dispatch(observers: &Observers, change: &LibraryChange) {
    // Observers refetch from the library; never call them under the lock.
    let current: Vec<ChangeObserver> = lock(observers).values().cloned().collect();
    for observer in current {
        observer(change);
    }
}

fn sort_collections(collections: &mut [AssetCollection], sort: Option<SortDescriptor>) {
    collections.sort_by(|a, b| a.localized_title.cmp(&b.localized_title));
    if let Some(SortDescriptor { key: SortKey::EndDate, ascending }) = sort {
        collections.sort_by(|a, b| {
            let ord = a.end_date.cmp(&b.end_date);
            if ascending { ord } else { ord.reverse() }
        });
    }
}

fn sort_assets(assets: &mut [PlatformAsset], sort: Option<SortDescriptor>) {
    assets.sort_by(|a, b| a.local_identifier.cmp(&b.local_identifier));
    if let Some(SortDescriptor { ascending, .. }) = sort {
        assets.sort_by(|a, b| {
            let ord = a.creation_date.cmp(&b.creation_date);
            if ascending { ord } else { ord.reverse() }
        });
    }
}

fn decode_file(path: &Path) -> Result<DynamicImage, PlatformError> {
    let bytes = fs::read(path).map_err(|err| io_error(path, &err))?;
    let orientation = imaging::read_orientation(&bytes);
    let img = image::load_from_memory(&bytes).map_err(|err| {
        PlatformError::new(
            ERROR_DOMAIN,
            CODE_DECODE,
            format!("{}: {err}", path.display()),
        )
    })?;
    Ok(imaging::apply_orientation(img, orientation))
}

fn read_with_progress(
    path: &Path,
    progress: Option<&ProgressHandler>,
    token: &CancellationToken,
) -> io::Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;
    let total = file.metadata()?.len();
    let mut bytes = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        if token.is_cancelled() {
            return Ok(None);
        }
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
        if let Some(progress) = progress
            && total > 0
        {
            progress((bytes.len() as f64 / total as f64).min(1.0));
        }
    }
    Ok(Some(bytes))
}

/// Video file on disk. There is no video decoder in this backend, so frame
/// extraction always reports an unsupported-codec error.
struct LocalVideo {
    path: PathBuf,
}

impl VideoAsset for LocalVideo {
    fn duration(&self) -> Option<Duration> {
        None
    }

    fn copy_frame(&self, request: FrameRequest) -> Result<DynamicImage, PlatformError> {
        Err(PlatformError::new(
            ERROR_DOMAIN,
            CODE_UNSUPPORTED,
            format!(
                "cannot extract frame at {:?} from {}: no video decoder available",
                request.at,
                self.path.display()
            ),
        ))
    }
}

impl PhotoPlatform for LocalLibrary {
    fn fetch_asset_collections(
        &self,
        kind: CollectionKind,
        subtype: CollectionSubtype,
        options: &FetchOptions,
    ) -> FetchResult<AssetCollection> {
        if !options.includes(AssetSourceType::UserLibrary) {
            return FetchResult::default();
        }
        let mut found = match (kind, subtype) {
            (CollectionKind::SmartAlbum, subtype) => self.smart_albums(subtype),
            (CollectionKind::Album, CollectionSubtype::Any) => self.user_albums(),
            (CollectionKind::Album, _) => Vec::new(),
        };
        sort_collections(&mut found, options.sort);
        debug!(?kind, ?subtype, count = found.len(), "fetched collections");
        found.into_iter().collect()
    }

    fn fetch_assets(
        &self,
        collection: &AssetCollection,
        options: &FetchOptions,
    ) -> FetchResult<PlatformAsset> {
        let Some(dir) = self.collection_dir(collection) else {
            warn!(collection = %collection.local_identifier, "unknown collection");
            return FetchResult::default();
        };
        let mut assets: Vec<PlatformAsset> = scan::media_files(&dir)
            .iter()
            .filter_map(|path| scan::describe(&self.root, path))
            .filter(|asset| options.includes(asset.source_type))
            .collect();
        sort_assets(&mut assets, options.sort);
        assets.into_iter().collect()
    }

    #[instrument(skip_all, fields(asset = %asset.local_identifier))]
    fn request_image(
        &self,
        asset: &PlatformAsset,
        target_size: Size,
        content_mode: ContentMode,
        options: &ImageRequestOptions,
        mut on_result: ImageCallback,
    ) -> Option<RequestId> {
        let Some(path) = scan::resolve(&self.root, &asset.local_identifier) else {
            on_result(None, ResultInfo::failed(not_found(&asset.local_identifier)));
            return None;
        };
        let style = asset.playback_style;
        let opportunistic = options.delivery_mode == DeliveryMode::Opportunistic;
        let (id, token) = self.issue_request();
        self.spawn_request(id, token, move |token| {
            if style == PlaybackStyle::Video {
                let err = PlatformError::new(
                    ERROR_DOMAIN,
                    CODE_UNSUPPORTED,
                    format!("{}: video frames cannot be decoded", path.display()),
                );
                on_result(None, ResultInfo::failed(err));
                return;
            }
            let image = match decode_file(&path) {
                Ok(image) => image,
                Err(err) => {
                    on_result(None, ResultInfo::failed(err));
                    return;
                }
            };
            if opportunistic {
                let preview = imaging::render_preview(&image, target_size, content_mode);
                on_result(Some(preview), ResultInfo::degraded());
                if token.is_cancelled() {
                    return;
                }
            }
            let rendered = imaging::render_for_target(&image, target_size, content_mode);
            on_result(Some(rendered), ResultInfo::final_result());
        });
        Some(id)
    }

    /// Reads run on the blocking pool regardless of `options.synchronous`.
    fn request_image_data(
        &self,
        asset: &PlatformAsset,
        _options: &ImageRequestOptions,
        progress: Option<ProgressHandler>,
        mut on_result: ImageDataCallback,
    ) -> Option<RequestId> {
        let Some(path) = scan::resolve(&self.root, &asset.local_identifier) else {
            on_result(None, ResultInfo::failed(not_found(&asset.local_identifier)));
            return None;
        };
        let (id, token) = self.issue_request();
        self.spawn_request(id, token, move |token| {
            match read_with_progress(&path, progress.as_ref(), token) {
                Ok(Some(bytes)) => {
                    let data = ImageData {
                        orientation: imaging::read_orientation(&bytes),
                        uniform_type: scan::uniform_type(&path).map(str::to_owned),
                        bytes,
                    };
                    on_result(Some(data), ResultInfo::final_result());
                }
                Ok(None) => debug!(path = %path.display(), "image data read cancelled"),
                Err(err) => on_result(None, ResultInfo::failed(io_error(&path, &err))),
            }
        });
        Some(id)
    }

    fn request_video(
        &self,
        asset: &PlatformAsset,
        _options: &VideoRequestOptions,
        mut on_result: VideoCallback,
    ) -> Option<RequestId> {
        let Some(path) = scan::resolve(&self.root, &asset.local_identifier) else {
            on_result(None, ResultInfo::failed(not_found(&asset.local_identifier)));
            return None;
        };
        let style = asset.playback_style;
        let (id, token) = self.issue_request();
        self.spawn_request(id, token, move |_| {
            if style != PlaybackStyle::Video {
                let err = PlatformError::new(
                    ERROR_DOMAIN,
                    CODE_UNSUPPORTED,
                    format!("{} is not a video", path.display()),
                );
                on_result(None, ResultInfo::failed(err));
                return;
            }
            if !path.is_file() {
                on_result(None, ResultInfo::failed(not_found(&path.display().to_string())));
                return;
            }
            let video: Arc<dyn VideoAsset> = Arc::new(LocalVideo { path });
            on_result(Some(video), ResultInfo::final_result());
        });
        Some(id)
    }

    fn cancel_request(&self, id: RequestId) {
        if let Some(token) = lock(&self.in_flight).remove(&id) {
            debug!(request = ?id, "cancelling request");
            token.cancel();
        }
    }

    fn request_authorization(&self, level: AccessLevel, mut on_status: AuthorizationCallback) {
        let root = self.root.clone();
        self.runtime.spawn_blocking(move || {
            let status = match fs::read_dir(&root) {
                Ok(_) => AuthorizationStatus::Authorized,
                Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                    AuthorizationStatus::Denied
                }
                Err(_) => AuthorizationStatus::Restricted,
            };
            debug!(?level, %status, "authorization resolved");
            on_status(status);
        });
    }

    fn register_change_observer(&self, observer: ChangeObserver) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        lock(&self.observers).insert(id, observer);
        self.ensure_watcher();
        id
    }

    fn unregister_change_observer(&self, id: ObserverId) {
        let remaining = {
            let mut observers = lock(&self.observers);
            observers.remove(&id);
            observers.len()
        };
        if remaining == 0 && lock(&self.watcher).take().is_some() {
            info!("library watcher stopped");
        }
    }
}

fn not_found(identifier: &str) -> PlatformError {
    PlatformError::new(
        ERROR_DOMAIN,
        CODE_NOT_FOUND,
        format!("no asset at {identifier}"),
    )
}
