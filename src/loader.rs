//! Library entry point: permission, album list and change tracking.

use std::sync::{Arc, Weak};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::album::PhotoAlbum;
use crate::config::RequestSettings;
use crate::error::{LoaderError, Result};
use crate::platform::{
    AccessLevel, AssetCollection, AssetSourceType, AuthorizationStatus, ChangeObserver,
    CollectionKind, CollectionSubtype, FetchOptions, FetchResult, LibraryChange, ObserverId,
    PhotoPlatform, SortDescriptor, SortKey,
};
use crate::request::RequestStream;

/// Album groups in display order: camera roll, favorites, user albums.
#[derive(Debug, Clone, Default)]
pub struct CollectionList {
    groups: Vec<FetchResult<AssetCollection>>,
}

impl CollectionList {
    pub fn new(groups: Vec<FetchResult<AssetCollection>>) -> Self {
        Self { groups }
    }

    /// Fetch all three groups from the platform.
    pub fn fetch(platform: &dyn PhotoPlatform) -> Self {
        let options = FetchOptions {
            sort: Some(SortDescriptor::descending(SortKey::EndDate)),
            include_source_types: vec![
                AssetSourceType::CloudShared,
                AssetSourceType::UserLibrary,
                AssetSourceType::ITunesSynced,
            ],
        };
        let groups = [
            (
                CollectionKind::SmartAlbum,
                CollectionSubtype::SmartAlbumUserLibrary,
            ),
            (
                CollectionKind::SmartAlbum,
                CollectionSubtype::SmartAlbumFavorites,
            ),
            (CollectionKind::Album, CollectionSubtype::Any),
        ]
        .into_iter()
        .map(|(kind, subtype)| platform.fetch_asset_collections(kind, subtype, &options))
        .collect();
        Self { groups }
    }

    pub fn groups(&self) -> &[FetchResult<AssetCollection>] {
        &self.groups
    }

    pub fn album_count(&self) -> usize {
        self.groups.iter().map(FetchResult::count).sum()
    }

    /// Index into the flattened sequence of all groups.
    pub fn collection_at(&self, mut index: usize) -> Option<&Arc<AssetCollection>> {
        for group in &self.groups {
            if index < group.count() {
                return group.object_at(index);
            }
            index -= group.count();
        }
        None
    }
}

type Snapshot = Option<Arc<CollectionList>>;

/// Latest album list, replayed to every subscriber.
#[derive(Clone)]
struct CollectionCache {
    platform: Arc<dyn PhotoPlatform>,
    latest: Arc<watch::Sender<Snapshot>>,
}

impl CollectionCache {
    fn current(&self) -> Arc<CollectionList> {
        if let Some(list) = self.latest.borrow().as_ref() {
            return Arc::clone(list);
        }
        let list = Arc::new(CollectionList::fetch(&*self.platform));
        self.latest.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Arc::clone(&list));
            true
        });
        list
    }

    fn updates(&self) -> impl Stream<Item = Arc<CollectionList>> + Send + use<> {
        self.current();
        stream::unfold((self.latest.subscribe(), true), |(mut rx, first)| async move {
            if !first {
                rx.changed().await.ok()?;
            }
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if let Some(list) = snapshot {
                    return Some((list, (rx, false)));
                }
                rx.changed().await.ok()?;
            }
        })
    }
}

/// Unregisters the change observer when dropped.
struct ObserverRegistration {
    platform: Weak<dyn PhotoPlatform>,
    id: ObserverId,
}

impl Drop for ObserverRegistration {
    fn drop(&mut self) {
        if let Some(platform) = self.platform.upgrade() {
            debug!(observer = ?self.id, "unregistering library change observer");
            platform.unregister_change_observer(self.id);
        }
    }
}

/// Entry point to a photo library.
///
/// Listens for library changes for as long as it lives.
pub struct PhotoLoader {
    platform: Arc<dyn PhotoPlatform>,
    settings: Arc<RequestSettings>,
    cache: CollectionCache,
    _registration: ObserverRegistration,
}

impl PhotoLoader {
    pub fn new(platform: Arc<dyn PhotoPlatform>) -> Self {
        Self::with_settings(platform, RequestSettings::default())
    }

    pub fn with_settings(platform: Arc<dyn PhotoPlatform>, settings: RequestSettings) -> Self {
        let latest = Arc::new(watch::Sender::new(None));
        let observer = refresh_on_change(Arc::downgrade(&platform), Arc::clone(&latest));
        let id = platform.register_change_observer(observer);
        info!(observer = ?id, "registered library change observer");
        Self {
            settings: Arc::new(settings),
            cache: CollectionCache {
                platform: Arc::clone(&platform),
                latest,
            },
            _registration: ObserverRegistration {
                platform: Arc::downgrade(&platform),
                id,
            },
            platform,
        }
    }

    /// Ask for library access.
    ///
    /// Emits once and completes when access is granted; fails with
    /// [`LoaderError::NotAuthorized`] otherwise.
    pub fn request_permission(&self) -> RequestStream<()> {
        let platform = Arc::clone(&self.platform);
        let level = self.settings.access_level;
        RequestStream::start(&self.platform, move |sink| {
            platform.request_authorization(
                level,
                Box::new(move |status: AuthorizationStatus| match status {
                    AuthorizationStatus::NotDetermined => {
                        trace!("authorization not determined yet");
                    }
                    AuthorizationStatus::Authorized => {
                        sink.next(());
                        sink.finish();
                    }
                    status => sink.fail(LoaderError::NotAuthorized { status }),
                }),
            );
            None
        })
    }

    /// Total album count, re-emitted whenever the library changes.
    pub fn number_of_albums(&self) -> BoxStream<'static, Result<usize>> {
        let cache = self.cache.clone();
        self.request_permission()
            .map_ok(move |()| {
                cache
                    .updates()
                    .map(|list| Ok::<_, LoaderError>(list.album_count()))
            })
            .try_flatten()
            .boxed()
    }

    /// Every album list snapshot, starting with the current one.
    pub fn collection_updates(&self) -> impl Stream<Item = Arc<CollectionList>> + Send + use<> {
        self.cache.updates()
    }

    pub fn collections(&self) -> Arc<CollectionList> {
        self.cache.current()
    }

    /// The album at `index` across camera roll, favorites and user albums.
    pub fn items_for_album(&self, index: usize) -> Option<PhotoAlbum> {
        let list = self.cache.current();
        let collection = list.collection_at(index)?;
        Some(PhotoAlbum::with_settings(
            Arc::clone(&self.platform),
            Arc::clone(collection),
            Arc::clone(&self.settings),
        ))
    }

    pub fn access_level(&self) -> AccessLevel {
        self.settings.access_level
    }
}

fn refresh_on_change(
    platform: Weak<dyn PhotoPlatform>,
    latest: Arc<watch::Sender<Snapshot>>,
) -> ChangeObserver {
    Arc::new(move |change: &LibraryChange| {
        let Some(platform) = platform.upgrade() else {
            return;
        };
        let list = CollectionList::fetch(&*platform);
        debug!(
            changed = change.identifiers.len(),
            albums = list.album_count(),
            "library changed; album list refreshed"
        );
        latest.send_replace(Some(Arc::new(list)));
    })
}
