use std::fmt;
use std::sync::{Arc, OnceLock};

use futures::stream::{self, BoxStream};
use futures::{StreamExt, future};
use image::DynamicImage;
use tracing::debug;

use crate::asset::PhotoAsset;
use crate::config::RequestSettings;
use crate::error::{LoaderError, Result};
use crate::platform::{
    AssetCollection, AssetSourceType, FetchOptions, FetchResult, PhotoPlatform, PlatformAsset,
    Size, SortDescriptor, SortKey,
};

/// Newest first, from every source type the library can hold.
fn album_fetch_options() -> FetchOptions {
    FetchOptions {
        sort: Some(SortDescriptor::descending(SortKey::CreationDate)),
        include_source_types: vec![
            AssetSourceType::UserLibrary,
            AssetSourceType::CloudShared,
            AssetSourceType::ITunesSynced,
        ],
    }
}

/// An album or smart album and its assets.
///
/// The member fetch runs once, on first use, and is shared by clones.
#[derive(Clone)]
pub struct PhotoAlbum {
    platform: Arc<dyn PhotoPlatform>,
    collection: Arc<AssetCollection>,
    settings: Arc<RequestSettings>,
    assets: Arc<OnceLock<FetchResult<PlatformAsset>>>,
}

impl fmt::Debug for PhotoAlbum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoAlbum")
            .field("id", &self.collection.local_identifier)
            .field("title", &self.album_title())
            .finish_non_exhaustive()
    }
}

impl PhotoAlbum {
    pub fn new(platform: Arc<dyn PhotoPlatform>, collection: Arc<AssetCollection>) -> Self {
        Self::with_settings(platform, collection, Arc::new(RequestSettings::default()))
    }

    pub fn with_settings(
        platform: Arc<dyn PhotoPlatform>,
        collection: Arc<AssetCollection>,
        settings: Arc<RequestSettings>,
    ) -> Self {
        Self {
            platform,
            collection,
            settings,
            assets: Arc::new(OnceLock::new()),
        }
    }

    fn all_assets(&self) -> &FetchResult<PlatformAsset> {
        self.assets.get_or_init(|| {
            let fetched = self
                .platform
                .fetch_assets(&self.collection, &album_fetch_options());
            debug!(
                album = %self.collection.local_identifier,
                count = fetched.count(),
                "fetched album assets"
            );
            fetched
        })
    }

    fn wrap(&self, asset: &Arc<PlatformAsset>) -> PhotoAsset {
        PhotoAsset::with_settings(
            Arc::clone(&self.platform),
            Arc::clone(asset),
            Arc::clone(&self.settings),
        )
    }

    pub fn id(&self) -> &str {
        &self.collection.local_identifier
    }

    pub fn album_title(&self) -> &str {
        self.collection.localized_title.as_deref().unwrap_or("")
    }

    pub fn images_count(&self) -> usize {
        self.all_assets().count()
    }

    /// The asset at `index`, newest first.
    ///
    /// The fetch and lookup run on a blocking worker so platform I/O never
    /// stalls the caller's executor.
    pub async fn asset(&self, index: usize) -> Result<PhotoAsset> {
        let album = self.clone();
        tokio::task::spawn_blocking(move || album.asset_blocking(index)).await?
    }

    fn asset_blocking(&self, index: usize) -> Result<PhotoAsset> {
        let assets = self.all_assets();
        assets
            .object_at(index)
            .map(|asset| self.wrap(asset))
            .ok_or(LoaderError::IndexOutOfBounds {
                index,
                count: assets.count(),
            })
    }

    /// Every asset in the album, newest first.
    pub fn assets(&self) -> Vec<PhotoAsset> {
        self.all_assets().iter().map(|asset| self.wrap(asset)).collect()
    }

    /// Thumbnail of the newest asset. Empty albums yield a single `None`.
    pub fn thumb_image(&self, size: Size) -> BoxStream<'static, Result<Option<DynamicImage>>> {
        match self.all_assets().first_object() {
            Some(first) => self.wrap(first).thumb_image(size),
            None => stream::once(future::ready(Ok(None))).boxed(),
        }
    }
}
