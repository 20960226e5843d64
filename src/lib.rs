//! Asynchronous streams over a platform photo library.
//!
//! [`PhotoLoader`] is the entry point: it negotiates access, tracks the album
//! list, and hands out [`PhotoAlbum`]s whose [`PhotoAsset`]s expose
//! thumbnails, originals and videos as cancellable streams.

pub mod album;
pub mod asset;
pub mod config;
pub mod error;
pub mod imaging;
pub mod loader;
pub mod platform;
pub mod request;

pub use album::PhotoAlbum;
pub use asset::{PhotoAsset, PhotoAssetType};
pub use error::{LoaderError, PlatformError, Result};
pub use loader::{CollectionList, PhotoLoader};
pub use platform::local::LocalLibrary;
pub use platform::{PhotoPlatform, Size};
pub use request::RequestStream;
