use std::time::Duration;

use thiserror::Error;

use crate::platform::AuthorizationStatus;

/// Error reported by the photo platform in a request's result info.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{domain} error {code}: {message}")]
pub struct PlatformError {
    pub domain: String,
    pub code: i64,
    pub message: String,
}

impl PlatformError {
    pub fn new(domain: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            message: message.into(),
        }
    }
}

/// Library error type for photo loader operations.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The platform failed the request (codec, storage or network failure).
    #[error("platform request failed: {0}")]
    Platform(#[from] PlatformError),

    /// Photo library access was denied, restricted or only partially granted.
    #[error("photo library access not authorized (status: {status})")]
    NotAuthorized { status: AuthorizationStatus },

    /// The request did not reach a terminal result in time.
    #[error("request timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    /// An album was asked for an asset past its end.
    #[error("asset index {index} out of bounds for album with {count} assets")]
    IndexOutOfBounds { index: usize, count: usize },

    /// A blocking worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Filesystem watcher error.
    #[error(transparent)]
    Watch(#[from] notify::Error),
}

pub type Result<T, E = LoaderError> = std::result::Result<T, E>;
