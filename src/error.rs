//! Error types for the synced feed.

use crate::backend::BackendError;
use crate::types::MessageId;
use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The canonical store rejected a write or removal. The mutation was
    /// aborted before any announcement was attempted.
    #[error("store write failed: {0}")]
    StoreWrite(#[source] BackendError),

    #[error("store read failed: {0}")]
    StoreRead(#[source] BackendError),

    /// Publishing the announcement failed after the store write had
    /// already committed. The write is durable but not fanned out; the
    /// failed token still identifies it.
    #[error("announce {token:?} failed after durable write: {source}")]
    Announce {
        token: String,
        #[source]
        source: BackendError,
    },

    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("malformed announcement: {0:?}")]
    MalformedAnnouncement(String),
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
