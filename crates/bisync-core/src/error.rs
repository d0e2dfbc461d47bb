use thiserror::Error;

use crate::lock::LockError;
use crate::transfer::TransferError;

/// Errors that can surface while parsing or rendering a [`crate::listing::Listing`].
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("failed to read listing: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse timestamp {raw:?}: {reason}")]
    Timestamp { raw: String, reason: String },
}

/// Top-level error type threaded through the engine and CLI.
#[derive(Debug, Error)]
pub enum BisyncError {
    #[error("listing error: {0}")]
    Listing(#[from] ListingError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl BisyncError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
