//! Whitelist Cache Error Hierarchy
//!
//! Absence of a key is not represented here: typed reads return `Ok(None)` for
//! a key that was never written. Everything else that can go wrong while
//! talking to the backing bucket is a [`StoreError`].

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backing key-value store failures (I/O, encoding, decoding)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration source could not be read or deserialized
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration was read but failed validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The apply loop task panicked or was aborted
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Bucket could not be opened or created
    #[error("Bucket {namespace} unavailable: {reason}")]
    Unavailable { namespace: String, reason: String },

    /// Value under `key` could not be encoded or decoded
    #[error("Failed to encode or decode value of key {key}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Any other failure reported by the bucket implementation
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Embedded database errors
    #[error(transparent)]
    Sled(#[from] sled::Error),
}

impl StoreError {
    pub(crate) fn codec(
        key: &str,
        source: serde_json::Error,
    ) -> Self {
        StoreError::Codec {
            key: key.to_string(),
            source,
        }
    }
}
