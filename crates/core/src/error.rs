//! Unified error types for cachet.
//!
//! Storage and transport failures carry their own enums so adapters can be
//! written against them without depending on the engine.

use tokio_rusqlite::rusqlite;

/// Failures reported by a [`StorageProvider`](crate::provider::StorageProvider).
///
/// "Not found" is never an error; providers return `Ok(None)` for that.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Schema migration failed to apply.
    #[error("storage migration failed: {0}")]
    Migration(String),
}

impl From<tokio_rusqlite::Error> for StorageError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::ConnectionClosed => StorageError::Unavailable("connection closed".to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error<StorageError>> for StorageError {
    fn from(err: tokio_rusqlite::Error<StorageError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => StorageError::Unavailable("connection closed".to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Failures reported by a transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection, TLS or protocol failure.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Response body exceeded the configured limit.
    #[error("response too large: {0}")]
    TooLarge(String),

    /// The request could not be sent as built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Unified error type returned by the caching engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport call failed; never retried.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(#[from] TransportError),

    /// Storage read or write failed.
    #[error("STORAGE_ERROR: {0}")]
    Storage(#[from] StorageError),

    /// Only cached responses were allowed and none exists for the key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// The origin answered 304 but there is no entry to reconcile against.
    #[error("NOT_MODIFIED_WITHOUT_ENTRY: {0}")]
    NotModifiedWithoutEntry(String),

    /// A cache entry could not be serialized.
    #[error("ENCODE_ERROR: {0}")]
    Encode(String),
}

impl Error {
    /// True for the expected miss raised under the only-cached override.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Error::CacheMiss(_))
    }
}
