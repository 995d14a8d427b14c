//! Error types for cloud storage operations.

use thiserror::Error;

/// Errors that can occur talking to the cloud object store.
#[derive(Debug, Error)]
pub enum CloudStoreError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bucket api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket already exists: {0}")]
    BucketExists(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Result type for cloud storage operations.
pub type Result<T> = std::result::Result<T, CloudStoreError>;
