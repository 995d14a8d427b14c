//! Interfaces consumed from the remote store.
//!
//! The transport behind these traits (connection, authentication, the
//! notification stream itself) lives outside this crate.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;

use crate::event::NotificationBatch;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote store unreachable: {0}")]
    Unreachable(String),
    #[error("failed to retrieve {path}: {reason}")]
    Retrieve { path: String, reason: String },
    #[error("notification stream failed: {0}")]
    Stream(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered stream of notification batches.
#[async_trait]
pub trait NotificationSource: Send + Debug + 'static {
    /// Wait for the next batch. `Ok(None)` is the end-of-stream sentinel.
    async fn next_batch(&mut self) -> Result<Option<NotificationBatch>, RemoteError>;
}

/// Retrieval of a file's current bytes.
#[async_trait]
pub trait RemoteStore: Send + Sync + Debug {
    /// Copy `remote_path` into `local_path`, replacing whatever is there.
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), RemoteError>;
}
