//! Sink adapters.
//!
//! A sink receives a copy of a changed file. Sinks are independent: each one
//! only reads the event and writes to its own destination, so several can run
//! for the same event without coordinating.

mod cloud;
mod mirror;
mod provision;

pub use cloud::CloudUploadSink;
pub use mirror::LocalMirrorSink;
pub use provision::{bucket_exists, provision_bucket, ProvisionError, Provisioned};

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use cloud_store::{CloudBuckets, CloudStoreError};

use crate::config::SinkConfig;
use crate::event::ChangeEvent;
use crate::remote::{RemoteError, RemoteStore};

/// Failure moving bytes from the remote store to a destination.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to stage temporary file: {0}")]
    TempFile(#[source] std::io::Error),
    #[error("remote retrieval failed: {0}")]
    Retrieve(#[from] RemoteError),
    #[error("object write failed: {0}")]
    Write(#[source] CloudStoreError),
    #[error("object close failed: {0}")]
    Close(#[source] CloudStoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A destination for dispatched change events.
#[async_trait]
pub trait Sink: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn apply(&self, event: &ChangeEvent) -> Result<(), SinkError>;
}

/// Build the enabled sinks in invocation order: cloud first, then mirror.
///
/// `buckets` is only consulted when the cloud sink is enabled.
pub fn enabled_sinks(
    config: &SinkConfig,
    remote: Arc<dyn RemoteStore>,
    buckets: Option<Arc<dyn CloudBuckets>>,
) -> Vec<Arc<dyn Sink>> {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

    if config.cloud.enabled {
        match buckets {
            Some(buckets) => sinks.push(Arc::new(CloudUploadSink::new(
                remote.clone(),
                buckets,
                &config.cloud,
            ))),
            None => tracing::warn!("cloud sink enabled without a bucket client, skipping"),
        }
    }
    if config.mirror.enabled {
        sinks.push(Arc::new(LocalMirrorSink::new(remote, &config.mirror)));
    }

    sinks
}
