//! Cloud object storage for relay sinks.
//!
//! This crate exposes the narrow slice of a cloud object store the relay
//! needs: enumerate and create buckets, and stream bytes into an object.
//! Everything goes through the [`CloudBuckets`] trait so sink adapters can be
//! built against a mock in tests.
//!
//! # Backends
//!
//! - **GCS**: Google Cloud Storage through its JSON API, with resumable
//!   uploads for objects
//! - **Local**: buckets are directories, objects are files
//! - **Memory**: in-process buckets, useful for tests and dry runs
//!
//! Object keys are used as given. Only the local backend rewrites them,
//! dropping empty segments it cannot represent on disk.
//!
//! # Example
//!
//! ```rust,no_run
//! use cloud_store::{CloudBuckets, CloudStore, CloudStoreConfig};
//!
//! # async fn example() -> Result<(), cloud_store::CloudStoreError> {
//! let store = CloudStore::new(CloudStoreConfig::Memory)?;
//! store.create_bucket("my-project", "backups", "US").await?;
//!
//! let mut writer = store.object_writer("backups", "docs/readme.txt")?;
//! writer.copy_from(&mut &b"hello"[..]).await?;
//! writer.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod gcs;
mod store;
mod writer;

pub use config::CloudStoreConfig;
pub use error::{CloudStoreError, Result};
pub use store::{BucketPage, CloudBuckets, CloudStore};
pub use writer::ObjectWriter;
