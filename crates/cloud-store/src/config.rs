use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default endpoint for the GCS JSON API.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Configuration for the cloud store backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CloudStoreConfig {
    /// Google Cloud Storage
    Gcs {
        /// Service account JSON file. Falls back to the ambient
        /// application default credentials when unset.
        credentials: Option<PathBuf>,
        /// Bucket used to resolve credentials for bucket-level calls
        home_bucket: String,
        /// JSON API endpoint (defaults to storage.googleapis.com)
        endpoint: Option<String>,
    },
    /// Local filesystem: one directory per bucket under `path`
    Local { path: PathBuf },
    /// In-memory buckets (data is lost when the store is dropped)
    Memory,
}

impl CloudStoreConfig {
    /// Build a GCS config for the given bucket and optional credentials file.
    pub fn gcs(home_bucket: impl Into<String>, credentials: Option<PathBuf>) -> Self {
        Self::Gcs {
            credentials,
            home_bucket: home_bucket.into(),
            endpoint: None,
        }
    }
}
