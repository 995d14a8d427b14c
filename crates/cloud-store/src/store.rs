//! Bucket-level API and the concrete [`CloudStore`] client.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::ObjectStore;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::CloudStoreConfig;
use crate::error::{CloudStoreError, Result};
use crate::gcs::{GcsClient, GcsUpload};
use crate::writer::{MemoryBucket, ObjectWriter};

/// One page of a bucket enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketPage {
    pub names: Vec<String>,
    /// Token for the next page; `None` means there are no more results.
    pub next_page_token: Option<String>,
}

/// The slice of a cloud object store the relay sinks consume.
#[async_trait]
pub trait CloudBuckets: Send + Sync + Debug {
    /// List one page of buckets visible in `project`.
    async fn list_buckets(&self, project: &str, page_token: Option<&str>) -> Result<BucketPage>;

    /// Create `name` in `project`, located in `region`.
    async fn create_bucket(&self, project: &str, name: &str, region: &str) -> Result<()>;

    /// Open a streaming writer for `key` in `bucket`.
    fn object_writer(&self, bucket: &str, key: &str) -> Result<ObjectWriter>;
}

#[derive(Debug)]
enum Backend {
    Gcs(Arc<GcsClient>),
    Local { root: PathBuf },
    Memory(Mutex<HashMap<String, MemoryBucket>>),
}

/// Cloud store client selected by [`CloudStoreConfig`].
///
/// GCS and in-memory buckets name objects by the exact key given. The local
/// backend maps keys onto directories, see [`CloudStore::local`].
#[derive(Debug, Clone)]
pub struct CloudStore {
    backend: Arc<Backend>,
}

impl CloudStore {
    pub fn new(config: CloudStoreConfig) -> Result<Self> {
        let backend = match config {
            CloudStoreConfig::Gcs {
                credentials,
                home_bucket,
                endpoint,
            } => {
                info!(bucket = %home_bucket, "using gcs cloud store");
                let client = GcsClient::new(credentials, &home_bucket, endpoint.as_deref())?;
                Backend::Gcs(Arc::new(client))
            }
            CloudStoreConfig::Local { path } => {
                std::fs::create_dir_all(&path)?;
                info!(path = %path.display(), "using local cloud store");
                Backend::Local { root: path }
            }
            CloudStoreConfig::Memory => {
                info!("using in-memory cloud store");
                Backend::Memory(Mutex::new(HashMap::new()))
            }
        };

        Ok(Self {
            backend: Arc::new(backend),
        })
    }

    /// Create a fully ephemeral store. Useful for testing.
    pub fn memory() -> Self {
        Self {
            backend: Arc::new(Backend::Memory(Mutex::new(HashMap::new()))),
        }
    }

    /// Create a store backed by directories under `root`.
    ///
    /// A filesystem cannot tell `docs//a.txt` or `/docs/a.txt` from
    /// `docs/a.txt`, so empty key segments are dropped here.
    pub fn local(root: &FsPath) -> Result<Self> {
        Self::new(CloudStoreConfig::Local {
            path: root.to_path_buf(),
        })
    }

    /// Read a whole object back. Returns `None` if it does not exist.
    pub async fn read_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>> {
        check_key(key)?;
        match self.backend.as_ref() {
            Backend::Gcs(client) => client.read_object(bucket, key).await,
            Backend::Local { root } => {
                let store = local_bucket(root, bucket)?;
                match store.get(&local_key(key)?).await {
                    Ok(result) => Ok(Some(result.bytes().await?)),
                    Err(object_store::Error::NotFound { .. }) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            Backend::Memory(buckets) => {
                let objects = memory_bucket(buckets, bucket)?;
                let object = objects.lock().get(key).cloned();
                Ok(object)
            }
        }
    }
}

#[async_trait]
impl CloudBuckets for CloudStore {
    async fn list_buckets(&self, project: &str, page_token: Option<&str>) -> Result<BucketPage> {
        match self.backend.as_ref() {
            Backend::Gcs(client) => client.list_buckets(project, page_token).await,
            Backend::Local { root } => {
                let mut names = Vec::new();
                let mut entries = tokio::fs::read_dir(root).await?;
                while let Some(entry) = entries.next_entry().await? {
                    if entry.file_type().await?.is_dir() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                names.sort();
                Ok(BucketPage {
                    names,
                    next_page_token: None,
                })
            }
            Backend::Memory(buckets) => {
                let mut names: Vec<String> = buckets.lock().keys().cloned().collect();
                names.sort();
                Ok(BucketPage {
                    names,
                    next_page_token: None,
                })
            }
        }
    }

    async fn create_bucket(&self, project: &str, name: &str, region: &str) -> Result<()> {
        debug!(project = %project, bucket = %name, region = %region, "creating bucket");
        match self.backend.as_ref() {
            Backend::Gcs(client) => client.create_bucket(project, name, region).await,
            Backend::Local { root } => {
                let dir = root.join(name);
                if dir.exists() {
                    return Err(CloudStoreError::BucketExists(name.to_string()));
                }
                tokio::fs::create_dir_all(&dir).await?;
                Ok(())
            }
            Backend::Memory(buckets) => {
                let mut buckets = buckets.lock();
                if buckets.contains_key(name) {
                    return Err(CloudStoreError::BucketExists(name.to_string()));
                }
                buckets.insert(name.to_string(), MemoryBucket::default());
                Ok(())
            }
        }
    }

    fn object_writer(&self, bucket: &str, key: &str) -> Result<ObjectWriter> {
        check_key(key)?;
        match self.backend.as_ref() {
            Backend::Gcs(client) => {
                let upload = GcsUpload::new(client.clone(), bucket, key);
                Ok(ObjectWriter::gcs(upload, bucket, key))
            }
            Backend::Local { root } => {
                let store = local_bucket(root, bucket)?;
                Ok(ObjectWriter::local(store, local_key(key)?, bucket, key))
            }
            Backend::Memory(buckets) => {
                let objects = memory_bucket(buckets, bucket)?;
                Ok(ObjectWriter::memory(objects, bucket, key))
            }
        }
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CloudStoreError::InvalidKey {
            key: key.to_string(),
            reason: "empty key".to_string(),
        });
    }
    Ok(())
}

fn local_bucket(root: &FsPath, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
    let dir = root.join(bucket);
    if !dir.is_dir() {
        return Err(CloudStoreError::BucketNotFound(bucket.to_string()));
    }
    Ok(Arc::new(LocalFileSystem::new_with_prefix(dir)?))
}

/// Key to file path for the local backend. Empty segments are dropped and
/// every other segment is escaped, so this only fails for keys made of
/// nothing but delimiters.
fn local_key(key: &str) -> Result<Path> {
    let path = Path::from(key);
    if path.as_ref().is_empty() {
        return Err(CloudStoreError::InvalidKey {
            key: key.to_string(),
            reason: "no path segments".to_string(),
        });
    }
    Ok(path)
}

fn memory_bucket(
    buckets: &Mutex<HashMap<String, MemoryBucket>>,
    bucket: &str,
) -> Result<MemoryBucket> {
    buckets
        .lock()
        .get(bucket)
        .cloned()
        .ok_or_else(|| CloudStoreError::BucketNotFound(bucket.to_string()))
}
