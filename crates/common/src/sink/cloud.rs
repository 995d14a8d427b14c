use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use cloud_store::CloudBuckets;
use tracing::{debug, info, warn};

use crate::config::CloudSinkConfig;
use crate::event::ChangeEvent;
use crate::remote::RemoteStore;

use super::{Sink, SinkError, TransferError};

/// Prefix for staging files in the temp dir.
const STAGING_PREFIX: &str = "sdfs";

/// Uploads each dispatched file to a bucket, keyed by its store path.
#[derive(Debug)]
pub struct CloudUploadSink {
    remote: Arc<dyn RemoteStore>,
    buckets: Arc<dyn CloudBuckets>,
    bucket: String,
    temp_dir: PathBuf,
}

impl CloudUploadSink {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        buckets: Arc<dyn CloudBuckets>,
        config: &CloudSinkConfig,
    ) -> Self {
        Self {
            remote,
            buckets,
            bucket: config.bucket.clone(),
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// Stage the file locally, then stream it into the bucket.
    ///
    /// Returns the number of bytes written. The staging file is removed on
    /// every exit path, including when this future is dropped.
    pub async fn upload(&self, event: &ChangeEvent) -> Result<u64, TransferError> {
        let key = event.path();

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.temp_dir)
            .map_err(TransferError::TempFile)?;
        debug!(path = %key, staging = %staging.path().display(), "staging file for upload");

        self.remote.download(key, staging.path()).await?;

        let mut file = tokio::fs::File::open(staging.path())
            .await
            .map_err(TransferError::TempFile)?;

        let mut writer = self
            .buckets
            .object_writer(&self.bucket, key)
            .map_err(TransferError::Write)?;

        if let Err(e) = writer.copy_from(&mut file).await {
            if let Err(abort_err) = writer.abort().await {
                warn!(path = %key, error = %abort_err, "failed to abort object write");
            }
            return Err(TransferError::Write(e));
        }
        let bytes = writer.close().await.map_err(TransferError::Close)?;

        drop(file);
        if let Err(e) = staging.close() {
            warn!(path = %key, error = %e, "failed to remove staging file");
        }

        info!(bucket = %self.bucket, path = %key, bytes, "blob uploaded");
        Ok(bytes)
    }
}

#[async_trait]
impl Sink for CloudUploadSink {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn apply(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        self.upload(event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cloud_store::{BucketPage, CloudStore, CloudStoreError, ObjectWriter};

    use crate::event::{Action, FileInfo};
    use crate::testkit::{MemoryRemote, StallingRemote};

    #[derive(Debug)]
    struct NoWrites;

    #[async_trait]
    impl CloudBuckets for NoWrites {
        async fn list_buckets(
            &self,
            _project: &str,
            _page_token: Option<&str>,
        ) -> cloud_store::Result<BucketPage> {
            Ok(BucketPage::default())
        }

        async fn create_bucket(&self, _: &str, _: &str, _: &str) -> cloud_store::Result<()> {
            Ok(())
        }

        fn object_writer(&self, bucket: &str, _key: &str) -> cloud_store::Result<ObjectWriter> {
            Err(CloudStoreError::BucketNotFound(bucket.to_string()))
        }
    }

    fn config(temp_dir: &std::path::Path) -> CloudSinkConfig {
        CloudSinkConfig {
            enabled: true,
            bucket: "backups".into(),
            project: "proj".into(),
            temp_dir: temp_dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn write_event(path: &str) -> ChangeEvent {
        ChangeEvent::new(Action::Write, FileInfo::at(path))
    }

    #[tokio::test]
    async fn test_upload_writes_object_under_event_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemote::new().with_file("docs/readme.txt", b"read me"));
        let store = CloudStore::memory();
        store.create_bucket("proj", "backups", "US").await.unwrap();

        let sink = CloudUploadSink::new(
            remote.clone(),
            Arc::new(store.clone()),
            &config(temp_dir.path()),
        );
        let bytes = sink.upload(&write_event("docs/readme.txt")).await.unwrap();
        assert_eq!(bytes, 7);

        let object = store
            .read_object("backups", "docs/readme.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(object.as_ref(), b"read me");

        let downloads = remote.downloads();
        assert_eq!(downloads.len(), 1);
        let staged = &downloads[0].1;
        assert!(staged.starts_with(temp_dir.path()));
        assert!(staged
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(STAGING_PREFIX));
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_object_key_is_the_event_path_verbatim() {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(
            MemoryRemote::new()
                .with_file("/top.txt", b"top")
                .with_file("docs//a.txt", b"nested"),
        );
        let store = CloudStore::memory();
        store.create_bucket("proj", "backups", "US").await.unwrap();
        let sink = CloudUploadSink::new(remote, Arc::new(store.clone()), &config(temp_dir.path()));

        assert_eq!(sink.upload(&write_event("/top.txt")).await.unwrap(), 3);
        assert_eq!(sink.upload(&write_event("docs//a.txt")).await.unwrap(), 6);

        let top = store.read_object("backups", "/top.txt").await.unwrap();
        assert_eq!(top.unwrap().as_ref(), b"top");
        let nested = store.read_object("backups", "docs//a.txt").await.unwrap();
        assert_eq!(nested.unwrap().as_ref(), b"nested");
        assert!(store
            .read_object("backups", "top.txt")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_dropped_upload_leaves_nothing_behind() {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StallingRemote::new());
        let store = CloudStore::memory();
        store.create_bucket("proj", "backups", "US").await.unwrap();
        let sink = CloudUploadSink::new(
            remote.clone(),
            Arc::new(store.clone()),
            &config(temp_dir.path()),
        );

        let event = write_event("big.bin");
        let mut upload = Box::pin(sink.upload(&event));
        tokio::select! {
            _ = &mut upload => panic!("upload finished on a stalled remote"),
            _ = remote.stalled() => {}
        }

        let staged: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].starts_with(STAGING_PREFIX));

        drop(upload);

        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
        assert!(store
            .read_object("backups", "big.bin")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_retrieval_failure_cleans_staging_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let store = CloudStore::memory();
        store.create_bucket("proj", "backups", "US").await.unwrap();

        let sink = CloudUploadSink::new(
            remote.clone(),
            Arc::new(store.clone()),
            &config(temp_dir.path()),
        );
        let err = sink.upload(&write_event("missing.bin")).await.unwrap_err();
        assert!(matches!(err, TransferError::Retrieve(_)));

        assert!(!remote.downloads()[0].1.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
        assert!(store
            .read_object("backups", "missing.bin")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_write_failure_cleans_staging_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemote::new().with_file("a.txt", b"a"));

        let sink = CloudUploadSink::new(
            remote.clone(),
            Arc::new(NoWrites),
            &config(temp_dir.path()),
        );
        let err = sink.upload(&write_event("a.txt")).await.unwrap_err();
        assert!(matches!(err, TransferError::Write(_)));

        assert!(!remote.downloads()[0].1.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_temp_dir_is_a_transfer_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemote::new().with_file("a.txt", b"a"));
        let sink = CloudUploadSink::new(
            remote.clone(),
            Arc::new(CloudStore::memory()),
            &config(&temp_dir.path().join("does-not-exist")),
        );

        let err = sink.apply(&write_event("a.txt")).await.unwrap_err();
        assert!(matches!(err, SinkError::Transfer(TransferError::TempFile(_))));
        assert!(remote.downloads().is_empty());
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_object() {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemote::new().with_file("a.txt", b"first"));
        let store = CloudStore::memory();
        store.create_bucket("proj", "backups", "US").await.unwrap();
        let sink = CloudUploadSink::new(
            remote.clone(),
            Arc::new(store.clone()),
            &config(temp_dir.path()),
        );

        sink.upload(&write_event("a.txt")).await.unwrap();
        remote.insert("a.txt", b"second");
        sink.upload(&write_event("a.txt")).await.unwrap();

        let object = store
            .read_object("backups", "a.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(object.as_ref(), b"second");
    }
}
