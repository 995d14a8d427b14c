//! Streaming object writer.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::ObjectStore;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::Result;
use crate::gcs::GcsUpload;

/// Objects of one in-memory bucket, keyed exactly as written.
pub(crate) type MemoryBucket = Arc<Mutex<BTreeMap<String, Bytes>>>;

const COPY_BUFFER: usize = 64 * 1024;

enum Target {
    Local(BufWriter),
    Memory { objects: MemoryBucket, data: Vec<u8> },
    Gcs(GcsUpload),
}

/// A writable stream into a single cloud object.
///
/// Bytes are buffered and uploaded (in chunks, for large objects) as they
/// are written. The object only becomes visible once [`ObjectWriter::close`]
/// succeeds; [`ObjectWriter::abort`] or dropping the writer unclosed discards
/// whatever was written.
pub struct ObjectWriter {
    target: Target,
    bucket: String,
    key: String,
    written: u64,
}

impl ObjectWriter {
    fn with_target(target: Target, bucket: &str, key: &str) -> Self {
        Self {
            target,
            bucket: bucket.to_string(),
            key: key.to_string(),
            written: 0,
        }
    }

    pub(crate) fn local(store: Arc<dyn ObjectStore>, path: Path, bucket: &str, key: &str) -> Self {
        Self::with_target(Target::Local(BufWriter::new(store, path)), bucket, key)
    }

    pub(crate) fn memory(objects: MemoryBucket, bucket: &str, key: &str) -> Self {
        let target = Target::Memory {
            objects,
            data: Vec::new(),
        };
        Self::with_target(target, bucket, key)
    }

    pub(crate) fn gcs(upload: GcsUpload, bucket: &str, key: &str) -> Self {
        Self::with_target(Target::Gcs(upload), bucket, key)
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match &mut self.target {
            Target::Local(inner) => inner.write_all(buf).await?,
            Target::Memory { data, .. } => data.extend_from_slice(buf),
            Target::Gcs(upload) => upload.write(buf).await?,
        }
        self.written += buf.len() as u64;
        Ok(())
    }

    /// Stream everything from `reader` into the object.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; COPY_BUFFER];
        let mut copied = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(copied);
            }
            self.write_all(&buf[..n]).await?;
            copied += n as u64;
        }
    }

    /// Flush remaining bytes and complete the object.
    pub async fn close(self) -> Result<u64> {
        match self.target {
            Target::Local(mut inner) => inner.shutdown().await?,
            Target::Memory { objects, data } => {
                objects.lock().insert(self.key.clone(), Bytes::from(data));
            }
            Target::Gcs(upload) => upload.finish().await?,
        }
        tracing::debug!(
            bucket = %self.bucket,
            key = %self.key,
            bytes = self.written,
            "object writer closed"
        );
        Ok(self.written)
    }

    /// Discard the object, cleaning up any partially uploaded parts.
    pub async fn abort(self) -> Result<()> {
        match self.target {
            Target::Local(mut inner) => inner.abort().await?,
            Target::Memory { .. } => {}
            Target::Gcs(upload) => upload.cancel().await?,
        }
        tracing::debug!(bucket = %self.bucket, key = %self.key, "object writer aborted");
        Ok(())
    }
}

impl fmt::Debug for ObjectWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}
