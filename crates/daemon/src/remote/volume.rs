use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use common::remote::{RemoteError, RemoteStore};

/// Reads remote files through the store's mounted volume.
#[derive(Debug, Clone)]
pub struct VolumeMount {
    root: PathBuf,
}

impl VolumeMount {
    /// Fails with [`RemoteError::Unreachable`] unless `root` is a directory.
    pub async fn connect(root: &Path) -> Result<Self, RemoteError> {
        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => {
                debug!(root = %root.display(), "remote volume reachable");
                Ok(Self {
                    root: root.to_path_buf(),
                })
            }
            Ok(_) => Err(RemoteError::Unreachable(format!(
                "{} is not a directory",
                root.display()
            ))),
            Err(e) => Err(RemoteError::Unreachable(format!(
                "{}: {}",
                root.display(),
                e
            ))),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, remote_path: &str) -> Result<PathBuf, RemoteError> {
        let relative = Path::new(remote_path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.as_os_str().is_empty() || escapes {
            return Err(RemoteError::Retrieve {
                path: remote_path.to_string(),
                reason: "path is outside the volume".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl RemoteStore for VolumeMount {
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), RemoteError> {
        let source = self.resolve(remote_path)?;
        match tokio::fs::copy(&source, local_path).await {
            Ok(bytes) => {
                debug!(path = %remote_path, bytes, "copied from volume");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(RemoteError::Retrieve {
                path: remote_path.to_string(),
                reason: "no such file on the volume".to_string(),
            }),
            Err(e) => Err(RemoteError::Io(e)),
        }
    }
}
