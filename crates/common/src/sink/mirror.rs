use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::event::{ChangeEvent, FileInfo, FileType};
use crate::remote::RemoteStore;

use super::{Sink, SinkError, TransferError};

/// Prefix for in-progress copies next to their destination.
const PARTIAL_PREFIX: &str = ".relay-partial";

/// Mirrors dispatched files under a local base path and reconciles their
/// mode and ownership.
#[derive(Debug)]
pub struct LocalMirrorSink {
    remote: Arc<dyn RemoteStore>,
    config: MirrorConfig,
}

impl LocalMirrorSink {
    pub fn new(remote: Arc<dyn RemoteStore>, config: &MirrorConfig) -> Self {
        Self {
            remote,
            config: config.clone(),
        }
    }

    /// Map a store path to its location under the base path.
    ///
    /// Leading slashes are dropped so absolute store paths stay under the
    /// base. Paths that are empty or climb out with `..` are rejected.
    pub fn destination(&self, path: &str) -> Result<PathBuf, SinkError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return Err(SinkError::InvalidPath {
                path: path.to_string(),
                reason: "empty path",
            });
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(SinkError::InvalidPath {
                path: path.to_string(),
                reason: "path escapes the mirror base",
            });
        }
        Ok(self.config.base_path.join(relative))
    }

    /// Copy the file into place, then reconcile its metadata.
    ///
    /// The bytes land in a temporary sibling which is renamed over the
    /// destination, so an interrupted copy never leaves a truncated file.
    pub async fn mirror(&self, event: &ChangeEvent) -> Result<PathBuf, SinkError> {
        let dest = self.destination(event.path())?;

        if event.file.file_type == FileType::Directory {
            tokio::fs::create_dir_all(&dest).await?;
        } else {
            let parent = dest.parent().unwrap_or(&self.config.base_path);
            tokio::fs::create_dir_all(parent).await?;

            let partial = tempfile::Builder::new()
                .prefix(PARTIAL_PREFIX)
                .tempfile_in(parent)
                .map_err(TransferError::TempFile)?;
            self.remote
                .download(event.path(), partial.path())
                .await
                .map_err(TransferError::Retrieve)?;
            partial.persist(&dest).map_err(|e| SinkError::Io(e.error))?;
        }
        debug!(path = %event.path(), dest = %dest.display(), "file mirrored");

        self.reconcile(&dest, &event.file).await;

        info!(path = %event.path(), dest = %dest.display(), "mirror updated");
        Ok(dest)
    }

    /// Apply mode and ownership. Failures are logged and independent.
    async fn reconcile(&self, dest: &Path, file: &FileInfo) {
        match self.resolve_mode(file) {
            Some(mode) => {
                if let Err(e) = set_mode(dest, mode).await {
                    let octal = format!("{mode:o}");
                    warn!(dest = %dest.display(), mode = %octal, error = %e, "chmod failed");
                }
            }
            None if self.config.permissions.is_none() && file.permissions > 0 => {
                warn!(
                    dest = %dest.display(),
                    permissions = file.permissions,
                    "permission value is not octal, leaving mode unchanged"
                );
            }
            None => {}
        }

        let owner = resolve_id(file.user_id, self.config.owner);
        let group = resolve_id(file.group_id, self.config.group);
        if let (Some(uid), Some(gid)) = (owner, group) {
            if let Err(e) = set_owner(dest, uid, gid) {
                warn!(dest = %dest.display(), uid, gid, error = %e, "chown failed");
            }
        }
    }

    fn resolve_mode(&self, file: &FileInfo) -> Option<u32> {
        self.config
            .permissions
            .or_else(|| file.octal_mode())
            .filter(|mode| *mode > 0)
    }
}

/// A non-zero override wins; otherwise the event's id if it is positive.
fn resolve_id(event_id: i64, override_id: u32) -> Option<u32> {
    if override_id != 0 {
        return Some(override_id);
    }
    u32::try_from(event_id).ok().filter(|id| *id > 0)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_owner(path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
    std::os::unix::fs::chown(path, Some(uid), Some(gid))
}

#[cfg(not(unix))]
fn set_owner(_path: &Path, _uid: u32, _gid: u32) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl Sink for LocalMirrorSink {
    fn name(&self) -> &'static str {
        "mirror"
    }

    async fn apply(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        self.mirror(event).await?;
        Ok(())
    }
}
