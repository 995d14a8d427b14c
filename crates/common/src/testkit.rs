//! In-process fakes for the remote store, for tests in this and
//! downstream crates.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::event::NotificationBatch;
use crate::remote::{NotificationSource, RemoteError, RemoteStore};

/// How a [`ScriptedSource`] behaves once its batches run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterScript {
    /// Return the end-of-stream sentinel
    End,
    /// Fail with a stream error
    Fail,
    /// Never yield again (a live stream with nothing happening)
    Hang,
}

/// A notification source replaying a fixed list of batches.
#[derive(Debug)]
pub struct ScriptedSource {
    batches: VecDeque<NotificationBatch>,
    after: AfterScript,
}

impl ScriptedSource {
    pub fn new(batches: impl IntoIterator<Item = NotificationBatch>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
            after: AfterScript::End,
        }
    }

    pub fn then(mut self, after: AfterScript) -> Self {
        self.after = after;
        self
    }
}

#[async_trait]
impl NotificationSource for ScriptedSource {
    async fn next_batch(&mut self) -> Result<Option<NotificationBatch>, RemoteError> {
        if let Some(batch) = self.batches.pop_front() {
            return Ok(Some(batch));
        }
        match self.after {
            AfterScript::End => Ok(None),
            AfterScript::Fail => Err(RemoteError::Stream("scripted failure".to_string())),
            AfterScript::Hang => std::future::pending().await,
        }
    }
}

/// A remote store holding file contents in memory.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    files: Mutex<HashMap<String, Vec<u8>>>,
    downloads: Mutex<Vec<(String, PathBuf)>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        self.files.lock().insert(path.to_string(), data.to_vec());
    }

    /// Every `(remote_path, local_path)` pair requested so far.
    pub fn downloads(&self) -> Vec<(String, PathBuf)> {
        self.downloads.lock().clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), RemoteError> {
        self.downloads
            .lock()
            .push((remote_path.to_string(), local_path.to_path_buf()));

        let data = self.files.lock().get(remote_path).cloned().ok_or_else(|| {
            RemoteError::Retrieve {
                path: remote_path.to_string(),
                reason: "no such file".to_string(),
            }
        })?;
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }
}

/// A remote store that writes the start of a file and then never finishes.
#[derive(Debug, Default)]
pub struct StallingRemote {
    stalled: Notify,
}

impl StallingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a download has written its partial bytes.
    pub async fn stalled(&self) {
        self.stalled.notified().await
    }
}

#[async_trait]
impl RemoteStore for StallingRemote {
    async fn download(&self, _remote_path: &str, local_path: &Path) -> Result<(), RemoteError> {
        tokio::fs::write(local_path, b"first half of the file").await?;
        self.stalled.notify_one();
        std::future::pending().await
    }
}
