use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Split};
use tracing::{debug, warn};

use common::event::{Action, FileInfo, NotificationBatch};
use common::remote::{NotificationSource, RemoteError};

use crate::state::STDIN_FEED;

/// One line of the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBatch {
    pub action: Action,
    #[serde(default)]
    pub files: Vec<FileInfo>,
}

/// Notification source reading one JSON batch per line.
///
/// End of input, or a batch with no files, ends the stream. Lines that do
/// not parse, including ones that are not valid UTF-8, are logged and
/// skipped.
pub struct EventFeed<R> {
    lines: Split<R>,
    line: u64,
}

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

impl EventFeed<BoxedReader> {
    /// Open `path`, or stdin when it is `-`.
    pub async fn open(path: &str) -> Result<Self, RemoteError> {
        let reader: Box<dyn AsyncRead + Send + Unpin> = if path == STDIN_FEED {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(Path::new(path))
                .await
                .map_err(|e| RemoteError::Unreachable(format!("event feed {path}: {e}")))?;
            Box::new(file)
        };
        Ok(Self::new(BufReader::new(reader)))
    }
}

impl<R> EventFeed<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.split(b'\n'),
            line: 0,
        }
    }
}

impl<R> fmt::Debug for EventFeed<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFeed")
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R> NotificationSource for EventFeed<R>
where
    R: AsyncBufRead + Send + Unpin + 'static,
{
    async fn next_batch(&mut self) -> Result<Option<NotificationBatch>, RemoteError> {
        loop {
            let Some(raw) = self.lines.next_segment().await? else {
                debug!(lines = self.line, "event feed closed");
                return Ok(None);
            };
            self.line += 1;

            let raw = raw.trim_ascii();
            if raw.is_empty() {
                continue;
            }

            let wire: WireBatch = match serde_json::from_slice(raw) {
                Ok(wire) => wire,
                Err(e) => {
                    warn!(line = self.line, error = %e, "skipping malformed notification");
                    continue;
                }
            };

            return match NotificationBatch::new(wire.action, wire.files) {
                Some(batch) => Ok(Some(batch)),
                None => {
                    debug!(line = self.line, "empty batch, ending stream");
                    Ok(None)
                }
            };
        }
    }
}
