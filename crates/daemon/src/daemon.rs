//! Detaching the relay from its terminal.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use daemonize::Daemonize;

const RUN_DIR: &str = "/var/run";
const LOG_DIR: &str = "/var/log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPaths {
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
}

impl DaemonPaths {
    /// Paths for the relay identified by `id` (see [`crate::state::daemon_id`]).
    pub fn for_id(id: &str) -> Self {
        Self {
            pid_file: PathBuf::from(RUN_DIR).join(format!("relay-{id}.pid")),
            log_file: PathBuf::from(LOG_DIR).join(format!("relay-{id}.log")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to daemonize: {0}")]
    Start(#[from] daemonize::Error),
}

fn open_log(paths: &DaemonPaths) -> Result<File, DaemonError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o640)
        .open(&paths.log_file)
        .map_err(|source| DaemonError::LogFile {
            path: paths.log_file.clone(),
            source,
        })
}

/// Fork into the background. Only the child returns.
///
/// Must run before the async runtime is built.
pub fn detach(paths: &DaemonPaths) -> Result<(), DaemonError> {
    let stdout = open_log(paths)?;
    let stderr = open_log(paths)?;

    Daemonize::new()
        .pid_file(&paths.pid_file)
        .working_directory(RUN_DIR)
        .umask(0o027)
        .stdout(stdout)
        .stderr(stderr)
        .start()?;
    Ok(())
}
