use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use relay_daemon::state::{AppConfig, AppState, RemoteConfig};

/// Write a starter config file.
#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Remote store URL (sdfs:// or sdfss://)
    #[arg(long, default_value = "sdfss://localhost:6442")]
    pub url: String,

    /// Where the remote volume is mounted
    #[arg(long, default_value = "/media/sdfs")]
    pub mount_path: PathBuf,

    /// Notification feed: a file, a FIFO, or `-` for stdin
    #[arg(long, default_value = "-")]
    pub events: String,

    /// Enable the cloud sink with this bucket
    #[arg(long)]
    pub bucket: Option<String>,

    /// Cloud project that owns the bucket
    #[arg(long, default_value = "")]
    pub project: String,

    /// Enable the local mirror under this directory
    #[arg(long)]
    pub mirror_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct InitOutput {
    pub config_path: PathBuf,
    pub url: String,
    pub mount_path: PathBuf,
    pub bucket: Option<String>,
    pub mirror_path: Option<PathBuf>,
}

impl fmt::Display for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} relay at {}",
            "Initialized".green().bold(),
            self.config_path.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Remote:".dimmed(), self.url)?;
        writeln!(f, "  {} {}", "Mount:".dimmed(), self.mount_path.display())?;
        let bucket = match &self.bucket {
            Some(bucket) => bucket.clone(),
            None => "disabled".to_string(),
        };
        writeln!(f, "  {} {}", "Bucket:".dimmed(), bucket)?;
        let mirror = match &self.mirror_path {
            Some(path) => path.display().to_string(),
            None => "disabled".to_string(),
        };
        write!(f, "  {} {}", "Mirror:".dimmed(), mirror)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] relay_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = InitOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            remote: RemoteConfig {
                url: self.url.clone(),
                mount_path: self.mount_path.clone(),
                events: self.events.clone(),
            },
            ..Default::default()
        };

        let listener = &mut config.sinks.listener;
        listener.download = true;
        listener.upload = true;
        listener.write = true;

        if let Some(bucket) = &self.bucket {
            config.sinks.cloud.enabled = true;
            config.sinks.cloud.bucket = bucket.clone();
            config.sinks.cloud.project = self.project.clone();
        }
        if let Some(path) = &self.mirror_path {
            config.sinks.mirror.enabled = true;
            config.sinks.mirror.base_path = path.clone();
        }
        config.validate()?;

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        Ok(InitOutput {
            config_path: state.config_path,
            url: state.config.remote.url,
            mount_path: state.config.remote.mount_path,
            bucket: self.bucket.clone(),
            mirror_path: self.mirror_path.clone(),
        })
    }
}
