use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use cloud_store::{CloudStore, CloudStoreError};
use common::sink::bucket_exists;
use relay_daemon::remote::VolumeMount;
use relay_daemon::state::{AppState, StateError};

/// Validate the config and check the remote volume and bucket.
///
/// Never creates the bucket.
#[derive(Args, Debug, Clone)]
pub struct Check;

#[derive(Debug)]
pub enum BucketStatus {
    Disabled,
    Present(String),
    Missing(String),
    Unreachable(String),
}

#[derive(Debug)]
pub struct CheckOutput {
    pub config_path: PathBuf,
    pub daemon_id: String,
    pub url: String,
    pub mount: Result<PathBuf, String>,
    pub bucket: BucketStatus,
    pub mirror: Option<PathBuf>,
}

impl fmt::Display for CheckOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", "Config".bold())?;
        writeln!(f, "  {} {}", "file:".dimmed(), self.config_path.display())?;
        writeln!(f, "  {} {}", "id:".dimmed(), self.daemon_id)?;
        writeln!(f)?;

        writeln!(f, "{} ({}):", "Remote".bold(), self.url)?;
        match &self.mount {
            Ok(path) => writeln!(
                f,
                "  {} {} {}",
                "mount:".dimmed(),
                path.display(),
                "OK".green()
            )?,
            Err(e) => writeln!(f, "  {} {}", "mount:".dimmed(), e.red())?,
        }
        writeln!(f)?;

        writeln!(f, "{}:", "Sinks".bold())?;
        match &self.bucket {
            BucketStatus::Disabled => {
                writeln!(f, "  {} {}", "cloud:".dimmed(), "disabled".dimmed())?
            }
            BucketStatus::Present(name) => {
                writeln!(f, "  {} {} {}", "cloud:".dimmed(), name, "OK".green())?
            }
            BucketStatus::Missing(name) => writeln!(
                f,
                "  {} {} {}",
                "cloud:".dimmed(),
                name,
                "MISSING (created on listen)".yellow()
            )?,
            BucketStatus::Unreachable(e) => writeln!(f, "  {} {}", "cloud:".dimmed(), e.red())?,
        }
        match &self.mirror {
            Some(path) => write!(f, "  {} {}", "mirror:".dimmed(), path.display()),
            None => write!(f, "  {} {}", "mirror:".dimmed(), "disabled".dimmed()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("config error: {0}")]
    StateError(#[from] StateError),
}

async fn inspect_bucket(
    store: Result<CloudStore, CloudStoreError>,
    project: &str,
    bucket: &str,
) -> BucketStatus {
    let store = match store {
        Ok(store) => store,
        Err(e) => return BucketStatus::Unreachable(e.to_string()),
    };
    match bucket_exists(&store, project, bucket).await {
        Ok(true) => BucketStatus::Present(bucket.to_string()),
        Ok(false) => BucketStatus::Missing(bucket.to_string()),
        Err(e) => BucketStatus::Unreachable(e.to_string()),
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Check {
    type Error = CheckError;
    type Output = CheckOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = &state.config;

        let mount = match VolumeMount::connect(&config.remote.mount_path).await {
            Ok(volume) => Ok(volume.root().to_path_buf()),
            Err(e) => Err(e.to_string()),
        };

        let cloud = &config.sinks.cloud;
        let bucket = if cloud.enabled {
            let store = CloudStore::new(config.cloud_store_config());
            inspect_bucket(store, &cloud.project, &cloud.bucket).await
        } else {
            BucketStatus::Disabled
        };

        let mirror = config
            .sinks
            .mirror
            .enabled
            .then(|| config.sinks.mirror.base_path.clone());

        Ok(CheckOutput {
            config_path: state.config_path.clone(),
            daemon_id: config.daemon_id(),
            url: config.remote.url.clone(),
            mount,
            bucket,
            mirror,
        })
    }
}
