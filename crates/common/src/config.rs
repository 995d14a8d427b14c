//! Sink configuration.
//!
//! Plain data, read-only once the dispatch loop starts. Client handles are
//! never stored here; they are passed to the sinks that need them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::event::Action;

/// Default region for newly created buckets.
pub const DEFAULT_REGION: &str = "US";

/// Default directory for upload staging files.
pub const DEFAULT_TEMP_DIR: &str = "/tmp";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cloud sink is enabled but no bucket name is configured")]
    EmptyBucket,
    #[error("local mirror is enabled but no base path is configured")]
    EmptyMirrorPath,
}

/// Which upstream actions are relayed, and which paths never are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub download: bool,
    pub upload: bool,
    pub write: bool,
    pub delete: bool,
    /// Literal path prefixes excluded from all processing, checked in order
    pub ignore: Vec<String>,
}

impl ListenerConfig {
    pub fn is_enabled(&self, action: Action) -> bool {
        match action {
            Action::Download => self.download,
            Action::Upload => self.upload,
            Action::Write => self.write,
            Action::Delete => self.delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSinkConfig {
    pub enabled: bool,
    pub bucket: String,
    pub project: String,
    /// Service account JSON; ambient credentials are used when unset
    pub credentials: Option<PathBuf>,
    /// Where per-upload staging files are created
    pub temp_dir: PathBuf,
    pub region: String,
}

impl Default for CloudSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket: String::new(),
            project: String::new(),
            credentials: None,
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            region: DEFAULT_REGION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enabled: bool,
    pub base_path: PathBuf,
    /// Owner override; 0 keeps the event's owner
    pub owner: u32,
    /// Group override; 0 keeps the event's group
    pub group: u32,
    /// Mode override, applied verbatim (write it as `0o644` in TOML)
    pub permissions: Option<u32>,
}

/// Process-wide sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub listener: ListenerConfig,
    pub cloud: CloudSinkConfig,
    pub mirror: MirrorConfig,
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cloud.enabled && self.cloud.bucket.trim().is_empty() {
            return Err(ConfigError::EmptyBucket);
        }
        if self.mirror.enabled && self.mirror.base_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyMirrorPath);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SinkConfig::default();
        assert!(!config.cloud.enabled);
        assert_eq!(config.cloud.region, "US");
        assert_eq!(config.cloud.temp_dir, PathBuf::from("/tmp"));
        assert!(config.mirror.permissions.is_none());
        assert!(Action::ALL.iter().all(|a| !config.listener.is_enabled(*a)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_listener_flags() {
        let listener = ListenerConfig {
            download: true,
            write: true,
            ..Default::default()
        };
        assert!(listener.is_enabled(Action::Download));
        assert!(listener.is_enabled(Action::Write));
        assert!(!listener.is_enabled(Action::Upload));
        assert!(!listener.is_enabled(Action::Delete));
    }

    #[test]
    fn test_validate() {
        let mut config = SinkConfig::default();
        config.cloud.enabled = true;
        assert_eq!(config.validate(), Err(ConfigError::EmptyBucket));

        config.cloud.bucket = "backups".into();
        config.mirror.enabled = true;
        assert_eq!(config.validate(), Err(ConfigError::EmptyMirrorPath));

        config.mirror.base_path = "/srv/mirror".into();
        assert!(config.validate().is_ok());
    }
}
