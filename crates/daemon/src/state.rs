use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use cloud_store::CloudStoreConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use common::config::{ConfigError, SinkConfig};

pub const APP_NAME: &str = "relay";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CONFIG_ENV: &str = "RELAY_CONFIG";
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Accepted remote URL schemes (plain and TLS).
pub const REMOTE_SCHEMES: [&str; 2] = ["sdfs://", "sdfss://"];

/// Stdin as the notification feed.
pub const STDIN_FEED: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Remote store address, `sdfs://host:port` or `sdfss://host:port`
    pub url: String,
    /// Where the remote volume is mounted locally
    pub mount_path: PathBuf,
    /// Newline-delimited JSON notification feed: a file, a FIFO, or `-`
    pub events: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "sdfss://localhost:6442".to_string(),
            mount_path: PathBuf::from("/media/sdfs"),
            events: STDIN_FEED.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    #[serde(flatten)]
    pub sinks: SinkConfig,
    /// Bucket backend override. Unset means Google Cloud Storage using
    /// the `[cloud]` credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_store: Option<CloudStoreConfig>,
}

impl AppConfig {
    pub fn parse(raw: &str) -> Result<Self, StateError> {
        Ok(toml::from_str(raw)?)
    }

    /// Normalise and check the configuration.
    ///
    /// The remote URL is lower-cased before its scheme is checked.
    pub fn validate(&mut self) -> Result<(), StateError> {
        self.remote.url = self.remote.url.trim().to_lowercase();
        if !REMOTE_SCHEMES
            .iter()
            .any(|scheme| self.remote.url.starts_with(scheme))
        {
            return Err(StateError::InvalidRemoteUrl(self.remote.url.clone()));
        }
        if self.remote.events.trim().is_empty() {
            return Err(StateError::MissingEventFeed);
        }
        self.sinks.validate()?;
        Ok(())
    }

    /// A detached daemon has no stdin to read notifications from.
    pub fn check_detachable(&self) -> Result<(), StateError> {
        if self.remote.events.trim() == STDIN_FEED {
            return Err(StateError::StdinFeedDetached);
        }
        Ok(())
    }

    /// Explicit credentials from the environment win over the config file.
    pub fn override_credentials(&mut self, credentials: Option<PathBuf>) {
        if let Some(path) = credentials.filter(|p| !p.as_os_str().is_empty()) {
            self.sinks.cloud.credentials = Some(path);
        }
    }

    /// Backend used for the cloud sink.
    pub fn cloud_store_config(&self) -> CloudStoreConfig {
        self.cloud_store.clone().unwrap_or_else(|| {
            CloudStoreConfig::gcs(
                self.sinks.cloud.bucket.clone(),
                self.sinks.cloud.credentials.clone(),
            )
        })
    }

    /// Stable identifier for this relay, derived from the remote URL.
    pub fn daemon_id(&self) -> String {
        daemon_id(&self.remote.url)
    }
}

/// URL-safe base64 of the SHA-256 of `url`.
pub fn daemon_id(url: &str) -> String {
    URL_SAFE.encode(Sha256::digest(url.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the relay directory (~/.relay unless the config lives elsewhere)
    pub relay_dir: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// Resolve the config file path: explicit path, then `$RELAY_CONFIG`
    /// (handled by clap), then `~/.relay/config.toml`.
    pub fn config_path(config_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = config_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::HomeDirNotFound)?;
        Ok(home.join(format!(".{}", APP_NAME)).join(CONFIG_FILE_NAME))
    }

    /// Write a fresh config file. Fails if one already exists.
    pub fn init(
        config_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let config_path = Self::config_path(config_path)?;
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(config_path));
        }

        let relay_dir = parent_dir(&config_path);
        fs::create_dir_all(&relay_dir)?;

        let config = config.unwrap_or_default();
        let raw = toml::to_string_pretty(&config)?;
        fs::write(&config_path, raw)?;

        Ok(Self {
            relay_dir,
            config_path,
            config,
        })
    }

    /// Load, apply environment overrides and validate.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, StateError> {
        let config_path = Self::config_path(config_path)?;
        if !config_path.exists() {
            return Err(StateError::NotInitialized(config_path));
        }

        let raw = fs::read_to_string(&config_path)?;
        let mut config = AppConfig::parse(&raw)?;
        config.override_credentials(std::env::var_os(CREDENTIALS_ENV).map(PathBuf::from));
        config.validate()?;

        Ok(Self {
            relay_dir: parent_dir(&config_path),
            config_path,
            config,
        })
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine the home directory")]
    HomeDirNotFound,
    #[error("relay is not initialized, no config at {0} (run `relay init`)")]
    NotInitialized(PathBuf),
    #[error("config already exists at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("remote url {0:?} must start with sdfs:// or sdfss://")]
    InvalidRemoteUrl(String),
    #[error("remote.events must name a file, a fifo or `-`")]
    MissingEventFeed,
    #[error("cannot daemonize with remote.events on stdin, use a file or fifo")]
    StdinFeedDetached,
    #[error(transparent)]
    Sinks(#[from] ConfigError),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[remote]
url = "SDFSS://Store.Example.com:6442"
mount_path = "/media/pool0"
events = "/run/relay/events"

[listener]
write = true
upload = true
ignore = ["tmp/", ".snapshots/"]

[cloud]
enabled = true
bucket = "archive-bucket"
project = "acme-prod"
credentials = "/etc/relay/sa.json"

[mirror]
enabled = true
base_path = "/srv/mirror"
owner = 1000
permissions = 0o640
"#;

    #[test]
    fn test_parse_sections() {
        let config = AppConfig::parse(SAMPLE).unwrap();

        assert_eq!(config.remote.mount_path, PathBuf::from("/media/pool0"));
        assert!(config.sinks.listener.write);
        assert!(!config.sinks.listener.delete);
        assert_eq!(config.sinks.listener.ignore, vec!["tmp/", ".snapshots/"]);
        assert_eq!(config.sinks.cloud.bucket, "archive-bucket");
        assert_eq!(config.sinks.cloud.region, "US");
        assert_eq!(config.sinks.mirror.owner, 1000);
        assert_eq!(config.sinks.mirror.group, 0);
        assert_eq!(config.sinks.mirror.permissions, Some(0o640));
        assert!(config.cloud_store.is_none());
    }

    #[test]
    fn test_validate_lowercases_url() {
        let mut config = AppConfig::parse(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.remote.url, "sdfss://store.example.com:6442");
    }

    #[test]
    fn test_validate_rejects_other_schemes() {
        let mut config = AppConfig::default();
        config.remote.url = "https://store.example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(StateError::InvalidRemoteUrl(_))
        ));
    }

    #[test]
    fn test_validate_checks_sinks() {
        let mut config = AppConfig::default();
        config.sinks.cloud.enabled = true;
        assert!(matches!(
            config.validate(),
            Err(StateError::Sinks(ConfigError::EmptyBucket))
        ));
    }

    #[test]
    fn test_stdin_feed_cannot_detach() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.check_detachable(),
            Err(StateError::StdinFeedDetached)
        ));

        config.remote.events = "/run/relay/events".to_string();
        assert!(config.check_detachable().is_ok());
    }

    #[test]
    fn test_environment_credentials_override_file() {
        let mut config = AppConfig::parse(SAMPLE).unwrap();

        config.override_credentials(None);
        assert_eq!(
            config.sinks.cloud.credentials,
            Some(PathBuf::from("/etc/relay/sa.json"))
        );

        config.override_credentials(Some(PathBuf::new()));
        assert_eq!(
            config.sinks.cloud.credentials,
            Some(PathBuf::from("/etc/relay/sa.json"))
        );

        config.override_credentials(Some(PathBuf::from("/run/secrets/gcs.json")));
        assert_eq!(
            config.sinks.cloud.credentials,
            Some(PathBuf::from("/run/secrets/gcs.json"))
        );
        assert_eq!(
            config.cloud_store_config(),
            CloudStoreConfig::gcs(
                "archive-bucket".to_string(),
                Some(PathBuf::from("/run/secrets/gcs.json"))
            )
        );
    }

    #[test]
    fn test_cloud_store_override() {
        let raw = format!("{SAMPLE}\n[cloud_store]\ntype = \"local\"\npath = \"/srv/buckets\"\n");
        let config = AppConfig::parse(&raw).unwrap();
        assert_eq!(
            config.cloud_store_config(),
            CloudStoreConfig::Local {
                path: PathBuf::from("/srv/buckets")
            }
        );
    }

    #[test]
    fn test_daemon_id_is_stable_and_path_safe() {
        let a = daemon_id("sdfss://store.example.com:6442");
        let b = daemon_id("sdfss://store.example.com:6442");
        let c = daemon_id("sdfss://other.example.com:6442");

        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32 digest bytes, padded
        assert_eq!(a.len(), 44);
        assert!(!a.contains('/') && !a.contains('+'));
    }

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.sinks.listener.write = true;
        let state = AppState::init(Some(path.clone()), Some(config)).unwrap();
        assert_eq!(state.relay_dir, dir.path().join("nested"));

        let loaded = AppState::load(Some(path.clone())).unwrap();
        assert!(loaded.config.sinks.listener.write);
        assert_eq!(loaded.config.remote, RemoteConfig::default());

        assert!(matches!(
            AppState::init(Some(path), None),
            Err(StateError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join(CONFIG_FILE_NAME))),
            Err(StateError::NotInitialized(_))
        ));
    }
}
