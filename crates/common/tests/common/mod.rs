//! Shared fixtures for the relay integration tests.

use std::sync::Arc;

use ::common::config::{CloudSinkConfig, ListenerConfig, MirrorConfig, SinkConfig};
use ::common::sink::{enabled_sinks, provision_bucket};
use ::common::testkit::MemoryRemote;
use ::common::Dispatcher;
use cloud_store::{CloudBuckets, CloudStore};
use tempfile::TempDir;

pub const BUCKET: &str = "relay-test";
pub const PROJECT: &str = "relay-project";

pub struct TestRelay {
    pub remote: Arc<MemoryRemote>,
    pub store: CloudStore,
    pub dispatcher: Dispatcher,
    pub mirror_dir: TempDir,
    _staging_dir: TempDir,
}

pub struct Options {
    pub cloud: bool,
    pub mirror: bool,
    pub ignore: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cloud: true,
            mirror: false,
            ignore: Vec::new(),
        }
    }
}

pub fn listener(ignore: Vec<String>) -> ListenerConfig {
    ListenerConfig {
        download: true,
        upload: true,
        write: true,
        delete: true,
        ignore,
    }
}

/// Wire a relay over an in-memory remote and bucket store.
pub async fn setup_relay(options: Options, remote: MemoryRemote) -> TestRelay {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mirror_dir = TempDir::new().unwrap();
    let staging_dir = TempDir::new().unwrap();

    let config = SinkConfig {
        listener: listener(options.ignore),
        cloud: CloudSinkConfig {
            enabled: options.cloud,
            bucket: BUCKET.to_string(),
            project: PROJECT.to_string(),
            temp_dir: staging_dir.path().to_path_buf(),
            ..Default::default()
        },
        mirror: MirrorConfig {
            enabled: options.mirror,
            base_path: mirror_dir.path().to_path_buf(),
            ..Default::default()
        },
    };
    config.validate().unwrap();

    let store = CloudStore::memory();
    if options.cloud {
        provision_bucket(&store, &config.cloud).await.unwrap();
    }

    let remote = Arc::new(remote);
    let buckets: Arc<dyn CloudBuckets> = Arc::new(store.clone());
    let sinks = enabled_sinks(&config, remote.clone(), Some(buckets));
    let dispatcher = Dispatcher::from_config(&config, sinks);

    TestRelay {
        remote,
        store,
        dispatcher,
        mirror_dir,
        _staging_dir: staging_dir,
    }
}
