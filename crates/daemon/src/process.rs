use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use cloud_store::{CloudBuckets, CloudStore, CloudStoreError};
use common::dispatch::{DispatchError, DispatchReport, Dispatcher, DEFAULT_QUEUE_CAPACITY};
use common::remote::{RemoteError, RemoteStore};
use common::report::EventReporter;
use common::sink::{enabled_sinks, provision_bucket, ProvisionError};

use crate::remote::{EventFeed, VolumeMount};
use crate::state::AppConfig;

/// How long blocking tasks get to finish once the relay has returned.
const BLOCKING_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Print every received event as a table
    pub debug: bool,
    pub queue_capacity: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            debug: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("remote store: {0}")]
    Remote(#[from] RemoteError),
    #[error("cloud store: {0}")]
    CloudStore(#[from] CloudStoreError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Owns the shutdown channel for a running relay.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<()>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, watch::Receiver<()>) {
        let (tx, rx) = watch::channel(());
        (Self { tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Trigger shutdown on Ctrl-C or SIGTERM.
    pub fn on_signals(&self) -> tokio::task::JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received");
            handle.shutdown();
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM, Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Bring the relay up and run it until the feed ends or shutdown fires.
///
/// Startup order: reach the remote volume, provision the bucket when the
/// cloud sink is on, open the notification feed, then dispatch. Failures
/// before dispatch are fatal.
pub async fn run_relay(
    config: &AppConfig,
    options: RelayOptions,
    shutdown: watch::Receiver<()>,
) -> Result<DispatchReport, ProcessError> {
    let remote: Arc<dyn RemoteStore> =
        Arc::new(VolumeMount::connect(&config.remote.mount_path).await?);
    info!(
        url = %config.remote.url,
        mount = %config.remote.mount_path.display(),
        "connected to remote store"
    );

    let buckets = if config.sinks.cloud.enabled {
        let store = CloudStore::new(config.cloud_store_config())?;
        let provisioned = provision_bucket(&store, &config.sinks.cloud).await?;
        info!(bucket = %config.sinks.cloud.bucket, ?provisioned, "cloud sink ready");
        Some(Arc::new(store) as Arc<dyn CloudBuckets>)
    } else {
        None
    };

    let sinks = enabled_sinks(&config.sinks, remote, buckets);
    let names: Vec<_> = sinks.iter().map(|s| s.name()).collect();
    info!(sinks = ?names, "sinks enabled");

    let mut dispatcher = Dispatcher::from_config(&config.sinks, sinks)
        .with_queue_capacity(options.queue_capacity);
    if options.debug {
        dispatcher = dispatcher.with_reporter(EventReporter::stdout());
    }

    let feed = EventFeed::open(&config.remote.events).await?;
    info!(feed = %config.remote.events, "listening for notifications");

    Ok(dispatcher.run(feed, shutdown).await?)
}

/// Drive `future` to completion on a fresh multi-threaded runtime.
///
/// Blocking tasks still running afterwards, such as a read parked on
/// stdin, get [`BLOCKING_GRACE`] and are then abandoned so the process can
/// exit.
pub fn block_on<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(BLOCKING_GRACE);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    #[test]
    fn test_block_on_abandons_parked_blocking_read() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let started = Instant::now();

        let output = block_on(async move {
            tokio::task::spawn_blocking(move || {
                let _ = rx.recv();
            });
            tokio::task::yield_now().await;
            7
        })
        .unwrap();

        assert_eq!(output, 7);
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(tx);
    }
}
