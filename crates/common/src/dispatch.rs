//! The dispatch loop.
//!
//! A pump task pulls batches from the [`NotificationSource`] into a bounded
//! queue. The loop drains that queue one event at a time: filter, route, then
//! run every routed sink for the event before looking at the next one.
//! A full queue blocks the pump, so a slow sink applies backpressure all the
//! way to the source.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch::Receiver as WatchReceiver;
use tracing::{debug, error, info};

use crate::config::SinkConfig;
use crate::event::{ChangeEvent, NotificationBatch};
use crate::filter::IgnoreFilter;
use crate::remote::{NotificationSource, RemoteError};
use crate::report::EventReporter;
use crate::router::{ActionRouter, Route};
use crate::sink::Sink;

/// Batches buffered between the pump and the loop.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The source signalled end of stream and every batch was processed
    Completed,
    /// Shutdown was requested; any in-flight batch was abandoned
    Cancelled,
}

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    Disabled,
    NoSinks,
    Dispatched { sinks: usize, failures: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub batches: u64,
    pub events: u64,
    pub ignored: u64,
    /// Events whose action is disabled or handled by no sink
    pub skipped: u64,
    pub dispatched: u64,
    /// Individual sink invocations that failed
    pub failures: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: EventOutcome) {
        self.events += 1;
        match outcome {
            EventOutcome::Ignored => self.ignored += 1,
            EventOutcome::Disabled | EventOutcome::NoSinks => self.skipped += 1,
            EventOutcome::Dispatched { failures, .. } => {
                self.dispatched += 1;
                self.failures += failures as u64;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    pub stats: DispatchStats,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification source failed after {} events: {source}", .stats.events)]
    Source {
        #[source]
        source: RemoteError,
        stats: DispatchStats,
    },
    #[error("notification pump stopped unexpectedly: {0}")]
    Pump(#[from] tokio::task::JoinError),
}

#[derive(Debug)]
pub struct Dispatcher {
    filter: IgnoreFilter,
    router: ActionRouter,
    reporter: Option<EventReporter>,
    queue_capacity: usize,
}

impl Dispatcher {
    pub fn new(filter: IgnoreFilter, router: ActionRouter) -> Self {
        Self {
            filter,
            router,
            reporter: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Wire the filter and routing table from configuration.
    pub fn from_config(config: &SinkConfig, sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self::new(
            IgnoreFilter::new(config.listener.ignore.iter().cloned()),
            ActionRouter::new(&config.listener, sinks),
        )
    }

    /// Print every received event before it is routed.
    pub fn with_reporter(mut self, reporter: EventReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Run until the source ends or `shutdown` fires.
    ///
    /// A shutdown signal, or the shutdown sender being dropped, abandons the
    /// in-flight event. Sink errors never stop the loop.
    pub async fn run<S>(
        &self,
        source: S,
        mut shutdown: WatchReceiver<()>,
    ) -> Result<DispatchReport, DispatchError>
    where
        S: NotificationSource,
    {
        let (tx, rx) = flume::bounded(self.queue_capacity);
        let pump = tokio::spawn(pump(source, tx, shutdown.clone()));

        let mut stats = DispatchStats::default();
        let outcome = loop {
            let batch = tokio::select! {
                biased;
                _ = shutdown.changed() => break DispatchOutcome::Cancelled,
                batch = rx.recv_async() => batch,
            };
            // Disconnected: the pump is done and the queue is drained.
            let Ok(batch) = batch else {
                break DispatchOutcome::Completed;
            };
            stats.batches += 1;

            let finished = tokio::select! {
                biased;
                _ = shutdown.changed() => false,
                _ = self.dispatch_batch(&batch, &mut stats) => true,
            };
            if !finished {
                info!(action = %batch.action(), "shutdown requested, abandoning in-flight batch");
                break DispatchOutcome::Cancelled;
            }
        };
        drop(rx);

        if let Err(source) = pump.await? {
            error!(error = %source, "notification source failed");
            return Err(DispatchError::Source { source, stats });
        }

        info!(
            outcome = ?outcome,
            batches = stats.batches,
            events = stats.events,
            ignored = stats.ignored,
            dispatched = stats.dispatched,
            failures = stats.failures,
            "dispatch loop stopped"
        );
        Ok(DispatchReport { outcome, stats })
    }

    async fn dispatch_batch(&self, batch: &NotificationBatch, stats: &mut DispatchStats) {
        debug!(action = %batch.action(), events = batch.events().len(), "processing batch");
        for event in batch.events() {
            let outcome = self.dispatch_event(event).await;
            stats.record(outcome);
        }
    }

    /// Filter, route and sink a single event.
    pub async fn dispatch_event(&self, event: &ChangeEvent) -> EventOutcome {
        if let Some(reporter) = &self.reporter {
            reporter.report(event);
        }

        if let Some(prefix) = self.filter.matching_prefix(event.path()) {
            debug!(path = %event.path(), prefix = %prefix, "ignored");
            return EventOutcome::Ignored;
        }

        let sinks = match self.router.route(event.action) {
            Route::Disabled => {
                debug!(path = %event.path(), action = %event.action, "action disabled");
                return EventOutcome::Disabled;
            }
            Route::NoSinks => {
                debug!(path = %event.path(), action = %event.action, "no sink handles action");
                return EventOutcome::NoSinks;
            }
            Route::Dispatch(sinks) => sinks,
        };

        let results = join_all(sinks.iter().map(|sink| async move {
            (sink.name(), sink.apply(event).await)
        }))
        .await;

        let mut failures = 0;
        for (name, result) in results {
            if let Err(e) = result {
                failures += 1;
                error!(
                    sink = name,
                    path = %event.path(),
                    action = %event.action,
                    error = %e,
                    "sync failed"
                );
            }
        }

        EventOutcome::Dispatched {
            sinks: sinks.len(),
            failures,
        }
    }
}

/// Move batches from the source into the queue until the stream ends,
/// the loop goes away, or shutdown fires.
async fn pump<S>(
    mut source: S,
    tx: flume::Sender<NotificationBatch>,
    mut shutdown: WatchReceiver<()>,
) -> Result<(), RemoteError>
where
    S: NotificationSource,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(()),
            next = source.next_batch() => next?,
        };
        let Some(batch) = next else {
            info!("notification stream done");
            return Ok(());
        };

        tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(()),
            sent = tx.send_async(batch) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }
}
