use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use common::dispatch::{DispatchOutcome, DispatchReport, DEFAULT_QUEUE_CAPACITY};
use relay_daemon::process::{run_relay, ProcessError, RelayOptions, ShutdownHandle};
use relay_daemon::state::{AppState, StateError};

/// Run the relay until the feed ends or a shutdown signal arrives.
#[derive(Args, Debug, Clone)]
pub struct Listen {
    /// Log at debug level and print every received event
    #[arg(long)]
    pub debug: bool,

    /// Detach and run in the background (unix only)
    #[arg(short = 'd', long)]
    pub daemonize: bool,

    /// Batches buffered ahead of the dispatch loop
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

#[derive(Debug)]
pub struct ListenOutput {
    pub report: DispatchReport,
}

impl fmt::Display for ListenOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.report.stats;
        match self.report.outcome {
            DispatchOutcome::Completed => {
                writeln!(f, "{} notification feed ended", "Completed".green().bold())?
            }
            DispatchOutcome::Cancelled => {
                writeln!(f, "{} on shutdown signal", "Stopped".yellow().bold())?
            }
        }
        writeln!(f, "  {} {}", "batches:".dimmed(), stats.batches)?;
        writeln!(f, "  {} {}", "events:".dimmed(), stats.events)?;
        writeln!(f, "  {} {}", "ignored:".dimmed(), stats.ignored)?;
        writeln!(f, "  {} {}", "skipped:".dimmed(), stats.skipped)?;
        writeln!(f, "  {} {}", "dispatched:".dimmed(), stats.dispatched)?;
        let failures = if stats.failures == 0 {
            stats.failures.to_string().green().to_string()
        } else {
            stats.failures.to_string().red().to_string()
        };
        write!(f, "  {} {}", "failures:".dimmed(), failures)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error("relay failed: {0}")]
    Failed(#[from] ProcessError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Listen {
    type Error = ListenError;
    type Output = ListenOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        tracing::info!(
            config = %state.config_path.display(),
            id = %state.config.daemon_id(),
            "relay starting"
        );

        let (shutdown, shutdown_rx) = ShutdownHandle::new();
        let signals = shutdown.on_signals();

        let options = RelayOptions {
            debug: self.debug,
            queue_capacity: self.queue_capacity,
        };
        let result = run_relay(&state.config, options, shutdown_rx).await;
        signals.abort();

        Ok(ListenOutput { report: result? })
    }
}
