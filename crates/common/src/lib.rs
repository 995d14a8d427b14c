//! Change-notification relay engine.
//!
//! Events from a deduplicating remote store arrive in batches, pass through
//! an ignore filter, are routed by action, and are handed to sinks:
//! - `sink::CloudUploadSink` copies changed files into a cloud bucket
//! - `sink::LocalMirrorSink` mirrors them under a local directory
//!
//! The remote store itself sits behind the traits in [`remote`].

pub mod config;
pub mod dispatch;
pub mod event;
pub mod filter;
pub mod remote;
pub mod report;
pub mod router;
pub mod sink;
pub mod testkit;

// Re-export key types for convenience
pub use config::{CloudSinkConfig, ConfigError, ListenerConfig, MirrorConfig, SinkConfig};
pub use dispatch::{
    DispatchError, DispatchOutcome, DispatchReport, DispatchStats, Dispatcher, EventOutcome,
};
pub use event::{Action, ChangeEvent, FileInfo, FileType, NotificationBatch};
pub use filter::IgnoreFilter;
pub use remote::{NotificationSource, RemoteError, RemoteStore};
pub use report::EventReporter;
pub use router::{ActionRouter, Route};
pub use sink::{Sink, SinkError};
