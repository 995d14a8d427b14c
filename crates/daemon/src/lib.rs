// Relay service modules
#[cfg(unix)]
pub mod daemon;
pub mod logging;
pub mod process;
pub mod remote;

// App state (configuration, paths)
pub mod state;

pub use process::{run_relay, ProcessError, RelayOptions, ShutdownHandle};
pub use remote::{EventFeed, VolumeMount};
pub use state::{AppConfig, AppState, RemoteConfig, StateError};
