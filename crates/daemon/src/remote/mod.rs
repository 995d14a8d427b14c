//! Transport adapters for the remote store.
//!
//! The relay reads file contents from the store's locally mounted volume
//! and receives change notifications as newline-delimited JSON.

mod feed;
mod volume;

pub use feed::{EventFeed, WireBatch};
pub use volume::VolumeMount;
