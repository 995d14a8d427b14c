pub mod op;
pub mod ops;

use clap::Parser;
use std::path::PathBuf;

use ops::{Check, Init, Listen, Version};

crate::command_enum! {
    (Init, Init),
    (Listen, Listen),
    (Check, Check),
    (Version, Version),
}

/// Relay change notifications from an SDFS volume to a cloud bucket and a
/// local mirror.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
pub struct Args {
    /// Config file (default: ~/.relay/config.toml)
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}
