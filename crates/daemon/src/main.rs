use clap::Parser;
use owo_colors::OwoColorize;

mod cli;

use cli::op::{Op, OpContext};
use cli::{Args, Command};
use relay_daemon::{logging, process};

fn main() -> anyhow::Result<()> {
    let mut args = Args::parse();
    // The daemon changes directory, so pin the config path first.
    if let Some(path) = args.config.take() {
        args.config = Some(std::path::absolute(path)?);
    }

    // Forking has to happen before the runtime spawns its threads.
    let _log_guard = match &args.command {
        Command::Listen(listen) if listen.daemonize => {
            let log_file = detach(&args)?;
            logging::init(listen.debug, Some(&log_file))?
        }
        Command::Listen(listen) => logging::init(listen.debug, None)?,
        _ => logging::init(false, None)?,
    };

    let ctx = OpContext {
        config_path: args.config.clone(),
    };
    match process::block_on(args.command.execute(&ctx))? {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

#[cfg(unix)]
fn detach(args: &Args) -> anyhow::Result<std::path::PathBuf> {
    use relay_daemon::daemon::{self, DaemonPaths};
    use relay_daemon::state::AppState;

    let state = AppState::load(args.config.clone())?;
    state.config.check_detachable()?;
    let paths = DaemonPaths::for_id(&state.config.daemon_id());
    daemon::detach(&paths)?;
    Ok(paths.log_file)
}

#[cfg(not(unix))]
fn detach(_args: &Args) -> anyhow::Result<std::path::PathBuf> {
    anyhow::bail!("--daemonize is only supported on unix")
}
