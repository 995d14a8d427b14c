use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` replaces the filter when set; otherwise `debug` picks between
/// DEBUG and INFO. With a `log_file` output goes through a non-blocking
/// appender, and the returned guard must live until exit so buffered lines
/// are flushed.
pub fn init(debug: bool, log_file: Option<&Path>) -> std::io::Result<Option<WorkerGuard>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(debug, rust_log.as_deref());

    let Some(log_file) = log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let dir = log_file.parent().unwrap_or_else(|| Path::new("."));
    let name = log_file
        .file_name()
        .ok_or_else(|| std::io::Error::other(format!("invalid log file {}", log_file.display())))?;
    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

fn env_filter(debug: bool, rust_log: Option<&str>) -> EnvFilter {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(rust_log.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_follows_debug_flag_without_rust_log() {
        assert_eq!(env_filter(false, None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(env_filter(true, None).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(env_filter(false, Some("")).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_quieter_rust_log_is_kept() {
        assert_eq!(env_filter(false, Some("warn")).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(env_filter(true, Some("error")).max_level_hint(), Some(LevelFilter::ERROR));
    }
}
