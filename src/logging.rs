//! Logging setup
//!
//! Installs a `tracing` subscriber: `RUST_LOG` wins over the configured level,
//! output is human-readable or JSON, and an optional daily-rolling file copy
//! is written through a non-blocking appender.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the level filter. `debug` forces at least debug output for this crate.
pub fn build_filter(config: &LoggingConfig, debug: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = if debug { "debug" } else { config.level.as_str() };
    EnvFilter::try_new(format!("{level},hyper=warn,reqwest=warn"))
        .with_context(|| format!("Invalid log level: {level}"))
}

/// Initialise global logging.
///
/// The returned guard flushes the file appender on drop and must be held
/// for the life of the process.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config, debug)?;

    let (file_layer, guard) = match config.file.as_deref() {
        Some(path) => {
            let (dir, prefix) = split_log_path(path);
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;

    Ok(guard)
}

/// Split `/var/log/bridge.log` into (`/var/log`, `bridge.log`).
fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("wa-pairbridge.log");
    (dir, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        let (dir, prefix) = split_log_path(Path::new("/var/log/bridge.log"));
        assert_eq!(dir, Path::new("/var/log"));
        assert_eq!(prefix, "bridge.log");

        let (dir, prefix) = split_log_path(Path::new("bridge.log"));
        assert_eq!(dir, Path::new("."));
        assert_eq!(prefix, "bridge.log");
    }

    #[test]
    fn test_build_filter_accepts_configured_level() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        assert!(build_filter(&config, false).is_ok());
        assert!(build_filter(&config, true).is_ok());
    }
}
