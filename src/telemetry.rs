//! Logging setup.

use crate::config::LogFormat;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const LOG_FILENAME: &str = "chapalign.log";

/// Filter directive for a `-v` count on top of the configured base level.
pub fn filter_directive(verbosity: u8, base_level: &str) -> String {
    match verbosity {
        0 => base_level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Path of the log file inside `log_dir`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILENAME)
}

/// Install the global subscriber.
///
/// Human-readable or JSON lines go to stderr. With a `log_dir`, JSON lines are
/// also appended to `<log_dir>/chapalign.log`. `RUST_LOG` overrides the level.
pub fn init(verbosity: u8, base_level: &str, format: LogFormat, log_dir: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(verbosity, base_level)))
        .context("invalid log level")?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match format {
        LogFormat::Text => fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
    });

    if let Some(dir) = log_dir {
        fs::create_dir_all(dir).context("failed to create log directory")?;
        let path = log_file_path(dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_follows_verbosity() {
        assert_eq!(filter_directive(0, "warn"), "warn");
        assert_eq!(filter_directive(1, "warn"), "debug");
        assert_eq!(filter_directive(2, "warn"), "trace");
        assert_eq!(filter_directive(9, "info"), "trace");
    }

    #[test]
    fn test_log_file_path() {
        assert_eq!(
            log_file_path(Path::new("/var/log/chapalign")),
            PathBuf::from("/var/log/chapalign/chapalign.log")
        );
    }
}
