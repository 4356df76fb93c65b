//! Tracing setup. The TUI owns stdout, so everything goes to a file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "PANEGRID_LOG";

pub fn default_log_path() -> PathBuf {
    crate::persistence::data_dir()
        .unwrap_or_else(|_| std::env::temp_dir().join(crate::config::APP_DIR))
        .join("panegrid.log")
}

/// Install the global subscriber writing to `log_file_path`.
pub fn init(log_file_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = File::create(log_file_path)?;
    build_subscriber(log_file, env_filter()).try_init()?;
    Ok(())
}

/// `PANEGRID_LOG` wins over `RUST_LOG`; both default to `info`.
pub fn env_filter() -> EnvFilter {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn build_subscriber(log_file: File, filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_thread_names(true);

    tracing_subscriber::registry().with(fmt_layer).with(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn events_land_in_the_log_file() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(log_file.reopen().unwrap(), EnvFilter::new("info"));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(session = "abc", "session started");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("session started"));
        assert!(contents.contains("session=\"abc\""));
    }
}
