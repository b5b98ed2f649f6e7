//! Logging setup
//!
//! Writes to stderr and to `~/.zenview/logs/zenview-debug.log`, using local
//! timestamps. `RUST_LOG` overrides the default `info` filter.

use std::path::PathBuf;
use tracing_subscriber::prelude::*;

const LOG_FILE_NAME: &str = "zenview-debug.log";

/// Format timestamps using the system's local time via chrono
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Directory holding the debug log
pub fn log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".zenview").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("zenview-logs"))
}

/// Install the global subscriber. Falls back to stdout only when the log
/// file cannot be opened.
pub fn init() {
    let log_dir = log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
        .ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // The shell owns stdout, so console output goes to stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalTimer)
        .with_writer(std::io::stderr);

    match log_file {
        Some(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_timer(LocalTimer)
                .with_ansi(false);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init();
        }
    }
}
