use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log to a file; the terminal belongs to the TUI.
pub fn init(log_path: &Path, level: &str) {
    if let Some(parent) = log_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Warning: could not create log dir {}: {e}", parent.display());
        return;
    }

    let log_file: File = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: could not open log file {}: {e}", log_path.display());
            return;
        }
    };

    let env_filter = EnvFilter::try_new(format!("sync_todo={level}"))
        .unwrap_or_else(|_| EnvFilter::new("sync_todo=info"));

    // ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init();

    info!("logging to {}", log_path.display());
}
