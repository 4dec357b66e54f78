//! Logging and tracing initialization.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level`. When `config.file` is set, events go
/// to that file (appended, no ANSI colours) instead of stderr. Calling this
/// twice keeps the first subscriber.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let file = config.file.as_deref().and_then(open_log_file);

    let installed = match (config.json, file) {
        (true, Some(file)) => tracing::subscriber::set_global_default(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .json()
                .with_writer(Mutex::new(file))
                .finish(),
        ),
        (true, None) => tracing::subscriber::set_global_default(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .json()
                .with_writer(std::io::stderr)
                .finish(),
        ),
        (false, Some(file)) => tracing::subscriber::set_global_default(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_thread_names(config.thread_names)
                .with_writer(Mutex::new(file))
                .finish(),
        ),
        (false, None) => tracing::subscriber::set_global_default(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_thread_names(config.thread_names)
                .with_writer(std::io::stderr)
                .finish(),
        ),
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!(
                "screenmux: cannot open log file {}: {e}; logging to stderr",
                path.display()
            );
            None
        }
    }
}
