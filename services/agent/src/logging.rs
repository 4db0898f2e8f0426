//! Debug log setup.
//!
//! Console plus an optional append-only file sink. File lines start with a
//! `YYYY-MM-DD HH:MM:SS,mmm` timestamp so the logs API can page the file
//! by comparing line prefixes against a timestamp string.

use std::fs::OpenOptions;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::accounting::TIMESTAMP_FORMAT;
use crate::config::ConfigStore;

/// Keeps the non-blocking file writer alive; hold it until process exit.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

fn convert_level(level: Option<String>) -> LevelFilter {
    match level.unwrap_or_default().to_lowercase().as_str() {
        "error" => LevelFilter::ERROR,
        "warning" => LevelFilter::WARN,
        "info" | "" => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

/// Initialize tracing for one task.
pub fn init(config: &ConfigStore) -> anyhow::Result<LogGuard> {
    let console_level = convert_level(config.get("logging", "console_level"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_filter(console_level);

    let mut file_guard = None;
    let file_layer = match config.file("logging", "logs_file") {
        Ok(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("unable to create {}", parent.display()))?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("unable to open the log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            file_guard = Some(guard);

            let file_level = convert_level(config.get("logging", "logs_file_level"));
            Some(
                tracing_subscriber::fmt::layer()
                    .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_level),
            )
        }
        Err(_) => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}
