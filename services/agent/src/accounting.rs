//! Accounting log: one line per authenticated API request.
//!
//! A separate sink from the debug log with its own schema; the
//! `/system/accounting` endpoint pages over this file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use chrono::Local;
use tracing::warn;

use crate::config::ConfigStore;

/// Timestamp prefix shared by both log files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

pub struct AccountingLog {
    file: Option<Mutex<File>>,
}

impl AccountingLog {
    /// Open the sink configured under `accounting.logs_file`. Without that
    /// option the sink is disabled and `record` becomes a no-op.
    pub fn open(config: &ConfigStore) -> Self {
        let Ok(path) = config.file("accounting", "logs_file") else {
            warn!("Accounting log file is not configured, accounting records are dropped");
            return Self { file: None };
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }

        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Self {
                file: Some(Mutex::new(file)),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unable to open the accounting log");
                Self { file: None }
            }
        }
    }

    /// Sink that drops everything, for tasks that never serve requests.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    /// Append one request record.
    pub fn record(
        &self,
        orchestrator_name: &str,
        method: &str,
        path: &str,
        status: u16,
        query: &str,
        body: &str,
    ) {
        let Some(file) = &self.file else {
            return;
        };
        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        let body = body.replace('\n', "\\n");
        let line = format!(
            "{timestamp} | {orchestrator_name:16} | {method:6} | {path:20} | {status:4} | {query} | {body}\n"
        );
        if let Ok(mut file) = file.lock() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!(error = %e, "Unable to append to the accounting log");
            }
        }
    }
}
