//! Cleaner: per-table retention enforcement.
//!
//! Every `cleaner.interval_int` seconds, walk the retention-eligible
//! tables and delete rows older than `now - cleaner.<table>_int`. Each
//! table ages on its own column (results on `finished`, runs on `planned`,
//! and so on - see the store DAOs).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::ConfigStore;
use crate::store::{
    events, multi_results, nonces, old_params, orchestrators, requests, results, runs, stats,
    tests, Store, StoreResult, TABLES,
};
use crate::util::unix_now;

/// Fallback pass interval when the option is absent.
const DEFAULT_INTERVAL_SECS: u64 = 600;

pub struct CleanerWorker {
    store: Store,
    config: Arc<ConfigStore>,
}

impl CleanerWorker {
    pub fn new(store: Store, config: Arc<ConfigStore>) -> Self {
        Self { store, config }
    }

    /// Run the cleaner until shutdown is signaled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval_secs = self
            .config
            .int("cleaner", "interval_int")
            .map(|v| v.max(1) as u64)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        info!(interval_secs, "Starting cleaner worker");

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cleanup().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Cleaner worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One retention pass over every table.
    pub async fn run_cleanup(&self) {
        let now = unix_now();
        for table in TABLES {
            let option = format!("{table}_int");
            let retention = match self.config.int("cleaner", &option) {
                Ok(retention) => retention as f64,
                Err(e) => {
                    error!(table, error = %e, "Missing retention for the table, skipping it");
                    continue;
                }
            };

            match self.delete_old_rows(table, now - retention).await {
                Ok(0) => debug!(table, "No rows have been cleaned"),
                Ok(deleted) => info!(table, deleted, "Cleaned old rows"),
                Err(e) => error!(table, error = %e, "Unable to clean the table"),
            }
        }
        debug!("Cleaner pass finished");
    }

    async fn delete_old_rows(&self, table: &str, threshold: f64) -> StoreResult<u64> {
        let pool = self.store.pool();
        match table {
            "events" => events::delete_old(pool, threshold).await,
            "multi_results" => multi_results::delete_old(pool, threshold).await,
            "nonces" => nonces::delete_old(pool, threshold).await,
            "old_params" => old_params::delete_old(pool, threshold).await,
            "orchestrators" => orchestrators::delete_old(pool, threshold).await,
            "requests" => requests::delete_old(pool, threshold).await,
            "results" => results::delete_old(pool, threshold).await,
            "runs" => runs::delete_old(pool, threshold).await,
            "stats" => stats::delete_old(pool, threshold).await,
            "tests" => tests::delete_old(pool, threshold).await,
            other => {
                error!(table = other, "No retention handler for the table");
                Ok(0)
            }
        }
    }
}
