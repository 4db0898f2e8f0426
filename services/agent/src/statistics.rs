//! Stats: hourly table-census snapshots.
//!
//! Sleeps until the next wall-clock hour boundary, then writes one stats
//! row per (table, category) from the counting layer. Cheap by design -
//! count queries only.

use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::store::{stats, Store, StoreResult};
use crate::util::unix_now;

pub struct StatsWorker {
    store: Store,
}

impl StatsWorker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Run the stats loop until shutdown is signaled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting stats worker");
        loop {
            let wait = duration_until_next_hour(Local::now());
            debug!(wait_secs = wait.as_secs(), "Waiting until the next run");

            tokio::select! {
                () = tokio::time::sleep(wait) => {
                    if let Err(e) = self.snapshot().await {
                        error!(error = %e, "Stats snapshot failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Stats worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Snapshot every monitored table once.
    pub async fn snapshot(&self) -> StoreResult<()> {
        let calculated_at = unix_now();
        for (table, counts) in self.store.count_all_tables().await? {
            debug!(table, "Calculating statistics for the table");
            for (category, value) in &counts.categories {
                stats::create(self.store.pool(), calculated_at, table, category, *value).await?;
            }
        }
        Ok(())
    }
}

fn duration_until_next_hour(now: DateTime<Local>) -> Duration {
    let next = (now + chrono::Duration::hours(1))
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0));

    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(3600)),
        None => Duration::from_secs(3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wait_reaches_the_next_hour_boundary() {
        let now = Local.with_ymd_and_hms(2025, 6, 1, 10, 59, 30).unwrap();
        assert_eq!(duration_until_next_hour(now), Duration::from_secs(30));

        let top = Local.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(duration_until_next_hour(top), Duration::from_secs(3600));
    }
}
