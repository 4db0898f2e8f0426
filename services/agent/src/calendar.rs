//! Calendar: turns requests into planned events and due events into runs.
//!
//! Two pipelines run on every tick:
//! 1. Requests pipeline - consumes `requests` rows (new/update/failed) and
//!    plans events for them.
//! 2. Planned-events pipeline - consumes `events` whose `run_at` passed,
//!    creates a waiting run, and plans the follow-up periodic event.
//!
//! A failure rolls back the current request/event and the loop continues
//! with the next one.

use std::time::Duration;

use sqlx::{Sqlite, Transaction};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::store::model::{Event, EventSource, Request, RequestReason, Test, TestState};
use crate::store::{events, requests, runs, tests, Store, StoreError, StoreResult};
use crate::util::{friendly_time, unix_now};

/// Poll interval of both pipelines.
const TICK: Duration = Duration::from_millis(100);

/// Next periodic occurrence after a run at `previous_run`.
///
/// No interval means no follow-up; a next time that already passed is
/// clamped to `now`; a next time past `scheduling_until` cancels the
/// follow-up.
pub fn calculate_next_event_time(test: &Test, previous_run: f64, now: f64) -> Option<f64> {
    let interval = match test.scheduling_interval {
        None | Some(0) => {
            debug!(id_test = test.id_test, "Scheduling interval is not set");
            return None;
        }
        Some(interval) => interval as f64,
    };

    let mut next = previous_run + interval;
    if next < now {
        debug!(id_test = test.id_test, "Not possible to schedule an event in the past");
        next = now;
    }

    if let Some(until) = test.scheduling_until {
        if next > until {
            debug!(id_test = test.id_test, "Scheduled time is after the scheduling limit");
            return None;
        }
    }

    Some(next)
}

pub struct CalendarWorker {
    store: Store,
}

impl CalendarWorker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Run the calendar loop until shutdown is signaled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(tick_ms = TICK.as_millis() as u64, "Starting calendar worker");

        let mut interval = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.pass().await {
                        error!(error = %e, "Calendar pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Calendar worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass of both pipelines.
    pub async fn pass(&self) -> StoreResult<()> {
        self.process_requests().await?;
        self.process_due_events().await?;
        Ok(())
    }

    async fn process_requests(&self) -> StoreResult<()> {
        let now = unix_now();
        let pending = requests::list_all(self.store.pool()).await?;
        if !pending.is_empty() {
            let ids: Vec<String> = pending.iter().map(|r| r.id_test.to_string()).collect();
            debug!(count = pending.len(), tests = ids.join(","), "Found new requests");
        }

        for request in pending {
            if let Err(e) = self.process_request(&request, now).await {
                error!(
                    id_request = request.id_request,
                    id_test = request.id_test,
                    error = %e,
                    "Unable to process the request, skipping it"
                );
            }
        }
        Ok(())
    }

    /// Plan the consequences of one request and consume it, atomically.
    async fn process_request(&self, request: &Request, now: f64) -> StoreResult<()> {
        debug!(id_test = request.id_test, reason = request.reason.as_str(), "Processing a request");

        let mut tx = self.store.begin().await?;

        match tests::get(&mut *tx, request.id_test).await? {
            None => {
                debug!(id_test = request.id_test, "Request references a deleted test, dropping it");
            }
            Some(test) => match request.reason {
                RequestReason::New => plan_new(&mut tx, &test, now).await?,
                RequestReason::Update => plan_update(&mut tx, &test, now).await?,
                RequestReason::Failed => plan_recovery(&mut tx, &test, request, now).await?,
            },
        }

        requests::delete(&mut *tx, request.id_request).await?;
        tx.commit().await.map_err(StoreError::from)
    }

    async fn process_due_events(&self) -> StoreResult<()> {
        let now = unix_now();
        let due = events::list_due(self.store.pool(), now).await?;
        if !due.is_empty() {
            let ids: Vec<String> = due.iter().map(|e| e.id_test.to_string()).collect();
            debug!(count = due.len(), tests = ids.join(","), "Found events to be executed");
        }

        for event in due {
            if let Err(e) = self.process_event(&event, now).await {
                error!(
                    id_event = event.id_event,
                    id_test = event.id_test,
                    error = %e,
                    "Unable to process the event, skipping it"
                );
            }
        }
        Ok(())
    }

    /// Materialize one due event into a run, plan the follow-up, and
    /// consume the event - all in one transaction.
    async fn process_event(&self, event: &Event, now: f64) -> StoreResult<()> {
        debug!(id_test = event.id_test, "Processing an event from the calendar");

        let mut tx = self.store.begin().await?;

        match tests::get(&mut *tx, event.id_test).await? {
            None => {
                debug!(id_test = event.id_test, "Event references a deleted test, dropping it");
            }
            Some(test) => {
                start_new_run(&mut tx, &test, event).await?;

                if event.source != EventSource::Recovery {
                    plan_next_event(&mut tx, &test, event.run_at, now).await?;
                } else {
                    debug!(
                        id_test = event.id_test,
                        "No follow-up planned after a recovery event"
                    );
                }
            }
        }

        events::delete(&mut *tx, event.id_event).await?;
        tx.commit().await.map_err(StoreError::from)
    }
}

async fn plan_new(tx: &mut Transaction<'_, Sqlite>, test: &Test, now: f64) -> StoreResult<()> {
    if let Some(from) = test.scheduling_from {
        if now < from {
            debug!(
                id_test = test.id_test,
                from = %friendly_time(from),
                "Request for an event in the future"
            );
            events::plan(&mut **tx, test, from, EventSource::Request, 0).await?;
            return Ok(());
        }
    }
    plan_next_event(tx, test, now, now).await
}

async fn plan_update(tx: &mut Transaction<'_, Sqlite>, test: &Test, now: f64) -> StoreResult<()> {
    match test.state {
        TestState::Disabled | TestState::Deleted => {
            debug!(
                id_test = test.id_test,
                state = %test.state,
                "Removing all events from the calendar"
            );
            events::delete_by_test(&mut **tx, test.id_test).await?;
            Ok(())
        }
        TestState::Enabled => {
            debug!(id_test = test.id_test, "Re-enabling the test, planning a new event");
            plan_new(tx, test, now).await
        }
        _ => Ok(()),
    }
}

async fn plan_recovery(
    tx: &mut Transaction<'_, Sqlite>,
    test: &Test,
    request: &Request,
    now: f64,
) -> StoreResult<()> {
    // The tests manager already incremented recovery_attempt.
    let Some(limit) = test.recovery_attempt_limit else {
        debug!(id_test = test.id_test, "Recovery limit is not set");
        return Ok(());
    };
    if request.recovery_attempt > limit {
        debug!(id_test = test.id_test, "Reached the recovery limit");
        return Ok(());
    }

    let recovery_time = now + test.recovery_interval.unwrap_or(0) as f64;
    if let Some(until) = test.scheduling_until {
        if recovery_time > until {
            debug!(id_test = test.id_test, "Planned recovery time is after scheduling until");
            return Ok(());
        }
    }

    events::plan(
        &mut **tx,
        test,
        recovery_time,
        EventSource::Recovery,
        request.recovery_attempt,
    )
    .await?;
    Ok(())
}

async fn plan_next_event(
    tx: &mut Transaction<'_, Sqlite>,
    test: &Test,
    previous_run: f64,
    now: f64,
) -> StoreResult<()> {
    match calculate_next_event_time(test, previous_run, now) {
        Some(next) => {
            events::plan(&mut **tx, test, next, EventSource::Calendar, 0).await?;
        }
        None => debug!(id_test = test.id_test, "No follow-up event planned"),
    }
    Ok(())
}

async fn start_new_run(
    tx: &mut Transaction<'_, Sqlite>,
    test: &Test,
    event: &Event,
) -> StoreResult<()> {
    if runs::waiting_exists(&mut **tx, test.id_test).await? {
        warn!(
            id_test = test.id_test,
            "New run not created because a waiting one already exists"
        );
        return Ok(());
    }

    runs::create_waiting(
        &mut **tx,
        test.id_test,
        test.version,
        event.run_at,
        event.recovery_attempt,
    )
    .await?;
    debug!(id_test = test.id_test, "Created a run");
    Ok(())
}

#[cfg(test)]
mod tests_unit {
    use super::*;
    use rstest::rstest;

    fn test_fixture(
        interval: Option<i64>,
        until: Option<f64>,
    ) -> Test {
        Test {
            id_test: 1,
            name: "dummy".to_string(),
            description: String::new(),
            version: 1,
            state: TestState::Enabled,
            created: 0.0,
            last_started_time: None,
            last_result_time: None,
            last_result_status: None,
            last_downloaded_time: None,
            test_params: "{}".to_string(),
            timeout: 30,
            scheduling_interval: interval,
            scheduling_from: None,
            scheduling_until: until,
            recovery_interval: None,
            recovery_attempt_limit: None,
            key_ro: "ro".to_string(),
            key_rw: "rw".to_string(),
        }
    }

    #[rstest]
    #[case::no_interval(None, None, 1000.0, 1000.0, None)]
    #[case::zero_interval(Some(0), None, 1000.0, 1000.0, None)]
    #[case::plain(Some(60), None, 1000.0, 1000.0, Some(1060.0))]
    #[case::clamped_to_now(Some(60), None, 100.0, 1000.0, Some(1000.0))]
    #[case::until_passed(Some(60), Some(900.0), 1000.0, 1000.0, None)]
    #[case::until_still_open(Some(60), Some(2000.0), 1000.0, 1000.0, Some(1060.0))]
    #[case::until_exactly_hit(Some(60), Some(1060.0), 1000.0, 1000.0, Some(1060.0))]
    fn next_event_boundaries(
        #[case] interval: Option<i64>,
        #[case] until: Option<f64>,
        #[case] previous_run: f64,
        #[case] now: f64,
        #[case] expected: Option<f64>,
    ) {
        let test = test_fixture(interval, until);
        assert_eq!(calculate_next_event_time(&test, previous_run, now), expected);
    }
}
