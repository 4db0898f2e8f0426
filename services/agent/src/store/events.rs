//! Events table access.
//!
//! Event insertion is gated here: an event is never planned for a test
//! that is not enabled, regardless of which pipeline asks for it.

use sqlx::{SqlitePool, SqliteExecutor};
use tracing::debug;

use super::model::{Event, EventSource, Test, TestState};
use super::{RecordCounts, StoreResult};
use crate::util::friendly_time;

/// Plan an event for a test. Returns `false` (without inserting) when the
/// test is not enabled.
pub async fn plan(
    ex: impl SqliteExecutor<'_>,
    test: &Test,
    run_at: f64,
    source: EventSource,
    recovery_attempt: i64,
) -> StoreResult<bool> {
    if test.state != TestState::Enabled {
        debug!(
            id_test = test.id_test,
            state = %test.state,
            "New event not planned because of the test state"
        );
        return Ok(false);
    }

    debug!(
        id_test = test.id_test,
        run_at = %friendly_time(run_at),
        source = source.as_str(),
        "New event planned"
    );
    sqlx::query(
        "INSERT INTO events (id_test, run_at, source, recovery_attempt) VALUES (?, ?, ?, ?)",
    )
    .bind(test.id_test)
    .bind(run_at)
    .bind(source.as_str())
    .bind(recovery_attempt)
    .execute(ex)
    .await?;
    Ok(true)
}

/// Events whose `run_at` has passed.
pub async fn list_due(ex: impl SqliteExecutor<'_>, until: f64) -> StoreResult<Vec<Event>> {
    Ok(
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE run_at <= ? ORDER BY id_event")
            .bind(until)
            .fetch_all(ex)
            .await?,
    )
}

pub async fn list_by_test(ex: impl SqliteExecutor<'_>, id_test: i64) -> StoreResult<Vec<Event>> {
    Ok(
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id_test = ? ORDER BY id_event")
            .bind(id_test)
            .fetch_all(ex)
            .await?,
    )
}

pub async fn delete(ex: impl SqliteExecutor<'_>, id_event: i64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM events WHERE id_event = ?")
        .bind(id_event)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// Remove every planned event of one test (disable/delete paths).
pub async fn delete_by_test(ex: impl SqliteExecutor<'_>, id_test: i64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM events WHERE id_test = ?")
        .bind(id_test)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM events WHERE run_at < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
        .fetch_one(pool)
        .await?;
    Ok(RecordCounts::single(total))
}
