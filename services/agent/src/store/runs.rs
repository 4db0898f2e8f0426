//! Runs table access.

use sqlx::{SqlitePool, SqliteExecutor};

use super::model::{Run, RunState};
use super::{RecordCounts, StoreResult};

/// Insert a run in the `waiting` state.
pub async fn create_waiting(
    ex: impl SqliteExecutor<'_>,
    id_test: i64,
    version: i64,
    planned: f64,
    recovery_attempt: i64,
) -> StoreResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO runs (id_test, version, state, planned, recovery_attempt)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id_test)
    .bind(version)
    .bind(RunState::Waiting.as_str())
    .bind(planned)
    .bind(recovery_attempt)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get(ex: impl SqliteExecutor<'_>, id_run: i64) -> StoreResult<Option<Run>> {
    Ok(sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id_run = ?")
        .bind(id_run)
        .fetch_optional(ex)
        .await?)
}

pub async fn list_by_state(ex: impl SqliteExecutor<'_>, state: RunState) -> StoreResult<Vec<Run>> {
    Ok(
        sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE state = ? ORDER BY id_run")
            .bind(state.as_str())
            .fetch_all(ex)
            .await?,
    )
}

/// Runs in the given state whose deadline already passed.
pub async fn list_past_deadline(
    ex: impl SqliteExecutor<'_>,
    state: RunState,
    now: f64,
) -> StoreResult<Vec<Run>> {
    Ok(sqlx::query_as::<_, Run>(
        "SELECT * FROM runs WHERE state = ? AND deadline < ? ORDER BY id_run",
    )
    .bind(state.as_str())
    .bind(now)
    .fetch_all(ex)
    .await?)
}

pub async fn list_by_test(ex: impl SqliteExecutor<'_>, id_test: i64) -> StoreResult<Vec<Run>> {
    Ok(
        sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id_test = ? ORDER BY id_run")
            .bind(id_test)
            .fetch_all(ex)
            .await?,
    )
}

/// Whether a waiting run already exists for the test.
pub async fn waiting_exists(ex: impl SqliteExecutor<'_>, id_test: i64) -> StoreResult<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE id_test = ? AND state = 'waiting'")
            .bind(id_test)
            .fetch_one(ex)
            .await?;
    Ok(count > 0)
}

/// Transition a waiting run into `running` once its process is up.
pub async fn mark_started(
    ex: impl SqliteExecutor<'_>,
    id_run: i64,
    version: i64,
    pid: i64,
    started: f64,
    deadline: f64,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE runs
        SET version = ?, pid = ?, state = ?, started = ?, deadline = ?
        WHERE id_run = ?
        "#,
    )
    .bind(version)
    .bind(pid)
    .bind(RunState::Running.as_str())
    .bind(started)
    .bind(deadline)
    .bind(id_run)
    .execute(ex)
    .await?;
    Ok(())
}

/// Move a run along the escalation ladder with a fresh deadline.
pub async fn update_state(
    ex: impl SqliteExecutor<'_>,
    id_run: i64,
    state: RunState,
    deadline: f64,
) -> StoreResult<()> {
    sqlx::query("UPDATE runs SET state = ?, deadline = ? WHERE id_run = ?")
        .bind(state.as_str())
        .bind(deadline)
        .bind(id_run)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn delete(ex: impl SqliteExecutor<'_>, id_run: i64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM runs WHERE id_run = ?")
        .bind(id_run)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM runs WHERE planned < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let mut categories = Vec::new();
    for state in RunState::all() {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE state = ?")
            .bind(state.as_str())
            .fetch_one(pool)
            .await?;
        categories.push((state.as_str().to_string(), count));
    }
    Ok(RecordCounts::with_categories(categories))
}
