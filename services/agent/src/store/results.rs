//! Results table access.

use sqlx::{SqlitePool, SqliteExecutor};

use super::model::{ResultStatus, TestResult};
use super::{RecordCounts, StoreResult};

/// Field set for recording a finished run.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub id_test: i64,
    pub version: i64,
    pub planned: f64,
    pub started: f64,
    pub finished: f64,
    pub status: ResultStatus,
    pub recovery_attempt: i64,
    pub data: Option<String>,
}

pub async fn create(ex: impl SqliteExecutor<'_>, new: &NewResult) -> StoreResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO results (
            id_test, version, planned, started, finished, status, recovery_attempt, data
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.id_test)
    .bind(new.version)
    .bind(new.planned)
    .bind(new.started)
    .bind(new.finished)
    .bind(new.status.as_str())
    .bind(new.recovery_attempt)
    .bind(&new.data)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Highest result id handed out so far (0 when the table is empty).
pub async fn last_id(ex: impl SqliteExecutor<'_>) -> StoreResult<i64> {
    let id: Option<i64> = sqlx::query_scalar("SELECT MAX(id_result) FROM results")
        .fetch_one(ex)
        .await?;
    Ok(id.unwrap_or(0))
}

pub async fn list_by_test(ex: impl SqliteExecutor<'_>, id_test: i64) -> StoreResult<Vec<TestResult>> {
    Ok(sqlx::query_as::<_, TestResult>(
        "SELECT * FROM results WHERE id_test = ? ORDER BY id_result",
    )
    .bind(id_test)
    .fetch_all(ex)
    .await?)
}

/// Results with `id_result > since_id` for one test.
pub async fn list_since(
    ex: impl SqliteExecutor<'_>,
    id_test: i64,
    since_id: i64,
) -> StoreResult<Vec<TestResult>> {
    Ok(sqlx::query_as::<_, TestResult>(
        "SELECT * FROM results WHERE id_test = ? AND id_result > ? ORDER BY id_result",
    )
    .bind(id_test)
    .bind(since_id)
    .fetch_all(ex)
    .await?)
}

/// Results with `since_id < id_result <= until_id`, for aggregation
/// snapshots that must not race with concurrent inserts.
pub async fn list_in_range(
    ex: impl SqliteExecutor<'_>,
    id_test: i64,
    since_id: i64,
    until_id: i64,
) -> StoreResult<Vec<TestResult>> {
    Ok(sqlx::query_as::<_, TestResult>(
        r#"
        SELECT * FROM results
        WHERE id_test = ? AND id_result > ? AND id_result <= ?
        ORDER BY id_result
        "#,
    )
    .bind(id_test)
    .bind(since_id)
    .bind(until_id)
    .fetch_all(ex)
    .await?)
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM results WHERE finished < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let mut categories = Vec::new();
    for status in [
        ResultStatus::Success,
        ResultStatus::Terminated,
        ResultStatus::Error,
        ResultStatus::Crashed,
    ] {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(pool)
            .await?;
        categories.push((status.as_str().to_string(), count));
    }
    Ok(RecordCounts::with_categories(categories))
}
