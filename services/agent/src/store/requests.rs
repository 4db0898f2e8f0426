//! Requests table access.
//!
//! Requests are produced by the API server and the tests manager and
//! consumed (deleted) by the calendar.

use sqlx::{SqlitePool, SqliteExecutor};

use super::model::{Request, RequestReason};
use super::{RecordCounts, StoreResult};

pub async fn create(
    ex: impl SqliteExecutor<'_>,
    id_test: i64,
    reason: RequestReason,
    recovery_attempt: i64,
    added_time: f64,
) -> StoreResult<i64> {
    let result = sqlx::query(
        "INSERT INTO requests (id_test, reason, recovery_attempt, added_time) VALUES (?, ?, ?, ?)",
    )
    .bind(id_test)
    .bind(reason.as_str())
    .bind(recovery_attempt)
    .bind(added_time)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_all(ex: impl SqliteExecutor<'_>) -> StoreResult<Vec<Request>> {
    Ok(
        sqlx::query_as::<_, Request>("SELECT * FROM requests ORDER BY id_request")
            .fetch_all(ex)
            .await?,
    )
}

pub async fn list_by_test(ex: impl SqliteExecutor<'_>, id_test: i64) -> StoreResult<Vec<Request>> {
    Ok(sqlx::query_as::<_, Request>(
        "SELECT * FROM requests WHERE id_test = ? ORDER BY id_request",
    )
    .bind(id_test)
    .fetch_all(ex)
    .await?)
}

pub async fn delete(ex: impl SqliteExecutor<'_>, id_request: i64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM requests WHERE id_request = ?")
        .bind(id_request)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM requests WHERE added_time < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requests")
        .fetch_one(pool)
        .await?;
    Ok(RecordCounts::single(total))
}
