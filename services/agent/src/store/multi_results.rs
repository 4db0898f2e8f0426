//! Multi-results table access.
//!
//! Member test ids live in the store as a JSON integer array and in code
//! as `Vec<i64>`; only the HTTP layer renders the comma-separated form.

use sqlx::{SqlitePool, SqliteExecutor};

use super::model::MultiResult;
use super::{RecordCounts, StoreError, StoreResult};

fn encode_ids(test_ids: &[i64]) -> StoreResult<String> {
    serde_json::to_string(test_ids)
        .map_err(|e| StoreError::Decode(format!("unable to encode member ids: {e}")))
}

pub async fn create(
    ex: impl SqliteExecutor<'_>,
    orchestrator_name: &str,
    key: &str,
    last_used_time: f64,
) -> StoreResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO multi_results (orchestrator_name, test_ids, key, last_used_time)
        VALUES (?, '[]', ?, ?)
        "#,
    )
    .bind(orchestrator_name)
    .bind(key)
    .bind(last_used_time)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get(
    ex: impl SqliteExecutor<'_>,
    id_multi_result: i64,
) -> StoreResult<Option<MultiResult>> {
    Ok(
        sqlx::query_as::<_, MultiResult>("SELECT * FROM multi_results WHERE id_multi_result = ?")
            .bind(id_multi_result)
            .fetch_optional(ex)
            .await?,
    )
}

pub async fn update_test_ids(
    ex: impl SqliteExecutor<'_>,
    id_multi_result: i64,
    test_ids: &[i64],
) -> StoreResult<()> {
    sqlx::query("UPDATE multi_results SET test_ids = ? WHERE id_multi_result = ?")
        .bind(encode_ids(test_ids)?)
        .bind(id_multi_result)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn update_last_used(
    ex: impl SqliteExecutor<'_>,
    id_multi_result: i64,
    last_used_time: f64,
) -> StoreResult<()> {
    sqlx::query("UPDATE multi_results SET last_used_time = ? WHERE id_multi_result = ?")
        .bind(last_used_time)
        .bind(id_multi_result)
        .execute(ex)
        .await?;
    Ok(())
}

/// Each orchestrator owns at most one aggregator; init replaces it.
pub async fn delete_by_orchestrator(
    ex: impl SqliteExecutor<'_>,
    orchestrator_name: &str,
) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM multi_results WHERE orchestrator_name = ?")
        .bind(orchestrator_name)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM multi_results WHERE last_used_time < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM multi_results")
        .fetch_one(pool)
        .await?;
    Ok(RecordCounts::single(total))
}
