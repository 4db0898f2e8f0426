//! Orchestrators table access.

use sqlx::{SqlitePool, SqliteExecutor};

use super::model::Orchestrator;
use super::{RecordCounts, StoreResult};

/// Create the orchestrator or refresh `last_seen`, riding the unique
/// constraint on the name.
pub async fn upsert(
    ex: impl SqliteExecutor<'_>,
    name: &str,
    last_seen: f64,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orchestrators (name, last_seen) VALUES (?, ?)
        ON CONFLICT (name) DO UPDATE SET last_seen = excluded.last_seen
        "#,
    )
    .bind(name)
    .bind(last_seen)
    .execute(ex)
    .await?;
    Ok(())
}

/// Refresh `last_seen` for an orchestrator that must already exist.
pub async fn touch(ex: impl SqliteExecutor<'_>, name: &str, last_seen: f64) -> StoreResult<bool> {
    let result = sqlx::query("UPDATE orchestrators SET last_seen = ? WHERE name = ?")
        .bind(last_seen)
        .bind(name)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_all(ex: impl SqliteExecutor<'_>) -> StoreResult<Vec<Orchestrator>> {
    Ok(sqlx::query_as::<_, Orchestrator>(
        "SELECT * FROM orchestrators ORDER BY id_orchestrator",
    )
    .fetch_all(ex)
    .await?)
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM orchestrators WHERE last_seen < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orchestrators")
        .fetch_one(pool)
        .await?;
    Ok(RecordCounts::single(total))
}
