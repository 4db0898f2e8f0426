//! Nonces table access.
//!
//! The unique constraint on `nonce` is the replay sentinel: inserting a
//! value that was already used fails with a unique violation, which the
//! authorization layer turns into a 403.

use sqlx::{SqlitePool, SqliteExecutor};

use super::{RecordCounts, StoreResult};

pub async fn create(ex: impl SqliteExecutor<'_>, nonce: &str, used_at: f64) -> StoreResult<()> {
    sqlx::query("INSERT INTO nonces (nonce, used_at) VALUES (?, ?)")
        .bind(nonce)
        .bind(used_at)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM nonces WHERE used_at < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nonces")
        .fetch_one(pool)
        .await?;
    Ok(RecordCounts::single(total))
}
