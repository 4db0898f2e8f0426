//! Stats table access: hourly table-census snapshots.

use sqlx::{SqlitePool, SqliteExecutor};

use super::{RecordCounts, StoreResult};

pub async fn create(
    ex: impl SqliteExecutor<'_>,
    time: f64,
    table_name: &str,
    category: &str,
    value: i64,
) -> StoreResult<i64> {
    let result = sqlx::query(
        "INSERT INTO stats (time, table_name, category, value) VALUES (?, ?, ?, ?)",
    )
    .bind(time)
    .bind(table_name)
    .bind(category)
    .bind(value)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM stats WHERE time < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stats")
        .fetch_one(pool)
        .await?;
    Ok(RecordCounts::single(total))
}
