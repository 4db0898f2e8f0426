//! Old-params table access: parameter history per test version.

use sqlx::{SqlitePool, SqliteExecutor};

use super::model::OldParams;
use super::{RecordCounts, StoreResult};

pub async fn create(
    ex: impl SqliteExecutor<'_>,
    id_test: i64,
    version: i64,
    changed: f64,
    test_params: &str,
) -> StoreResult<i64> {
    let result = sqlx::query(
        "INSERT INTO old_params (id_test, version, changed, test_params) VALUES (?, ?, ?, ?)",
    )
    .bind(id_test)
    .bind(version)
    .bind(changed)
    .bind(test_params)
    .execute(ex)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_by_test(ex: impl SqliteExecutor<'_>, id_test: i64) -> StoreResult<Vec<OldParams>> {
    Ok(sqlx::query_as::<_, OldParams>(
        "SELECT * FROM old_params WHERE id_test = ? ORDER BY id_old_params",
    )
    .bind(id_test)
    .fetch_all(ex)
    .await?)
}

pub async fn get_by_version(
    ex: impl SqliteExecutor<'_>,
    id_test: i64,
    version: i64,
) -> StoreResult<Option<OldParams>> {
    Ok(sqlx::query_as::<_, OldParams>(
        "SELECT * FROM old_params WHERE id_test = ? AND version = ? ORDER BY id_old_params LIMIT 1",
    )
    .bind(id_test)
    .bind(version)
    .fetch_optional(ex)
    .await?)
}

pub async fn delete_old(ex: impl SqliteExecutor<'_>, threshold: f64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM old_params WHERE changed < ?")
        .bind(threshold)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> StoreResult<RecordCounts> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM old_params")
        .fetch_one(pool)
        .await?;
    Ok(RecordCounts::single(total))
}
