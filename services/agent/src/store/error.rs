//! Store error types.

use thiserror::Error;

/// Store operation errors.
///
/// Everything except [`StoreError::Open`] and [`StoreError::MissingTable`]
/// is transaction-scoped: the caller rolls back the current item and moves
/// on. The two named variants are global errors that abort the task.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open the store file.
    #[error("failed to open the store: {0}")]
    Open(#[source] sqlx::Error),

    /// The store is missing a required table.
    #[error("store is missing the required table '{0}'")]
    MissingTable(String),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A row carried a value the model cannot represent.
    #[error("invalid stored value: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether the error is a unique-constraint violation.
    ///
    /// The nonce table relies on this as its replay sentinel.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Query(sqlx::Error::Database(e)) if e.is_unique_violation()
        )
    }
}
