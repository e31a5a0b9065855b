/// All errors that can be returned by a QueryLedger implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The record violates a ledger invariant and was not written.
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    /// A stored row could not be turned back into a record.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },

    /// A backend-specific storage error (DB connection, constraint, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Backend(e.to_string())
    }
}
