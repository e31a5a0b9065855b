use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{HistoryFilter, QueryRecord, VerifiedQuery};

/// The storage trait for the query history ledger.
///
/// A `QueryLedger` is an append-only store of completed queries. Records are
/// never updated or deleted once written.
///
/// ## Atomicity
///
/// `append` writes exactly one record or nothing. A record that fails
/// [`VerifiedQuery::check`] is rejected with
/// `StorageError::InvalidRecord` and leaves the ledger unchanged.
///
/// ## Ordering
///
/// Every read returns records ordered by `requested_at` ascending, ties
/// broken by `id` (insertion order). The order is a pure function of the
/// stored state, so two reads with no write in between return identical
/// sequences.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared through
/// axum application state and across spawned verification tasks. Concurrent
/// appends are independent inserts; serialising them is the backend's job.
#[async_trait]
pub trait QueryLedger: Send + Sync + 'static {
    /// Persist a completed query and return it with its assigned id.
    async fn append(&self, query: VerifiedQuery) -> Result<QueryRecord, StorageError>;

    /// Read the records selected by `filter`, in ledger order.
    ///
    /// A filter with no matches yields an empty vector, not an error.
    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<QueryRecord>, StorageError>;

    /// All records in ledger order.
    async fn list_all(&self) -> Result<Vec<QueryRecord>, StorageError> {
        self.list(&HistoryFilter::all()).await
    }

    /// Records for one cadastral number, in ledger order.
    async fn list_by_cadastral_number(
        &self,
        cadastral_number: &str,
    ) -> Result<Vec<QueryRecord>, StorageError> {
        self.list(&HistoryFilter::by_cadastral_number(cadastral_number))
            .await
    }

    /// Release the underlying store handle. Further calls may fail.
    async fn close(&self) {}
}
