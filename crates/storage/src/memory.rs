//! Process-local ledger backend.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{HistoryFilter, QueryRecord, VerifiedQuery};
use crate::traits::QueryLedger;

/// In-memory [`QueryLedger`]. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<QueryRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl QueryLedger for MemoryLedger {
    async fn append(&self, query: VerifiedQuery) -> Result<QueryRecord, StorageError> {
        query.check()?;
        let mut records = self.records.write().await;
        // Ids start at 1, matching an autoincrement column.
        let id = records.last().map_or(1, |r| r.id + 1);
        let record = query.into_record(id);
        records.push(record.clone());
        tracing::debug!(id, cadastral_number = %record.cadastral_number, "record appended");
        Ok(record)
    }

    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<QueryRecord>, StorageError> {
        let records = self.records.read().await;
        let mut selected: Vec<QueryRecord> =
            records.iter().filter(|r| filter.matches(r)).cloned().collect();
        drop(records);

        selected.sort_by_key(QueryRecord::ledger_order);

        if let Some(page) = filter.page {
            let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
            selected = selected.into_iter().skip(offset).take(limit).collect();
        }
        Ok(selected)
    }
}
