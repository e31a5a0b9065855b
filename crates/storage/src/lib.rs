//! History ledger for cadastral verification queries.
//!
//! The ledger is append-only: a [`QueryRecord`] is written once, after its
//! verdict is known, and is never updated or deleted. Reads are ordered by
//! `requested_at`, ties broken by `id`.

pub mod conformance;
mod error;
mod memory;
mod record;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use error::StorageError;
pub use memory::MemoryLedger;
pub use record::{HistoryFilter, Page, QueryRecord, VerifiedQuery, MAX_PAGE_SIZE};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
pub use traits::QueryLedger;
