use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StorageError;

/// Largest page a history read may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A query whose verdict has been obtained but which has not been written
/// to the ledger yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedQuery {
    pub cadastral_number: String,
    pub latitude: f64,
    pub longitude: f64,
    pub verdict: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub resolved_at: OffsetDateTime,
}

impl VerifiedQuery {
    /// Check the invariants every persisted record must satisfy.
    pub fn check(&self) -> Result<(), StorageError> {
        if self.cadastral_number.is_empty() {
            return Err(invalid("empty cadastral number"));
        }
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(invalid("coordinates must be finite"));
        }
        if self.resolved_at < self.requested_at {
            return Err(invalid("resolved_at precedes requested_at"));
        }
        Ok(())
    }

    /// Attach the ledger-assigned id.
    pub fn into_record(self, id: i64) -> QueryRecord {
        QueryRecord {
            id,
            cadastral_number: self.cadastral_number,
            latitude: self.latitude,
            longitude: self.longitude,
            verdict: self.verdict,
            requested_at: self.requested_at,
            resolved_at: self.resolved_at,
        }
    }
}

fn invalid(reason: &str) -> StorageError {
    StorageError::InvalidRecord {
        reason: reason.to_string(),
    }
}

/// A completed query as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Assigned at persistence time; strictly increasing in insertion order.
    pub id: i64,
    pub cadastral_number: String,
    pub latitude: f64,
    pub longitude: f64,
    pub verdict: bool,
    /// RFC 3339 on the wire.
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    /// RFC 3339 on the wire. Never earlier than `requested_at`.
    #[serde(with = "time::serde::rfc3339")]
    pub resolved_at: OffsetDateTime,
}

impl QueryRecord {
    /// Time the verification took.
    pub fn latency(&self) -> Duration {
        (self.resolved_at - self.requested_at)
            .try_into()
            .unwrap_or(Duration::ZERO)
    }

    /// Ledger read order: `requested_at`, then `id`.
    pub fn ledger_order(&self) -> (OffsetDateTime, i64) {
        (self.requested_at, self.id)
    }
}

/// A 1-based page over an ordered history read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
    size: u32,
}

impl Page {
    /// Returns `None` when `number` is zero or `size` is outside `1..=MAX_PAGE_SIZE`.
    pub fn new(number: u32, size: u32) -> Option<Self> {
        if number == 0 || size == 0 || size > MAX_PAGE_SIZE {
            return None;
        }
        Some(Page { number, size })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// Which slice of the history to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub cadastral_number: Option<String>,
    pub page: Option<Page>,
}

impl HistoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_cadastral_number(cadastral_number: &str) -> Self {
        HistoryFilter {
            cadastral_number: Some(cadastral_number.to_string()),
            page: None,
        }
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    pub fn matches(&self, record: &QueryRecord) -> bool {
        self.cadastral_number
            .as_deref()
            .map_or(true, |n| n == record.cadastral_number)
    }
}
