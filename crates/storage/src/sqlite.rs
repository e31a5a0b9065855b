//! Relational ledger backend on SQLite via `sqlx`.
//!
//! Timestamps are stored as Unix nanoseconds so that `ORDER BY requested_at`
//! is ordering by instant.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{HistoryFilter, QueryRecord, VerifiedQuery};
use crate::traits::QueryLedger;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS query_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cadastral_number TEXT NOT NULL CHECK (length(cadastral_number) BETWEEN 1 AND 25),
        latitude REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
        longitude REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
        verdict INTEGER NOT NULL,
        requested_at INTEGER NOT NULL,
        resolved_at INTEGER NOT NULL,
        CHECK (resolved_at >= requested_at)
    )",
    "CREATE INDEX IF NOT EXISTS idx_query_history_requested
        ON query_history(requested_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_query_history_cadastral
        ON query_history(cadastral_number, requested_at, id)",
];

const SELECT_COLUMNS: &str =
    "SELECT id, cadastral_number, latitude, longitude, verdict, requested_at, resolved_at \
     FROM query_history";

/// Default pool size for file-backed databases.
const MAX_CONNECTIONS: u32 = 8;

/// SQLite-backed [`QueryLedger`].
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Connect to `url` (e.g. `sqlite://cadastre.db`), creating the file if
    /// missing. Does not touch the schema; see [`SqliteLedger::init_schema`].
    ///
    /// `sqlite::memory:` is accepted: the pool is pinned to one connection
    /// that is never recycled, since every connection to `:memory:` is a
    /// separate database.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .connect_with(options)
                .await?
        };
        tracing::debug!(url, "ledger pool opened");
        Ok(SqliteLedger { pool })
    }

    /// A fresh private in-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let ledger = Self::connect("sqlite::memory:").await?;
        ledger.init_schema().await?;
        Ok(ledger)
    }

    /// Create the `query_history` table and its indexes. Idempotent.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl QueryLedger for SqliteLedger {
    async fn append(&self, query: VerifiedQuery) -> Result<QueryRecord, StorageError> {
        query.check()?;
        let requested_at = to_nanos(query.requested_at)?;
        let resolved_at = to_nanos(query.resolved_at)?;

        // A single INSERT is atomic on its own; no explicit transaction.
        let result = sqlx::query(
            "INSERT INTO query_history \
             (cadastral_number, latitude, longitude, verdict, requested_at, resolved_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&query.cadastral_number)
        .bind(query.latitude)
        .bind(query.longitude)
        .bind(query.verdict)
        .bind(requested_at)
        .bind(resolved_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(id, cadastral_number = %query.cadastral_number, "record appended");
        Ok(query.into_record(id))
    }

    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<QueryRecord>, StorageError> {
        let mut sql = String::from(SELECT_COLUMNS);
        if filter.cadastral_number.is_some() {
            sql.push_str(" WHERE cadastral_number = ?");
        }
        sql.push_str(" ORDER BY requested_at ASC, id ASC");
        if filter.page.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(number) = &filter.cadastral_number {
            query = query.bind(number);
        }
        if let Some(page) = filter.page {
            query = query
                .bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
                .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("ledger pool closed");
    }
}

fn to_nanos(at: OffsetDateTime) -> Result<i64, StorageError> {
    i64::try_from(at.unix_timestamp_nanos()).map_err(|_| StorageError::InvalidRecord {
        reason: format!("timestamp {at} out of storable range"),
    })
}

fn from_nanos(id: i64, nanos: i64) -> Result<OffsetDateTime, StorageError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).map_err(|e| {
        StorageError::Corrupt {
            id,
            reason: e.to_string(),
        }
    })
}

fn row_to_record(row: &SqliteRow) -> Result<QueryRecord, StorageError> {
    let id: i64 = row.try_get("id")?;
    Ok(QueryRecord {
        id,
        cadastral_number: row.try_get("cadastral_number")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        verdict: row.try_get("verdict")?,
        requested_at: from_nanos(id, row.try_get("requested_at")?)?,
        resolved_at: from_nanos(id, row.try_get("resolved_at")?)?,
    })
}
