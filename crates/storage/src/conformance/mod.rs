//! Conformance test suite for `QueryLedger` implementations.
//!
//! This module provides a backend-agnostic test suite that any `QueryLedger`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Append**: id assignment, atomic rejection of invalid records
//! - **Reads**: ordering by `requested_at`, filtering, pagination, idempotence
//! - **Concurrency**: concurrent identical appends are never merged
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty ledger for each test:
//!
//! ```ignore
//! use cadastre_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         SqliteLedger::in_memory().await.unwrap()
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod append;
mod concurrent;
mod read;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use time::macros::datetime;
use time::OffsetDateTime;

use crate::record::VerifiedQuery;
use crate::QueryLedger;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "append", "read").
    pub category: String,
    /// Test name (e.g. "append_assigns_increasing_ids").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a ledger backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// ledger, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(append::run_append_tests(&factory).await);
    results.extend(read::run_read_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

const BASE: OffsetDateTime = datetime!(2025-01-01 00:00:00 UTC);

/// A verified query requested `offset_secs` after the base instant and
/// resolved 30 seconds later.
fn make_query(cadastral_number: &str, offset_secs: u64, verdict: bool) -> VerifiedQuery {
    let requested_at = BASE + Duration::from_secs(offset_secs);
    VerifiedQuery {
        cadastral_number: cadastral_number.to_string(),
        latitude: 55.75,
        longitude: 37.61,
        verdict,
        requested_at,
        resolved_at: requested_at + Duration::from_secs(30),
    }
}

async fn append_all<S: QueryLedger>(
    ledger: &S,
    queries: Vec<VerifiedQuery>,
) -> Result<Vec<crate::QueryRecord>, String> {
    let mut records = Vec::with_capacity(queries.len());
    for q in queries {
        records.push(ledger.append(q).await.map_err(|e| format!("append: {e}"))?);
    }
    Ok(records)
}

fn ids(records: &[crate::QueryRecord]) -> Vec<i64> {
    records.iter().map(|r| r.id).collect()
}
