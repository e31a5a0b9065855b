use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use super::{make_query, TestResult};
use crate::{QueryLedger, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_identical_appends_all_recorded",
            concurrent_identical_appends_all_recorded(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_reads_during_appends_see_prefixes",
            concurrent_reads_during_appends_see_prefixes(factory).await,
        ),
    ]
}

// ── Concurrent identical appends: no merging ────────────────────────────────

/// N tasks append a query for the same cadastral number at the same instant.
/// All N must be stored under N distinct ids.
async fn concurrent_identical_appends_all_recorded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let l = ledger.clone();
        handles.push(tokio::spawn(async move {
            l.append(make_query("77:01:0001:123", 0, i % 2 == 0)).await
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let record = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if !seen.insert(record.id) {
            return Err(format!("id {} assigned twice", record.id));
        }
    }

    let stored = ledger
        .list_by_cadastral_number("77:01:0001:123")
        .await
        .map_err(|e| e.to_string())?;
    if stored.len() != N {
        return Err(format!("expected {N} records, got {}", stored.len()));
    }
    let stored_ids: HashSet<i64> = stored.iter().map(|r| r.id).collect();
    if stored_ids != seen {
        return Err("stored ids differ from returned ids".to_string());
    }
    Ok(())
}

// ── Reads racing appends ────────────────────────────────────────────────────

/// Appends use increasing `requested_at`, so every read taken while they run
/// must be a prefix of the final sequence: no torn or partial records.
async fn concurrent_reads_during_appends_see_prefixes<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = Arc::new(factory().await);

    let writer = {
        let l = ledger.clone();
        tokio::spawn(async move {
            for i in 0..N as u64 {
                l.append(make_query("12:34:567890:1", i, true)).await?;
            }
            Ok::<(), StorageError>(())
        })
    };

    let mut snapshots = Vec::new();
    for _ in 0..N {
        snapshots.push(ledger.list_all().await.map_err(|e| e.to_string())?);
        tokio::task::yield_now().await;
    }

    writer
        .await
        .map_err(|e| format!("task panic: {e}"))?
        .map_err(|e| format!("storage error: {e}"))?;

    let last = ledger.list_all().await.map_err(|e| e.to_string())?;
    if last.len() != N {
        return Err(format!("expected {N} records, got {}", last.len()));
    }
    for snap in snapshots {
        if snap[..] != last[..snap.len()] {
            return Err("intermediate read is not a prefix of the final state".to_string());
        }
    }
    Ok(())
}
