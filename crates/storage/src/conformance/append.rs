use std::future::Future;
use std::time::Duration;

use super::{append_all, make_query, TestResult};
use crate::{QueryLedger, StorageError};

pub(super) async fn run_append_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "append",
            "append_assigns_increasing_ids",
            append_assigns_increasing_ids(factory).await,
        ),
        TestResult::from_result(
            "append",
            "append_returns_record_as_written",
            append_returns_record_as_written(factory).await,
        ),
        TestResult::from_result(
            "append",
            "repeat_queries_produce_separate_records",
            repeat_queries_produce_separate_records(factory).await,
        ),
        TestResult::from_result(
            "append",
            "invalid_record_rejected_without_write",
            invalid_record_rejected_without_write(factory).await,
        ),
        TestResult::from_result(
            "append",
            "zero_latency_record_accepted",
            zero_latency_record_accepted(factory).await,
        ),
    ]
}

async fn append_assigns_increasing_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let records = append_all(
        &ledger,
        vec![
            make_query("12:34:567890:1", 0, true),
            make_query("12:34:567890:2", 1, false),
            make_query("12:34:567890:3", 2, true),
        ],
    )
    .await?;

    if !records.windows(2).all(|w| w[0].id < w[1].id) {
        return Err(format!("ids not increasing: {:?}", super::ids(&records)));
    }
    Ok(())
}

async fn append_returns_record_as_written<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let query = make_query("77:01:0001:123", 5, true);
    let written = ledger
        .append(query.clone())
        .await
        .map_err(|e| format!("append: {e}"))?;

    if written.cadastral_number != query.cadastral_number
        || written.verdict != query.verdict
        || written.requested_at != query.requested_at
        || written.resolved_at != query.resolved_at
    {
        return Err(format!("returned record differs: {written:?}"));
    }

    let all = ledger.list_all().await.map_err(|e| format!("list: {e}"))?;
    if all != vec![written.clone()] {
        return Err(format!("stored {all:?}, returned {written:?}"));
    }
    Ok(())
}

async fn repeat_queries_produce_separate_records<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let q = make_query("77:01:0001:123", 0, true);
    let first = ledger.append(q.clone()).await.map_err(|e| e.to_string())?;
    let second = ledger.append(q).await.map_err(|e| e.to_string())?;

    if first.id == second.id {
        return Err("identical queries merged into one id".to_string());
    }
    let count = ledger
        .list_by_cadastral_number("77:01:0001:123")
        .await
        .map_err(|e| e.to_string())?
        .len();
    if count != 2 {
        return Err(format!("expected 2 records, got {count}"));
    }
    Ok(())
}

async fn invalid_record_rejected_without_write<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let mut backwards = make_query("12:34:567890:1", 60, true);
    backwards.resolved_at = backwards.requested_at - Duration::from_secs(1);

    let mut nameless = make_query("", 0, true);
    nameless.cadastral_number.clear();

    for bad in [backwards, nameless] {
        match ledger.append(bad).await {
            Err(StorageError::InvalidRecord { .. }) => {}
            other => return Err(format!("expected InvalidRecord, got {other:?}")),
        }
    }

    let all = ledger.list_all().await.map_err(|e| e.to_string())?;
    if !all.is_empty() {
        return Err(format!("rejected records were written: {all:?}"));
    }
    Ok(())
}

async fn zero_latency_record_accepted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let mut q = make_query("12:34:567890:1", 0, false);
    q.resolved_at = q.requested_at;
    let record = ledger.append(q).await.map_err(|e| e.to_string())?;
    if !record.latency().is_zero() {
        return Err(format!("expected zero latency, got {:?}", record.latency()));
    }
    Ok(())
}
