use std::future::Future;

use super::{append_all, ids, make_query, TestResult};
use crate::{HistoryFilter, Page, QueryLedger};

pub(super) async fn run_read_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "read",
            "empty_ledger_lists_nothing",
            empty_ledger_lists_nothing(factory).await,
        ),
        TestResult::from_result(
            "read",
            "list_all_orders_by_requested_at",
            list_all_orders_by_requested_at(factory).await,
        ),
        TestResult::from_result(
            "read",
            "equal_requested_at_ordered_by_id",
            equal_requested_at_ordered_by_id(factory).await,
        ),
        TestResult::from_result(
            "read",
            "filter_is_ordered_subsequence_of_list_all",
            filter_is_ordered_subsequence_of_list_all(factory).await,
        ),
        TestResult::from_result(
            "read",
            "filter_without_matches_is_empty",
            filter_without_matches_is_empty(factory).await,
        ),
        TestResult::from_result(
            "read",
            "reads_are_idempotent",
            reads_are_idempotent(factory).await,
        ),
        TestResult::from_result(
            "read",
            "pages_partition_the_ordered_sequence",
            pages_partition_the_ordered_sequence(factory).await,
        ),
    ]
}

async fn empty_ledger_lists_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let all = ledger.list_all().await.map_err(|e| e.to_string())?;
    if !all.is_empty() {
        return Err(format!("fresh ledger not empty: {all:?}"));
    }
    Ok(())
}

/// Records are appended in completion order but read in request order.
async fn list_all_orders_by_requested_at<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let written = append_all(
        &ledger,
        vec![
            make_query("12:34:567890:1", 20, true),
            make_query("12:34:567890:2", 0, false),
            make_query("12:34:567890:3", 10, true),
        ],
    )
    .await?;

    let all = ledger.list_all().await.map_err(|e| e.to_string())?;
    let expected = vec![written[1].id, written[2].id, written[0].id];
    if ids(&all) != expected {
        return Err(format!("expected {expected:?}, got {:?}", ids(&all)));
    }
    Ok(())
}

async fn equal_requested_at_ordered_by_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let written = append_all(
        &ledger,
        vec![
            make_query("12:34:567890:1", 7, true),
            make_query("12:34:567890:1", 7, false),
            make_query("12:34:567890:1", 7, true),
        ],
    )
    .await?;

    let all = ledger.list_all().await.map_err(|e| e.to_string())?;
    if ids(&all) != ids(&written) {
        return Err(format!(
            "tie not broken by id: expected {:?}, got {:?}",
            ids(&written),
            ids(&all)
        ));
    }
    Ok(())
}

async fn filter_is_ordered_subsequence_of_list_all<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    append_all(
        &ledger,
        vec![
            make_query("77:01:0001:123", 50, true),
            make_query("12:34:567890:1", 40, false),
            make_query("77:01:0001:123", 30, false),
            make_query("12:34:567890:1", 20, true),
            make_query("77:01:0001:123", 10, true),
        ],
    )
    .await?;

    let all = ledger.list_all().await.map_err(|e| e.to_string())?;
    let filtered = ledger
        .list_by_cadastral_number("77:01:0001:123")
        .await
        .map_err(|e| e.to_string())?;

    let expected: Vec<_> = all
        .into_iter()
        .filter(|r| r.cadastral_number == "77:01:0001:123")
        .collect();
    if filtered != expected {
        return Err(format!(
            "filtered {:?} is not the subsequence {:?}",
            ids(&filtered),
            ids(&expected)
        ));
    }
    Ok(())
}

async fn filter_without_matches_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    append_all(&ledger, vec![make_query("12:34:567890:1", 0, true)]).await?;
    let none = ledger
        .list_by_cadastral_number("00:00:000000:00")
        .await
        .map_err(|e| format!("expected empty result, got error: {e}"))?;
    if !none.is_empty() {
        return Err(format!("expected no records, got {none:?}"));
    }
    Ok(())
}

async fn reads_are_idempotent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    append_all(
        &ledger,
        vec![
            make_query("12:34:567890:1", 3, true),
            make_query("12:34:567890:2", 1, false),
            make_query("12:34:567890:1", 3, false),
        ],
    )
    .await?;

    let first = ledger.list_all().await.map_err(|e| e.to_string())?;
    let second = ledger.list_all().await.map_err(|e| e.to_string())?;
    if first != second {
        return Err("two reads with no write in between differ".to_string());
    }
    Ok(())
}

async fn pages_partition_the_ordered_sequence<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: QueryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let ledger = factory().await;
    let queries = (0..7)
        .rev()
        .map(|i| make_query("12:34:567890:1", i, i % 2 == 0))
        .collect();
    append_all(&ledger, queries).await?;

    let all = ledger.list_all().await.map_err(|e| e.to_string())?;
    let mut paged = Vec::new();
    for number in 1..=4 {
        let page = Page::new(number, 2).ok_or("page rejected")?;
        let chunk = ledger
            .list(&HistoryFilter::by_cadastral_number("12:34:567890:1").with_page(page))
            .await
            .map_err(|e| e.to_string())?;
        let expected_len = if number == 4 { 1 } else { 2 };
        if chunk.len() != expected_len {
            return Err(format!(
                "page {number}: expected {expected_len} records, got {}",
                chunk.len()
            ));
        }
        paged.extend(chunk);
    }
    if paged != all {
        return Err(format!(
            "pages {:?} do not reassemble {:?}",
            ids(&paged),
            ids(&all)
        ));
    }

    let beyond = ledger
        .list(&HistoryFilter::all().with_page(Page::new(9, 2).ok_or("page rejected")?))
        .await
        .map_err(|e| e.to_string())?;
    if !beyond.is_empty() {
        return Err("page past the end should be empty".to_string());
    }
    Ok(())
}
