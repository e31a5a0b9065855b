//! End-to-end behaviour of the orchestrator against real ledgers.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadastre_storage::{
    HistoryFilter, MemoryLedger, QueryLedger, QueryRecord, SqliteLedger, StorageError,
    VerifiedQuery,
};
use cadastre_verify::{
    FixedVerifier, InvalidQuery, Orchestrator, OrchestratorConfig, QueryError, QueryRequest,
    SimulatedAuthority, SimulationProfile, VerifyError, DEFAULT_VERIFICATION_TIMEOUT,
    MAX_SIMULATED_DELAY,
};
use time::OffsetDateTime;

fn request() -> QueryRequest {
    QueryRequest::new("77:01:0001:123", 55.75, 37.61)
}

fn orchestrator(verifier: Arc<FixedVerifier>, ledger: Arc<MemoryLedger>) -> Orchestrator {
    Orchestrator::new(verifier, ledger, OrchestratorConfig::default())
}

/// A ledger whose writes always fail.
struct BrokenLedger;

#[async_trait]
impl QueryLedger for BrokenLedger {
    async fn append(&self, _query: VerifiedQuery) -> Result<QueryRecord, StorageError> {
        Err(StorageError::Backend("disk full".to_string()))
    }

    async fn list(&self, _filter: &HistoryFilter) -> Result<Vec<QueryRecord>, StorageError> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn simulated_query_is_recorded_with_bounded_latency() {
    let authority = Arc::new(SimulatedAuthority::new(SimulationProfile {
        seed: Some(42),
        ..SimulationProfile::default()
    }));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = Orchestrator::new(authority, ledger.clone(), OrchestratorConfig::default());

    let record = orch.submit(request()).await.unwrap();

    assert_eq!(record.cadastral_number, "77:01:0001:123");
    assert_eq!(record.latitude, 55.75);
    assert_eq!(record.longitude, 37.61);
    assert!(record.latency() <= MAX_SIMULATED_DELAY);
    assert_eq!(ledger.list_all().await.unwrap(), vec![record]);
}

#[tokio::test(start_paused = true)]
async fn verdict_and_latency_follow_the_verifier() {
    let verifier = Arc::new(FixedVerifier::new(Duration::from_secs(12), false));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = orchestrator(verifier.clone(), ledger.clone());

    let record = orch.submit(request()).await.unwrap();
    assert!(!record.verdict);
    assert_eq!(record.latency(), Duration::from_secs(12));
    assert_eq!(verifier.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn answer_at_the_delay_ceiling_is_on_time() {
    assert!(DEFAULT_VERIFICATION_TIMEOUT > MAX_SIMULATED_DELAY);

    let verifier = Arc::new(FixedVerifier::new(MAX_SIMULATED_DELAY, true));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = orchestrator(verifier, ledger.clone());

    let record = orch.submit(request()).await.unwrap();
    assert_eq!(record.latency(), MAX_SIMULATED_DELAY);
    assert_eq!(ledger.len().await, 1);
}

#[tokio::test]
async fn requested_at_is_stamped_on_acceptance() {
    let verifier = Arc::new(FixedVerifier::new(Duration::ZERO, true));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = Arc::new(orchestrator(verifier, ledger));

    let accepted = OffsetDateTime::now_utc();
    let submit = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.submit(request()).await })
    };
    // Queued behind `submit` and ahead of the verification task it spawns.
    let busy = tokio::spawn(async {
        std::thread::sleep(Duration::from_millis(250));
    });

    let record = submit.await.unwrap().unwrap();
    busy.await.unwrap();

    assert!(record.requested_at >= accepted);
    assert!(record.requested_at - accepted < time::Duration::milliseconds(100));
    assert!(record.latency() >= Duration::from_millis(250));
}

#[tokio::test]
async fn invalid_query_never_reaches_verifier() {
    let verifier = Arc::new(FixedVerifier::new(Duration::ZERO, true));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = orchestrator(verifier.clone(), ledger.clone());

    let err = orch
        .submit(QueryRequest::new("77-01-0001-123", 55.75, 37.61))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Invalid(InvalidQuery::MalformedCadastralNumber(_))
    ));

    let err = orch
        .submit(QueryRequest::new("77:01:0001:123", 91.0, 37.61))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Invalid(InvalidQuery::LatitudeOutOfRange(_))
    ));

    assert_eq!(verifier.calls(), 0);
    assert!(ledger.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn identical_concurrent_queries_each_get_a_record() {
    const N: usize = 10;
    let authority = Arc::new(SimulatedAuthority::new(SimulationProfile {
        seed: Some(7),
        ..SimulationProfile::default()
    }));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = Arc::new(Orchestrator::new(
        authority,
        ledger.clone(),
        OrchestratorConfig::default(),
    ));

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.submit(request()).await })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        ids.insert(record.id);
    }

    assert_eq!(ids.len(), N);
    assert_eq!(ledger.len().await, N);
    assert_eq!(orch.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_leaves_no_record() {
    let verifier = Arc::new(FixedVerifier::new(Duration::from_secs(90), true));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = Orchestrator::new(
        verifier,
        ledger.clone(),
        OrchestratorConfig {
            verification_timeout: Duration::from_secs(5),
        },
    );

    let err = orch.submit(request()).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::Verification(VerifyError::Timeout { limit }) if limit == Duration::from_secs(5)
    ));
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn unavailable_authority_leaves_no_record() {
    let verifier = Arc::new(FixedVerifier::failing(
        Duration::ZERO,
        VerifyError::Unavailable("connection refused".to_string()),
    ));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = orchestrator(verifier, ledger.clone());

    let err = orch.submit(request()).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::Verification(VerifyError::Unavailable(_))
    ));
    assert!(ledger.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_pending_verification() {
    let verifier = Arc::new(FixedVerifier::new(Duration::from_secs(30), true));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = Arc::new(orchestrator(verifier, ledger.clone()));

    let pending = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.submit(request()).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(orch.in_flight(), 1);

    orch.begin_shutdown();
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, QueryError::Verification(VerifyError::Aborted)));

    orch.drain().await;
    assert_eq!(orch.in_flight(), 0);
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn submit_after_shutdown_is_refused() {
    let verifier = Arc::new(FixedVerifier::new(Duration::ZERO, true));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = orchestrator(verifier.clone(), ledger.clone());

    orch.begin_shutdown();
    let err = orch.submit(request()).await.unwrap_err();
    assert!(matches!(err, QueryError::Verification(VerifyError::Aborted)));
    assert_eq!(verifier.calls(), 0);
    assert!(ledger.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn abandoned_caller_still_records() {
    let verifier = Arc::new(FixedVerifier::new(Duration::from_secs(10), true));
    let ledger = Arc::new(MemoryLedger::new());
    let orch = orchestrator(verifier, ledger.clone());

    // The caller gives up long before the verdict arrives.
    let gave_up = tokio::time::timeout(Duration::from_secs(1), orch.submit(request())).await;
    assert!(gave_up.is_err());
    assert!(ledger.is_empty().await);

    orch.drain().await;
    let records = ledger.list_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].verdict);
}

#[tokio::test]
async fn ledger_failure_returns_unrecorded_verdict() {
    let verifier = Arc::new(FixedVerifier::new(Duration::ZERO, true));
    let orch = Orchestrator::new(
        verifier,
        Arc::new(BrokenLedger),
        OrchestratorConfig::default(),
    );

    let err = orch.submit(request()).await.unwrap_err();
    let verdict = err.unrecorded_verdict().expect("verdict should be carried");
    assert!(verdict.verdict);
    assert_eq!(verdict.cadastral_number, "77:01:0001:123");
    assert!(matches!(
        err,
        QueryError::Persistence {
            source: StorageError::Backend(_),
            ..
        }
    ));
}

#[tokio::test]
async fn history_filter_sees_only_matching_queries() {
    let verifier = Arc::new(FixedVerifier::new(Duration::ZERO, true));
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let orch = Orchestrator::new(verifier, ledger.clone(), OrchestratorConfig::default());

    orch.submit(request()).await.unwrap();
    orch.submit(QueryRequest::new("12:34:567890:10", 10.0, 20.0))
        .await
        .unwrap();
    orch.submit(request()).await.unwrap();

    let all = ledger.list_all().await.unwrap();
    let filtered = ledger
        .list_by_cadastral_number("77:01:0001:123")
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(filtered.len(), 2);
    let expected: Vec<_> = all
        .into_iter()
        .filter(|r| r.cadastral_number == "77:01:0001:123")
        .collect();
    assert_eq!(filtered, expected);
}

#[tokio::test]
async fn shutdown_closes_the_ledger() {
    let verifier = Arc::new(FixedVerifier::new(Duration::ZERO, true));
    let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
    let orch = Orchestrator::new(verifier, ledger.clone(), OrchestratorConfig::default());

    orch.submit(request()).await.unwrap();
    orch.shutdown().await;

    assert!(ledger.list_all().await.is_err());
}
