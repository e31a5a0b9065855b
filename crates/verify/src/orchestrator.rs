//! Query orchestration: validate, verify, record.
//!
//! Each accepted query runs as its own tokio task, so the verification and
//! its ledger write complete even if the caller stops waiting. Shutdown
//! aborts tasks still waiting on the verifier; those write nothing.

use std::sync::Arc;
use std::time::Duration;

use cadastre_storage::{QueryLedger, QueryRecord, VerifiedQuery};
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::error::{QueryError, VerifyError};
use crate::query::{QueryRequest, ValidQuery};
use crate::shutdown::{InFlight, Shutdown, ShutdownSignal};
use crate::verifier::{Verifier, MAX_SIMULATED_DELAY};

/// Upper bound on a single verifier call unless configured otherwise.
///
/// Sits above [`MAX_SIMULATED_DELAY`] so an answer at the ceiling, plus any
/// transport round trip, still counts as on time.
pub const DEFAULT_VERIFICATION_TIMEOUT: Duration =
    Duration::from_secs(MAX_SIMULATED_DELAY.as_secs() + 5);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub verification_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            verification_timeout: DEFAULT_VERIFICATION_TIMEOUT,
        }
    }
}

/// Couples a [`Verifier`] with a [`QueryLedger`].
pub struct Orchestrator {
    verifier: Arc<dyn Verifier>,
    ledger: Arc<dyn QueryLedger>,
    config: OrchestratorConfig,
    shutdown: Shutdown,
    in_flight: Arc<InFlight>,
}

impl Orchestrator {
    pub fn new(
        verifier: Arc<dyn Verifier>,
        ledger: Arc<dyn QueryLedger>,
        config: OrchestratorConfig,
    ) -> Self {
        Orchestrator {
            verifier,
            ledger,
            config,
            shutdown: Shutdown::new(),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn QueryLedger> {
        &self.ledger
    }

    /// Number of queries currently between validation and their final outcome.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Validate `request`, obtain a verdict and record it.
    ///
    /// On success the returned record is already in the ledger. Invalid
    /// input, timeouts and aborts leave the ledger untouched. A ledger
    /// failure after a verdict is returned as [`QueryError::Persistence`]
    /// carrying that verdict.
    pub async fn submit(&self, request: QueryRequest) -> Result<QueryRecord, QueryError> {
        let query = request.validate().map_err(|e| {
            tracing::debug!(error = %e, "query rejected");
            QueryError::Invalid(e)
        })?;

        if self.shutdown.is_triggered() {
            tracing::debug!(cadastral_number = query.cadastral_number(), "query refused during shutdown");
            return Err(VerifyError::Aborted.into());
        }

        let requested_at = OffsetDateTime::now_utc();
        let started = Instant::now();
        let guard = self.in_flight.enter();
        let task = VerificationTask {
            verifier: Arc::clone(&self.verifier),
            ledger: Arc::clone(&self.ledger),
            limit: self.config.verification_timeout,
            signal: self.shutdown.signal(),
            requested_at,
            started,
        };

        let handle = tokio::spawn(async move {
            let _guard = guard;
            task.run(query).await
        });

        handle
            .await
            .map_err(|e| QueryError::Task(e.to_string()))?
    }

    /// Stop accepting queries and abort those awaiting a verdict.
    pub fn begin_shutdown(&self) {
        if !self.shutdown.is_triggered() {
            tracing::info!(in_flight = self.in_flight(), "orchestrator shutting down");
        }
        self.shutdown.trigger();
    }

    /// Fires once `begin_shutdown` has been called.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Wait until every spawned query task has finished.
    pub async fn drain(&self) {
        self.in_flight.wait_idle().await;
    }

    /// `begin_shutdown`, `drain`, then release the ledger.
    pub async fn shutdown(&self) {
        self.begin_shutdown();
        self.drain().await;
        self.ledger.close().await;
        tracing::info!("orchestrator stopped");
    }
}

struct VerificationTask {
    verifier: Arc<dyn Verifier>,
    ledger: Arc<dyn QueryLedger>,
    limit: Duration,
    signal: ShutdownSignal,
    requested_at: OffsetDateTime,
    started: Instant,
}

impl VerificationTask {
    async fn run(mut self, query: ValidQuery) -> Result<QueryRecord, QueryError> {
        let outcome = tokio::select! {
            biased;
            _ = self.signal.recv() => Err(VerifyError::Aborted),
            result = tokio::time::timeout(self.limit, self.verifier.verify(&query)) => {
                result.unwrap_or(Err(VerifyError::Timeout { limit: self.limit }))
            }
        };

        let verdict = outcome.map_err(|e| {
            tracing::warn!(
                cadastral_number = query.cadastral_number(),
                verifier = self.verifier.verifier_id(),
                error = %e,
                "verification failed"
            );
            e
        })?;

        let verified = VerifiedQuery {
            cadastral_number: query.cadastral_number().to_string(),
            latitude: query.latitude(),
            longitude: query.longitude(),
            verdict,
            requested_at: self.requested_at,
            resolved_at: self.requested_at + self.started.elapsed(),
        };

        match self.ledger.append(verified.clone()).await {
            Ok(record) => {
                tracing::info!(
                    id = record.id,
                    cadastral_number = %record.cadastral_number,
                    verdict = record.verdict,
                    latency_ms = record.latency().as_millis() as u64,
                    "query verified"
                );
                Ok(record)
            }
            Err(source) => {
                tracing::error!(
                    cadastral_number = %verified.cadastral_number,
                    verdict = verified.verdict,
                    error = %source,
                    "verdict not recorded"
                );
                Err(QueryError::Persistence {
                    query: verified,
                    source,
                })
            }
        }
    }
}
