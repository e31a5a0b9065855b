use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::Verifier;
use crate::error::VerifyError;
use crate::query::ValidQuery;

/// A verifier with a fixed delay and a fixed outcome.
///
/// Counts its calls so tests can assert whether the authority was consulted.
pub struct FixedVerifier {
    delay: Duration,
    outcome: Result<bool, VerifyError>,
    calls: AtomicUsize,
}

impl FixedVerifier {
    pub fn new(delay: Duration, verdict: bool) -> Self {
        FixedVerifier {
            delay,
            outcome: Ok(verdict),
            calls: AtomicUsize::new(0),
        }
    }

    /// A verifier that fails with `error` after `delay`.
    pub fn failing(delay: Duration, error: VerifyError) -> Self {
        FixedVerifier {
            delay,
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for FixedVerifier {
    async fn verify(&self, _query: &ValidQuery) -> Result<bool, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.outcome.clone()
    }

    fn verifier_id(&self) -> &str {
        "fixed"
    }
}
