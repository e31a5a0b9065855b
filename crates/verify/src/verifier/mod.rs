//! Verification authority abstraction.
//!
//! A [`Verifier`] answers one question: is this cadastral query approved?
//! Implementations:
//! - [`SimulatedAuthority`]: in-process stand-in for the external registry,
//!   random delay and random verdict
//! - [`http::HttpVerifier`]: calls a `/result` endpoint over HTTP
//! - [`FixedVerifier`]: fixed delay and outcome, for tests

mod fixed;
#[cfg(feature = "http")]
pub mod http;
mod simulated;

use async_trait::async_trait;

use crate::error::VerifyError;
use crate::query::ValidQuery;

pub use fixed::FixedVerifier;
pub use simulated::{SimulatedAuthority, SimulationProfile, MAX_SIMULATED_DELAY};

/// Obtains a verdict for ONE query from ONE authority.
///
/// A call may suspend for a long time. Callers bound it with their own
/// timeout; implementations need not.
#[async_trait]
pub trait Verifier: Send + Sync + 'static {
    /// Ask the authority for a verdict.
    async fn verify(&self, query: &ValidQuery) -> Result<bool, VerifyError>;

    /// Returns this verifier's identifier (e.g. "simulated", "http").
    fn verifier_id(&self) -> &str;
}
