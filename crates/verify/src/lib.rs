//! Cadastral query verification pipeline.
//!
//! A [`QueryRequest`] is validated into a [`ValidQuery`], handed to a
//! [`Verifier`] (the slow external authority, simulated), and the verdict is
//! written to a [`QueryLedger`](cadastre_storage::QueryLedger) by the
//! [`Orchestrator`].
//!
//! The verifier call is the only suspension point that can take long: up to
//! the configured verification timeout (60 seconds by default).

pub mod error;
pub mod orchestrator;
pub mod query;
pub mod shutdown;
pub mod verifier;

pub use error::{QueryError, VerifyError};
pub use orchestrator::{Orchestrator, OrchestratorConfig, DEFAULT_VERIFICATION_TIMEOUT};
pub use query::{validate_cadastral_number, InvalidQuery, QueryRequest, ValidQuery};
pub use shutdown::{Shutdown, ShutdownSignal};
#[cfg(feature = "http")]
pub use verifier::http::HttpVerifier;
pub use verifier::{
    FixedVerifier, SimulatedAuthority, SimulationProfile, Verifier, MAX_SIMULATED_DELAY,
};
