//! Application state.

use std::sync::Arc;

use cadastre_storage::QueryLedger;
use cadastre_verify::{Orchestrator, SimulatedAuthority};

/// Application state shared across request handlers.
pub(crate) struct AppState {
    /// Validates, verifies and records `/query` submissions.
    pub(crate) orchestrator: Orchestrator,
    /// The authority answering `/result`.
    pub(crate) authority: Arc<SimulatedAuthority>,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}

impl AppState {
    pub(crate) fn ledger(&self) -> &Arc<dyn QueryLedger> {
        self.orchestrator.ledger()
    }
}
