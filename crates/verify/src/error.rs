use std::time::Duration;

use cadastre_storage::{StorageError, VerifiedQuery};

use crate::query::InvalidQuery;

/// Failures of a single verifier call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    /// The authority did not answer within the configured limit.
    #[error("verification timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// The service is shutting down; the verification was abandoned.
    #[error("verification aborted by shutdown")]
    Aborted,

    /// The authority could not be reached or gave an unusable answer.
    #[error("verification authority unavailable: {0}")]
    Unavailable(String),
}

/// Everything `Orchestrator::submit` can fail with.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Rejected before the verifier was called; nothing was written.
    #[error("invalid query: {0}")]
    Invalid(#[from] InvalidQuery),

    /// No verdict was obtained; nothing was written.
    #[error(transparent)]
    Verification(#[from] VerifyError),

    /// A verdict was obtained but could not be written to the ledger.
    /// `query` carries the verdict so the caller still receives it.
    #[error("verdict obtained but not recorded: {source}")]
    Persistence {
        query: VerifiedQuery,
        #[source]
        source: StorageError,
    },

    /// The verification task ended without producing a result.
    #[error("verification task failed: {0}")]
    Task(String),
}

impl QueryError {
    /// The verdict, when one was obtained despite the failure.
    pub fn unrecorded_verdict(&self) -> Option<&VerifiedQuery> {
        match self {
            QueryError::Persistence { query, .. } => Some(query),
            _ => None,
        }
    }
}
