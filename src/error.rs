//! Crate-level error taxonomy.
//!
//! Candidate-code failures (timeout, non-zero exit) are *not* errors — they
//! are [`crate::sandbox::ExecDiagnostic`] values on a normal
//! [`crate::sandbox::ExecutionResult`], because the executed code is
//! adversarial by construction and its failure is an expected cycle outcome.
//! This enum covers the failures of the oracle's own machinery.

use thiserror::Error;

/// All errors surfaced by the oracle runtime.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The isolated execution context could not be created at all
    /// (workspace allocation, interpreter spawn). Reported, never swallowed.
    #[error("sandbox setup failed: {0}")]
    SandboxSetup(String),

    /// The scoring function produced a non-finite value for the given inputs.
    #[error("fitness evaluation failed: {0}")]
    Evaluator(String),

    /// A ledger operation failed. When this happens during a cycle's persist
    /// step the cycle outcome is still returned, flagged unpersisted.
    #[error("ledger operation failed: {0}")]
    Ledger(#[from] rusqlite::Error),

    /// The publication collaborator replied with a non-2xx status.
    /// Carries the response body for operator diagnosis.
    #[error("publication rejected: HTTP {status}: {body}")]
    Publication { status: u16, body: String },

    /// The publication collaborator could not be reached at all.
    #[error("publication transport failed: {0}")]
    PublicationTransport(String),

    /// The generative backend call failed or timed out. Degrades to the
    /// fallback proposal at the proposal-source boundary; callers above
    /// that boundary never see this variant during a cycle.
    #[error("generative backend failed: {0}")]
    GenerativeBackend(String),

    /// A trigger arrived while a cycle was already in flight.
    #[error("an evolution cycle is already in flight")]
    CycleBusy,

    /// Startup configuration was present but unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OracleError {
    /// True for the fail-fast "busy" signal, which the trigger surface maps
    /// to a retryable status rather than a failure.
    pub fn is_busy(&self) -> bool {
        matches!(self, OracleError::CycleBusy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publication_error_display_carries_status_and_body() {
        let err = OracleError::Publication {
            status: 422,
            body: "Validation Failed".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("422"), "status in display: {s}");
        assert!(s.contains("Validation Failed"), "body in display: {s}");
    }

    #[test]
    fn test_cycle_busy_is_busy() {
        assert!(OracleError::CycleBusy.is_busy());
        assert!(!OracleError::SandboxSetup("x".into()).is_busy());
    }

    #[test]
    fn test_ledger_error_from_rusqlite() {
        let inner = rusqlite::Error::InvalidQuery;
        let err: OracleError = inner.into();
        assert!(matches!(err, OracleError::Ledger(_)));
    }

    #[test]
    fn test_errors_are_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&OracleError::CycleBusy);
        assert_error(&OracleError::Config("bad".into()));
    }
}
