//! Typed error hierarchy for the cockpit core.
//!
//! Two top-level enums cover the two subsystems:
//! - `WorkflowError` — workflow lock transition and gating failures
//! - `StoreError` — persisted key-value store failures
//!
//! Engine client and CLI command failures use `anyhow` with context, the
//! same split the rest of the crate follows: typed errors where callers
//! match on variants, `anyhow` where they only report.

use thiserror::Error;

use crate::workflow::lock::{LockStatus, RequestKind};

/// Errors from the workflow lock subsystem.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Transition from '{from}' to '{to}' is not allowed")]
    TransitionNotAllowed { from: LockStatus, to: LockStatus },

    #[error("New plan refused: {reason}")]
    PlanRefused { reason: String },

    #[error("A {kind} request ({request_id}) is still outstanding")]
    PendingOutstanding {
        kind: RequestKind,
        request_id: String,
    },

    #[error("A chat exchange is already in flight")]
    ChatBusy,

    #[error("Chat is blocked: plan generation in progress")]
    ChatBlocked,

    #[error("Progress updates require a non-idle lock")]
    NotLocked,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the persisted key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read key '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write key '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove key '{key}': {source}")]
    Remove {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Record under key '{key}' is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_error_transition_carries_states() {
        let err = WorkflowError::TransitionNotAllowed {
            from: LockStatus::Reviewing,
            to: LockStatus::Planning,
        };
        match &err {
            WorkflowError::TransitionNotAllowed { from, to } => {
                assert_eq!(*from, LockStatus::Reviewing);
                assert_eq!(*to, LockStatus::Planning);
            }
            _ => panic!("Expected TransitionNotAllowed"),
        }
        assert!(err.to_string().contains("reviewing"));
        assert!(err.to_string().contains("planning"));
    }

    #[test]
    fn workflow_error_plan_refused_carries_reason() {
        let err = WorkflowError::PlanRefused {
            reason: "a task is currently executing".to_string(),
        };
        assert!(err.to_string().contains("a task is currently executing"));
    }

    #[test]
    fn workflow_error_converts_from_store_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let store_err = StoreError::Write {
            key: "cockpit:demo:lock".to_string(),
            source: io_err,
        };
        let err: WorkflowError = store_err.into();
        assert!(matches!(err, WorkflowError::Store(StoreError::Write { .. })));
    }

    #[test]
    fn store_error_corrupt_names_the_key() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = StoreError::Corrupt {
            key: "cockpit:demo:pending".to_string(),
            source,
        };
        assert!(err.to_string().contains("cockpit:demo:pending"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WorkflowError::ChatBusy);
        assert_std_error(&StoreError::Read {
            key: "k".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        });
    }
}
