//! Saga error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the orchestrator and the definition registry.
///
/// Only configuration problems are reported through this type from
/// `SagaOrchestrator::execute`; step failures come back as a failed
/// `SagaExecutionResult` instead.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No definition is registered under the requested name.
    #[error("Saga not found: {0}")]
    SagaNotFound(String),

    /// A definition with the same name was already registered.
    #[error("Saga already registered: {0}")]
    DuplicateSaga(String),

    /// The definition is malformed (empty name, duplicate step names, ...).
    #[error("Invalid saga definition: {0}")]
    InvalidDefinition(String),

    /// State store error.
    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

/// The outcome of a failed step action.
///
/// Steps return `Result<(), StepError>` instead of unwinding, so the
/// orchestrator can branch on critical vs. best-effort failures.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    /// The step failed without saying whether the cause is transient.
    ///
    /// Retry loops give it another attempt; use [`StepError::fatal`] when a
    /// repeat cannot succeed.
    #[error("{reason}")]
    Failed { step: String, reason: String },

    /// Transient failure, another attempt may succeed.
    #[error("{reason}")]
    Retryable { step: String, reason: String },

    /// Non-recoverable failure; retry loops stop immediately.
    #[error("{reason}")]
    Fatal { step: String, reason: String },

    /// A remote collaborator returned an error.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// A context key was missing or had an unexpected type.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// The retry/timeout executor gave up.
    #[error("{0}")]
    Retry(#[from] Box<RetryError>),
}

impl StepError {
    /// Creates a plain step failure.
    pub fn failed(step: impl Into<String>, reason: impl Into<String>) -> Self {
        StepError::Failed {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Creates a transient failure.
    pub fn retryable(step: impl Into<String>, reason: impl Into<String>) -> Self {
        StepError::Retryable {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Creates a failure that must not be retried.
    pub fn fatal(step: impl Into<String>, reason: impl Into<String>) -> Self {
        StepError::Fatal {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if another attempt of the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StepError::Retryable { .. } => true,
            StepError::Failed { .. } => true,
            StepError::Service(e) => e.is_transient(),
            StepError::Fatal { .. } | StepError::Context(_) | StepError::Retry(_) => false,
        }
    }
}

impl From<RetryError> for StepError {
    fn from(err: RetryError) -> Self {
        StepError::Retry(Box::new(err))
    }
}

/// Errors produced by the retry/timeout executor.
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// Every attempt failed; carries the last underlying error.
    #[error("Operation '{operation}' failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: Box<StepError>,
    },

    /// A single attempt exceeded its deadline.
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },
}

/// Errors from a saga state store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Errors returned by remote collaborators.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service could not be reached.
    #[error("{service} service unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    /// The service rejected the request.
    #[error("{service} service rejected request: {reason}")]
    Rejected { service: &'static str, reason: String },

    /// The referenced entity does not exist.
    #[error("{service} service: {entity} not found")]
    NotFound {
        service: &'static str,
        entity: String,
    },
}

impl ServiceError {
    /// Returns true for failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Unavailable { .. })
    }
}

/// Errors reading typed values from a `SagaContext`.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// A required key is absent.
    #[error("Missing context key '{0}'")]
    MissingKey(String),

    /// The value under a key does not match the requested type.
    #[error("Invalid value for context key '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Result of a single step action.
pub type StepResult = std::result::Result<(), StepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_display_is_the_reason() {
        let err = StepError::failed("charge", "card declined");
        assert_eq!(err.to_string(), "card declined");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StepError::retryable("s", "flaky").is_retryable());
        // Unclassified failures get another attempt.
        assert!(StepError::failed("s", "boom").is_retryable());
        assert!(!StepError::fatal("s", "bad input").is_retryable());
        assert!(!StepError::from(ContextError::MissingKey("k".into())).is_retryable());

        let unavailable = ServiceError::Unavailable {
            service: "statistics",
            reason: "connection refused".into(),
        };
        assert!(StepError::from(unavailable).is_retryable());

        let rejected = ServiceError::Rejected {
            service: "statistics",
            reason: "quota".into(),
        };
        assert!(!StepError::from(rejected).is_retryable());
    }

    #[test]
    fn test_retry_exhausted_wraps_last_error() {
        let err = RetryError::Exhausted {
            operation: "ping".into(),
            attempts: 3,
            last_error: Box::new(StepError::retryable("ping", "connection reset")),
        };
        assert_eq!(
            err.to_string(),
            "Operation 'ping' failed after 3 attempt(s): connection reset"
        );
    }

    #[test]
    fn test_saga_not_found_display() {
        let err = SagaError::SagaNotFound("publish-article".into());
        assert_eq!(err.to_string(), "Saga not found: publish-article");
    }
}
