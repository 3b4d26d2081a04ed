//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The status of a saga execution in its lifecycle.
///
/// State transitions:
/// ```text
/// Started ──► Executing ──┬──► Completed
///                         ├──► Compensating ──┬──► Compensated
///                         │                   └──► Failed
///                         └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Execution record created, no step has run yet.
    #[default]
    Started,

    /// A forward step is running.
    Executing,

    /// A critical step failed and compensations are running.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Compensation walk finished after a failure (terminal state).
    Compensated,

    /// The run ended without a clean compensation walk (terminal state).
    Failed,
}

impl SagaStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SagaStatus) -> bool {
        use SagaStatus::*;
        matches!(
            (self, next),
            (Started, Executing)
                | (Started, Completed)
                | (Started, Failed)
                | (Executing, Executing)
                | (Executing, Completed)
                | (Executing, Compensating)
                | (Executing, Failed)
                | (Compensating, Compensated)
                | (Compensating, Failed)
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::Executing => "EXECUTING",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SagaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(SagaStatus::Started),
            "EXECUTING" => Ok(SagaStatus::Executing),
            "COMPENSATING" => Ok(SagaStatus::Compensating),
            "COMPLETED" => Ok(SagaStatus::Completed),
            "COMPENSATED" => Ok(SagaStatus::Compensated),
            "FAILED" => Ok(SagaStatus::Failed),
            other => Err(format!("unknown saga status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SagaStatus; 6] = [
        SagaStatus::Started,
        SagaStatus::Executing,
        SagaStatus::Compensating,
        SagaStatus::Completed,
        SagaStatus::Compensated,
        SagaStatus::Failed,
    ];

    #[test]
    fn test_default_state_is_started() {
        assert_eq!(SagaStatus::default(), SagaStatus::Started);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaStatus::Started.is_terminal());
        assert!(!SagaStatus::Executing.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
        assert!(SagaStatus::Failed.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_transitions() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_compensating_never_reenters_executing() {
        assert!(!SagaStatus::Compensating.can_transition_to(SagaStatus::Executing));
        assert!(!SagaStatus::Compensating.can_transition_to(SagaStatus::Completed));
        assert!(SagaStatus::Compensating.can_transition_to(SagaStatus::Compensated));
    }

    #[test]
    fn test_compensation_starts_only_from_executing() {
        for from in ALL {
            assert_eq!(
                from.can_transition_to(SagaStatus::Compensating),
                from == SagaStatus::Executing,
                "{from}"
            );
        }
    }

    #[test]
    fn test_display_and_parse() {
        for status in ALL {
            let parsed: SagaStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("RUNNING".parse::<SagaStatus>().is_err());
    }

    #[test]
    fn test_serialization_uses_display_names() {
        let json = serde_json::to_string(&SagaStatus::Compensated).unwrap();
        assert_eq!(json, "\"COMPENSATED\"");
    }
}
