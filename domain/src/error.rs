//! Engine error taxonomy
//!
//! Per-attempt and per-task errors are absorbed and recorded inside the
//! owning request; only request-level failures cross the orchestrator
//! boundary, always paired with whatever partial evidence was gathered.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::finding::Finding;
use crate::stage::Stage;

/// Illegal state-machine transition (task or request).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("task {task}: illegal transition {from} -> {to}")]
    Task {
        task: String,
        from: String,
        to: String,
    },

    #[error("request {request}: illegal transition {from} -> {to}")]
    Request {
        request: String,
        from: String,
        to: String,
    },
}

/// How an external-service failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceFailure {
    /// Transient; the gateway may retry
    Transient,
    /// The source's circuit breaker is open; fail fast
    CircuitOpen,
}

/// Errors raised by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed submission; rejected synchronously, nothing created
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A specialist attempt exceeded its configured timeout
    #[error("agent {role} timed out on attempt {attempt}")]
    AgentTimeout { role: String, attempt: u32 },

    /// A specialist returned output that failed schema validation
    #[error("agent {role} produced invalid output: {reason}")]
    AgentOutputInvalid { role: String, reason: String },

    /// An external source failed behind the gateway
    #[error("external service {service} failed ({kind:?})")]
    ExternalService {
        service: String,
        kind: ServiceFailure,
    },

    /// A stage could not meet its minimum success fraction
    #[error("quorum not met in stage {stage}: {done}/{needed} tasks succeeded")]
    QuorumNotMet {
        stage: Stage,
        done: usize,
        needed: usize,
    },

    /// No cluster reached the minimum viable weight
    #[error("aggregation conflict: {0}")]
    AggregationConflict(String),

    /// The request has not reached a terminal state yet
    #[error("result not ready")]
    NotReady,

    /// No request with that id exists
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// The request was cancelled
    #[error("request cancelled")]
    Cancelled,

    /// Persistence failed
    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl EngineError {
    /// Stable machine-readable code, recorded in failure reports.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::AgentTimeout { .. } => "agent_timeout",
            EngineError::AgentOutputInvalid { .. } => "agent_output_invalid",
            EngineError::ExternalService { .. } => "external_service",
            EngineError::QuorumNotMet { .. } => "quorum_not_met",
            EngineError::AggregationConflict(_) => "aggregation_conflict",
            EngineError::NotReady => "not_ready",
            EngineError::UnknownRequest(_) => "unknown_request",
            EngineError::Cancelled => "cancelled",
            EngineError::Storage(_) => "storage",
            EngineError::Transition(_) => "illegal_transition",
        }
    }

    /// Whether this failure ends the whole request (as opposed to a
    /// single attempt or task).
    pub fn is_request_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidInput(_)
                | EngineError::QuorumNotMet { .. }
                | EngineError::AggregationConflict(_)
                | EngineError::Cancelled
        )
    }
}

/// Structured failure record returned by `result()` for FAILED requests.
///
/// Never an opaque throw: the reason code and the partial findings
/// gathered before the failure make the outcome diagnosable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Machine-readable reason code (see [`EngineError::code`])
    pub code: String,
    /// Human-readable failure message
    pub message: String,
    /// Findings collected before the request failed
    pub partial_findings: Vec<Finding>,
    /// Stage narratives accumulated up to the failure
    pub reasoning: Vec<String>,
}

impl FailureReport {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            partial_findings: Vec::new(),
            reasoning: Vec::new(),
        }
    }

    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.partial_findings = findings;
        self
    }

    pub fn with_reasoning(mut self, reasoning: Vec<String>) -> Self {
        self.reasoning = reasoning;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(EngineError::NotReady.code(), "not_ready");
        assert_eq!(
            EngineError::QuorumNotMet {
                stage: Stage::Validation,
                done: 0,
                needed: 1
            }
            .code(),
            "quorum_not_met"
        );
        assert_eq!(EngineError::Cancelled.code(), "cancelled");
    }

    #[test]
    fn test_request_fatal_classification() {
        assert!(EngineError::InvalidInput("no image".into()).is_request_fatal());
        assert!(
            EngineError::AggregationConflict("no viable cluster".into()).is_request_fatal()
        );
        assert!(
            !EngineError::AgentTimeout {
                role: "visual".into(),
                attempt: 1
            }
            .is_request_fatal()
        );
        assert!(
            !EngineError::ExternalService {
                service: "geo-db".into(),
                kind: ServiceFailure::CircuitOpen
            }
            .is_request_fatal()
        );
    }

    #[test]
    fn test_quorum_error_display() {
        let e = EngineError::QuorumNotMet {
            stage: Stage::Analysis,
            done: 1,
            needed: 3,
        };
        assert_eq!(
            e.to_string(),
            "quorum not met in stage analysis: 1/3 tasks succeeded"
        );
    }

    #[test]
    fn test_failure_report_round_trip() {
        let report = FailureReport::from_error(&EngineError::Cancelled)
            .with_reasoning(vec!["stage 1 (analysis): 2/4 succeeded".into()]);
        let json = serde_json::to_string(&report).unwrap();
        let back: FailureReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, "cancelled");
        assert_eq!(back, report);
    }
}
