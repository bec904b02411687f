//! Progress events
//!
//! Transient notifications pushed to live subscribers while a request
//! runs. Delivery is best-effort with no durability: a subscriber that
//! connects late must fall back to the status/result reads for the
//! authoritative state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{RequestId, RequestState};
use crate::role::AgentRole;
use crate::stage::Stage;
use crate::task::TaskState;

/// One progress notification for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The request this event belongs to
    pub request_id: RequestId,
    /// Stage or lifecycle label (e.g. "analysis", "completed")
    pub stage: String,
    /// Completion estimate in [0, 1]
    pub percent: f64,
    /// Human-readable message
    pub message: String,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    fn new(request_id: RequestId, stage: impl Into<String>, percent: f64, message: String) -> Self {
        Self {
            request_id,
            stage: stage.into(),
            percent: percent.clamp(0.0, 1.0),
            message,
            timestamp: Utc::now(),
        }
    }

    /// Emitted when a stage begins executing.
    pub fn stage_entered(request_id: RequestId, stage: Stage, state: RequestState) -> Self {
        Self::new(
            request_id,
            stage.as_str(),
            state.percent(),
            format!("stage {} ({}) started", stage.number(), stage),
        )
    }

    /// Emitted when a stage closes, with its quorum outcome.
    pub fn stage_closed(
        request_id: RequestId,
        stage: Stage,
        state: RequestState,
        quorum_met: bool,
        degraded: bool,
    ) -> Self {
        let outcome = if !quorum_met {
            "quorum not met"
        } else if degraded {
            "quorum met, degraded"
        } else {
            "all tasks succeeded"
        };
        Self::new(
            request_id,
            stage.as_str(),
            state.percent(),
            format!("stage {} ({}) closed: {}", stage.number(), stage, outcome),
        )
    }

    /// Emitted on every task terminal transition.
    pub fn task_finished(
        request_id: RequestId,
        stage: Stage,
        role: AgentRole,
        state: TaskState,
        request_state: RequestState,
    ) -> Self {
        Self::new(
            request_id,
            stage.as_str(),
            request_state.percent(),
            format!("task {} {}", role, state),
        )
    }

    /// Emitted at lifecycle milestones outside any stage (submission,
    /// consensus computation).
    pub fn milestone(request_id: RequestId, state: RequestState, message: impl Into<String>) -> Self {
        Self::new(request_id, state.as_str(), state.percent(), message.into())
    }

    /// Emitted exactly once when the request reaches a terminal state.
    pub fn terminal(request_id: RequestId, state: RequestState, message: impl Into<String>) -> Self {
        Self::new(request_id, state.as_str(), 1.0, message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_events_carry_state_percent() {
        let id = RequestId::new("req-1");
        let event = ProgressEvent::stage_entered(id.clone(), Stage::Analysis, RequestState::Analyzing);
        assert_eq!(event.percent, 0.3);
        assert_eq!(event.stage, "analysis");
        assert!(event.message.contains("stage 1"));
    }

    #[test]
    fn test_stage_closed_reports_quorum_outcome() {
        let id = RequestId::new("req-1");
        let ok = ProgressEvent::stage_closed(id.clone(), Stage::Analysis, RequestState::Analyzing, true, false);
        assert!(ok.message.contains("all tasks succeeded"));

        let degraded =
            ProgressEvent::stage_closed(id.clone(), Stage::Analysis, RequestState::Analyzing, true, true);
        assert!(degraded.message.contains("degraded"));

        let failed =
            ProgressEvent::stage_closed(id, Stage::Analysis, RequestState::Analyzing, false, false);
        assert!(failed.message.contains("quorum not met"));
    }

    #[test]
    fn test_terminal_event_is_complete() {
        let event = ProgressEvent::terminal(RequestId::new("req-1"), RequestState::Completed, "done");
        assert_eq!(event.percent, 1.0);
        assert_eq!(event.stage, "completed");
    }
}
