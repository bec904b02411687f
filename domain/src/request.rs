//! Analysis requests
//!
//! An [`AnalysisRequest`] is the unit of work callers submit: one
//! descriptor set plus metadata, driven through the stage DAG to a
//! terminal state. Request state is owned exclusively by the driver
//! that executes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::TransitionError;

/// Unique identifier for an analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a RequestId from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique id from the clock and a process-wide
    /// counter.
    pub fn generate() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

        Self(format!(
            "req-{:x}-{:04x}-{:04x}",
            now.as_secs(),
            (now.subsec_nanos() >> 16) as u16,
            (seq & 0xffff) as u16
        ))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T: Into<String>> From<T> for RequestId {
    fn from(s: T) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structured feature descriptors extracted from an image by the
/// (external) vision pipeline.
///
/// The engine never looks inside the fields beyond validating that the
/// reference is present; they are payload for the specialists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSet {
    /// Opaque reference to the source image (storage key, path, ...)
    pub image_ref: String,
    /// Free-text description of the scene, when available
    pub description: Option<String>,
    /// Extracted feature tags (e.g. "architecture" → "baroque")
    pub features: HashMap<String, String>,
    /// Pixel dimensions, when known
    pub width: Option<u32>,
    /// Pixel dimensions, when known
    pub height: Option<u32>,
}

impl DescriptorSet {
    pub fn new(image_ref: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
            ..Self::default()
        }
    }

    /// A descriptor set is well-formed when it references an image.
    pub fn is_well_formed(&self) -> bool {
        !self.image_ref.trim().is_empty()
    }
}

/// Request lifecycle. The stage states advance strictly in order;
/// `Cancelled` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Submitted,
    Analyzing,
    Validating,
    Researching,
    Aggregating,
    Completed,
    Failed,
    Cancelled,
}

impl RequestState {
    /// Whether the request has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::Cancelled
        )
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RequestState::Cancelled || next == RequestState::Failed {
            return true;
        }
        matches!(
            (self, next),
            (RequestState::Submitted, RequestState::Analyzing)
                | (RequestState::Analyzing, RequestState::Validating)
                | (RequestState::Validating, RequestState::Researching)
                | (RequestState::Researching, RequestState::Aggregating)
                | (RequestState::Aggregating, RequestState::Completed)
        )
    }

    /// Rough completion estimate for progress reporting, in [0, 1].
    pub fn percent(&self) -> f64 {
        match self {
            RequestState::Submitted => 0.1,
            RequestState::Analyzing => 0.3,
            RequestState::Validating => 0.6,
            RequestState::Researching => 0.75,
            RequestState::Aggregating => 0.9,
            RequestState::Completed | RequestState::Failed | RequestState::Cancelled => 1.0,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Submitted => "submitted",
            RequestState::Analyzing => "analyzing",
            RequestState::Validating => "validating",
            RequestState::Researching => "researching",
            RequestState::Aggregating => "aggregating",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
            RequestState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One submitted analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Request id
    pub id: RequestId,
    /// The descriptor set under analysis
    pub descriptor: DescriptorSet,
    /// Who submitted the request
    pub requester: String,
    /// Arbitrary caller metadata, passed through to specialists
    pub metadata: HashMap<String, String>,
    /// Current lifecycle state
    pub state: RequestState,
    /// Submission time
    pub created_at: DateTime<Utc>,
}

impl AnalysisRequest {
    /// Create a freshly submitted request.
    pub fn new(
        descriptor: DescriptorSet,
        requester: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            descriptor,
            requester: requester.into(),
            metadata,
            state: RequestState::Submitted,
            created_at: Utc::now(),
        }
    }

    /// Advance to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: RequestState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::Request {
                request: self.id.to_string(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(DescriptorSet::new("s3://images/1.jpg"), "user-1", HashMap::new())
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("req-"));
    }

    #[test]
    fn test_descriptor_well_formed() {
        assert!(DescriptorSet::new("key").is_well_formed());
        assert!(!DescriptorSet::new("  ").is_well_formed());
        assert!(!DescriptorSet::default().is_well_formed());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut r = request();
        for next in [
            RequestState::Analyzing,
            RequestState::Validating,
            RequestState::Researching,
            RequestState::Aggregating,
            RequestState::Completed,
        ] {
            r.transition(next).unwrap();
        }
        assert!(r.state.is_terminal());
    }

    #[test]
    fn test_stage_skipping_rejected() {
        let mut r = request();
        assert!(r.transition(RequestState::Validating).is_err());
        assert!(r.transition(RequestState::Completed).is_err());
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        let mut r = request();
        r.transition(RequestState::Analyzing).unwrap();
        r.transition(RequestState::Cancelled).unwrap();
        assert_eq!(r.state, RequestState::Cancelled);

        // Terminal states stay put
        assert!(r.transition(RequestState::Failed).is_err());
        assert!(r.transition(RequestState::Cancelled).is_err());
    }

    #[test]
    fn test_fail_from_any_non_terminal() {
        let mut r = request();
        r.transition(RequestState::Analyzing).unwrap();
        r.transition(RequestState::Validating).unwrap();
        r.transition(RequestState::Failed).unwrap();
        assert!(r.state.is_terminal());
    }

    #[test]
    fn test_percent_is_monotonic_over_lifecycle() {
        let states = [
            RequestState::Submitted,
            RequestState::Analyzing,
            RequestState::Validating,
            RequestState::Researching,
            RequestState::Aggregating,
            RequestState::Completed,
        ];
        for pair in states.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
    }
}
