//! Result persistence port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use terra_domain::{ConsensusResult, FailureReport, RequestId};
use thiserror::Error;

/// Terminal outcome of a request, as persisted for later retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisOutcome {
    /// The request completed with a consensus
    Completed(ConsensusResult),
    /// The request failed or was cancelled; the report carries the
    /// reason code and partial findings
    Failed(FailureReport),
}

impl AnalysisOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(_))
    }
}

/// Persistence backend failure.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Durable key-value store for terminal outcomes, keyed by request id.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, id: &RequestId, outcome: &AnalysisOutcome) -> Result<(), StoreError>;

    async fn load(&self, id: &RequestId) -> Result<Option<AnalysisOutcome>, StoreError>;
}
