//! Specialist worker port
//!
//! One implementation per [`AgentRole`]: an opaque capability that maps
//! (descriptors, accumulated context) to a finding. The engine never
//! looks inside; it only enforces timeouts and output validation.

use async_trait::async_trait;
use terra_domain::{AgentRole, Finding, TaskInput};
use thiserror::Error;

/// Errors a specialist worker may report for one attempt.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The capability is temporarily unavailable (model overloaded,
    /// transport down); worth retrying
    #[error("worker unavailable: {0}")]
    Unavailable(String),

    /// The analysis itself failed
    #[error("analysis failed: {0}")]
    Failed(String),
}

/// One specialist analysis capability.
///
/// Implementations must respond, or be abortable by dropping the
/// future, within the role's configured timeout; the executor enforces
/// the deadline either way.
#[async_trait]
pub trait SpecialistWorker: Send + Sync {
    /// The role this worker fills.
    fn role(&self) -> AgentRole;

    /// Analyze one input snapshot and produce a finding.
    async fn analyze(&self, input: &TaskInput) -> Result<Finding, WorkerError>;
}
