//! Agent execution
//!
//! [`AgentExecutor`] invokes exactly one specialist worker for one task
//! attempt: it enforces the role's hard timeout, honors the request's
//! cancellation token and validates the worker's output before anything
//! downstream sees it. The orchestrator awaits each attempt before
//! starting the next, so at most one attempt per task is ever in
//! flight.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ports::specialist::{SpecialistWorker, WorkerError};
use terra_domain::{AgentRole, Coordinate, Finding, LocationHypothesis, RolePolicy, TaskInput};

/// Failure of a single execution attempt. Absorbed by the retry loop;
/// never propagates past the orchestrator.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The attempt exceeded the role's hard timeout
    #[error("attempt {attempt} for {role} timed out after {timeout_ms}ms")]
    Timeout {
        role: AgentRole,
        attempt: u32,
        timeout_ms: u64,
    },

    /// The worker reported a failure
    #[error("worker for {role} failed: {source}")]
    Worker {
        role: AgentRole,
        #[source]
        source: WorkerError,
    },

    /// The worker responded with output that fails schema validation
    #[error("invalid output from {role}: {reason}")]
    InvalidOutput { role: AgentRole, reason: String },

    /// The owning request was cancelled mid-attempt
    #[error("attempt cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Cancellation is final; everything else is retryable up to the
    /// role's attempt budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecutionError::Cancelled)
    }
}

/// Uniform adapter invoking one specialist worker.
pub struct AgentExecutor {
    worker: Arc<dyn SpecialistWorker>,
    policy: RolePolicy,
}

impl AgentExecutor {
    pub fn new(worker: Arc<dyn SpecialistWorker>, policy: RolePolicy) -> Self {
        Self { worker, policy }
    }

    /// Run one attempt to completion, timeout or cancellation.
    ///
    /// A cancelled attempt abandons the in-flight worker call; if the
    /// worker cannot abort, its eventual result is simply dropped with
    /// the future.
    pub async fn execute(
        &self,
        input: &TaskInput,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<Finding, ExecutionError> {
        let role = self.worker.role();
        debug!(role = %role, attempt, "executing specialist attempt");

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
            outcome = tokio::time::timeout(self.policy.timeout(), self.worker.analyze(input)) => outcome,
        };

        let finding = match outcome {
            Err(_elapsed) => {
                return Err(ExecutionError::Timeout {
                    role,
                    attempt,
                    timeout_ms: self.policy.timeout_ms,
                });
            }
            Ok(Err(source)) => return Err(ExecutionError::Worker { role, source }),
            Ok(Ok(finding)) => finding,
        };

        validate_finding(role, &finding)
            .map_err(|reason| ExecutionError::InvalidOutput { role, reason })?;

        Ok(finding)
    }
}

/// Output schema validation: confidence in range, hypothesis
/// syntactically valid, role matching the task's role.
fn validate_finding(expected_role: AgentRole, finding: &Finding) -> Result<(), String> {
    if finding.role != expected_role {
        return Err(format!(
            "finding attributed to {}, expected {}",
            finding.role, expected_role
        ));
    }
    if !finding.confidence.is_finite() || !(0.0..=1.0).contains(&finding.confidence) {
        return Err(format!("confidence {} outside [0, 1]", finding.confidence));
    }
    match &finding.hypothesis {
        LocationHypothesis::Point(c) => {
            // Re-validate: deserialized coordinates bypass the constructor
            Coordinate::new(c.latitude, c.longitude)
                .map_err(|e| e.to_string())
                .map(|_| ())
        }
        LocationHypothesis::Area(region) => {
            if region.is_empty() {
                Err("empty region hypothesis".to_string())
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use terra_domain::DescriptorSet;

    struct ScriptedWorker {
        role: AgentRole,
        delay: Duration,
        result: Result<Finding, String>,
    }

    #[async_trait]
    impl SpecialistWorker for ScriptedWorker {
        fn role(&self) -> AgentRole {
            self.role
        }

        async fn analyze(&self, _input: &TaskInput) -> Result<Finding, WorkerError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone().map_err(WorkerError::Failed)
        }
    }

    fn input() -> TaskInput {
        TaskInput::new(DescriptorSet::new("img"), HashMap::new())
    }

    fn policy(timeout_ms: u64) -> RolePolicy {
        RolePolicy {
            timeout_ms,
            ..RolePolicy::default()
        }
    }

    fn finding(role: AgentRole) -> Finding {
        Finding::new(
            role,
            LocationHypothesis::Point(Coordinate::new(10.0, 20.0).unwrap()),
            0.8,
            "test",
        )
    }

    #[tokio::test]
    async fn test_successful_attempt() {
        let executor = AgentExecutor::new(
            Arc::new(ScriptedWorker {
                role: AgentRole::Visual,
                delay: Duration::ZERO,
                result: Ok(finding(AgentRole::Visual)),
            }),
            policy(1_000),
        );

        let found = executor
            .execute(&input(), 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.role, AgentRole::Visual);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_enforced() {
        let executor = AgentExecutor::new(
            Arc::new(ScriptedWorker {
                role: AgentRole::Visual,
                delay: Duration::from_secs(60),
                result: Ok(finding(AgentRole::Visual)),
            }),
            policy(100),
        );

        let err = executor
            .execute(&input(), 2, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { attempt: 2, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wins_over_slow_worker() {
        let executor = AgentExecutor::new(
            Arc::new(ScriptedWorker {
                role: AgentRole::Visual,
                delay: Duration::from_secs(60),
                result: Ok(finding(AgentRole::Visual)),
            }),
            policy(120_000),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor.execute(&input(), 1, &cancel).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_role_mismatch_rejected() {
        let executor = AgentExecutor::new(
            Arc::new(ScriptedWorker {
                role: AgentRole::Visual,
                delay: Duration::ZERO,
                result: Ok(finding(AgentRole::Cultural)),
            }),
            policy(1_000),
        );

        let err = executor
            .execute(&input(), 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_coordinate_rejected() {
        let mut bad = finding(AgentRole::Visual);
        bad.hypothesis = LocationHypothesis::Point(Coordinate {
            latitude: 123.0,
            longitude: 0.0,
        });
        let executor = AgentExecutor::new(
            Arc::new(ScriptedWorker {
                role: AgentRole::Visual,
                delay: Duration::ZERO,
                result: Ok(bad),
            }),
            policy(1_000),
        );

        let err = executor
            .execute(&input(), 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_worker_failure_is_retryable() {
        let executor = AgentExecutor::new(
            Arc::new(ScriptedWorker {
                role: AgentRole::Research,
                delay: Duration::ZERO,
                result: Err("model overloaded".to_string()),
            }),
            policy(1_000),
        );

        let err = executor
            .execute(&input(), 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Worker { .. }));
        assert!(err.is_retryable());
    }
}
