//! Agent tasks
//!
//! One [`AgentTask`] is one unit of specialist work inside a request.
//! Task state only moves forward; a retry produces a new attempt on the
//! same task, never a new task id.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::finding::Finding;
use crate::request::{DescriptorSet, RequestId};
use crate::role::AgentRole;
use crate::stage::{Stage, StageSummary};
use std::collections::HashMap;

/// Task identifier, unique within its request (`"<stage>-<role>"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The canonical id for a role's task in a stage.
    pub fn for_role(stage: Stage, role: AgentRole) -> Self {
        Self(format!("{}-{}", stage.number(), role))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T: Into<String>> From<T> for TaskId {
    fn from(s: T) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a task. Transitions are forward-only:
/// `Pending → Running → Done | Failed`, with `Skipped` reachable only
/// from `Pending` (the stage closed before the task ever ran).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

impl TaskState {
    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed | TaskState::Skipped)
    }

    /// Whether `next` is a legal successor of this state.
    ///
    /// `Failed → Running` is allowed: it is how a retry attempt starts.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending, TaskState::Skipped)
                | (TaskState::Running, TaskState::Done)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Failed, TaskState::Running)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Immutable input snapshot handed to a specialist for one task.
///
/// Later stages receive the closed summaries of everything that ran
/// before them; nothing a specialist does can mutate another's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    /// The extracted feature descriptors for the image under analysis
    pub descriptor: DescriptorSet,
    /// Request metadata as submitted
    pub metadata: HashMap<String, String>,
    /// Summaries of every stage closed before this task was created
    pub prior_stages: Vec<StageSummary>,
}

impl TaskInput {
    pub fn new(descriptor: DescriptorSet, metadata: HashMap<String, String>) -> Self {
        Self {
            descriptor,
            metadata,
            prior_stages: Vec::new(),
        }
    }

    /// Snapshot with the given closed summaries attached.
    pub fn with_prior_stages(mut self, summaries: Vec<StageSummary>) -> Self {
        self.prior_stages = summaries;
        self
    }

    /// All findings visible from prior stages, in stage order.
    pub fn prior_findings(&self) -> impl Iterator<Item = &Finding> {
        self.prior_stages.iter().flat_map(|s| s.findings.iter())
    }
}

/// One unit of specialist work within a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    /// Task id, stable across retries
    pub id: TaskId,
    /// Owning request
    pub request_id: RequestId,
    /// Specialist role that executes this task
    pub role: AgentRole,
    /// Stage the task belongs to
    pub stage: Stage,
    /// Tasks that must be DONE (or otherwise terminal) before this may start
    pub depends_on: Vec<TaskId>,
    /// Current lifecycle state
    pub state: TaskState,
    /// Attempts started so far
    pub attempts: u32,
    /// Immutable input snapshot
    pub input: TaskInput,
    /// The finding, once DONE
    pub output: Option<Finding>,
}

impl AgentTask {
    /// Create a pending task for a role in its stage.
    pub fn new(request_id: RequestId, role: AgentRole, input: TaskInput) -> Self {
        let stage = role.stage();
        Self {
            id: TaskId::for_role(stage, role),
            request_id,
            role,
            stage,
            depends_on: Vec::new(),
            state: TaskState::Pending,
            attempts: 0,
            input,
            output: None,
        }
    }

    /// Declare dependencies on earlier tasks.
    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Start an attempt. Legal from `Pending` (first attempt) and from
    /// `Failed` (retry); bumps the attempt counter.
    pub fn start_attempt(&mut self) -> Result<u32, TransitionError> {
        self.transition(TaskState::Running)?;
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Record a successful attempt and its finding.
    pub fn complete(&mut self, finding: Finding) -> Result<(), TransitionError> {
        self.transition(TaskState::Done)?;
        self.output = Some(finding);
        Ok(())
    }

    /// Record a failed attempt.
    pub fn fail(&mut self) -> Result<(), TransitionError> {
        self.transition(TaskState::Failed)
    }

    /// Mark a never-started task as skipped (stage closed first).
    pub fn skip(&mut self) -> Result<(), TransitionError> {
        self.transition(TaskState::Skipped)
    }

    fn transition(&mut self, next: TaskState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::Task {
                task: self.id.to_string(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}
