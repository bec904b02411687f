//! Task orchestration
//!
//! [`TaskOrchestrator`] drives each analysis request from submission to
//! a terminal state: it builds the stage DAG, fans the stage's tasks
//! out over the bounded worker pool, applies the retry and quorum
//! policies, and hands the closed summaries to the consensus engine.
//!
//! Per-request state is owned by the driver task spawned at
//! submission; the registry and the worker pool are the only state
//! shared across requests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::executor::AgentExecutor;
use crate::ports::descriptor::DescriptorProvider;
use crate::ports::progress::ProgressSink;
use crate::ports::specialist::SpecialistWorker;
use crate::ports::store::{AnalysisOutcome, ResultStore};
use terra_domain::{
    AgentRole, AgentTask, AnalysisRequest, ConsensusEngine, EngineConfig, EngineError,
    FailureReport, ProgressEvent, RequestId, RequestState, ResultAggregator, Stage, StageSummary,
    TaskId, TaskInput, TaskState,
};

/// Non-blocking status snapshot of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub state: RequestState,
    pub percent: f64,
    pub last_message: String,
}

struct RequestEntry {
    state: RequestState,
    last_message: String,
    cancel: CancellationToken,
    outcome: Option<AnalysisOutcome>,
}

struct Inner {
    config: EngineConfig,
    workers: HashMap<AgentRole, Arc<dyn SpecialistWorker>>,
    descriptors: Arc<dyn DescriptorProvider>,
    store: Arc<dyn ResultStore>,
    progress: Arc<dyn ProgressSink>,
    /// Bounds concurrently in-flight specialist calls across requests
    permits: Arc<Semaphore>,
    registry: RwLock<HashMap<RequestId, RequestEntry>>,
}

/// Owns the per-request state machine and drives every component.
pub struct TaskOrchestrator {
    inner: Arc<Inner>,
}

impl TaskOrchestrator {
    /// Build an orchestrator. Requires a worker for every role and a
    /// valid configuration.
    pub fn new(
        config: EngineConfig,
        workers: Vec<Arc<dyn SpecialistWorker>>,
        descriptors: Arc<dyn DescriptorProvider>,
        store: Arc<dyn ResultStore>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidInput)?;

        let workers: HashMap<AgentRole, Arc<dyn SpecialistWorker>> =
            workers.into_iter().map(|w| (w.role(), w)).collect();
        for role in AgentRole::all() {
            if !workers.contains_key(&role) {
                return Err(EngineError::InvalidInput(format!(
                    "no worker registered for role {}",
                    role
                )));
            }
        }

        let permits = Arc::new(Semaphore::new(config.max_workers));
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                workers,
                descriptors,
                store,
                progress,
                permits,
                registry: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Submit an analysis request. Validates the input synchronously,
    /// creates the request and its stage-1 tasks, and begins execution.
    pub async fn submit(
        &self,
        image_ref: &str,
        requester: &str,
        metadata: HashMap<String, String>,
    ) -> Result<RequestId, EngineError> {
        let descriptor = self
            .inner
            .descriptors
            .resolve(image_ref)
            .await
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        if !descriptor.is_well_formed() {
            return Err(EngineError::InvalidInput(
                "descriptor has no image reference".to_string(),
            ));
        }

        let request = AnalysisRequest::new(descriptor, requester, metadata);
        let id = request.id.clone();
        let cancel = CancellationToken::new();

        {
            let mut registry = self.inner.registry.write().unwrap_or_else(|p| p.into_inner());
            registry.insert(
                id.clone(),
                RequestEntry {
                    state: RequestState::Submitted,
                    last_message: "submitted".to_string(),
                    cancel: cancel.clone(),
                    outcome: None,
                },
            );
        }

        info!(request = %id, requester, "request submitted");
        self.inner.progress.publish(ProgressEvent::milestone(
            id.clone(),
            RequestState::Submitted,
            "request submitted",
        ));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            drive(inner, request, cancel).await;
        });

        Ok(id)
    }

    /// Current status of a request. Pure read; never blocks on
    /// execution.
    pub fn status(&self, id: &RequestId) -> Result<RequestStatus, EngineError> {
        let registry = self.inner.registry.read().unwrap_or_else(|p| p.into_inner());
        let entry = registry
            .get(id)
            .ok_or_else(|| EngineError::UnknownRequest(id.to_string()))?;
        Ok(RequestStatus {
            state: entry.state,
            percent: entry.state.percent(),
            last_message: entry.last_message.clone(),
        })
    }

    /// Terminal outcome of a request.
    ///
    /// Completed requests return the consensus; failed and cancelled
    /// ones return the structured failure report. Running requests
    /// yield [`EngineError::NotReady`]. Unknown ids fall back to the
    /// persistent store before erroring.
    pub async fn result(&self, id: &RequestId) -> Result<AnalysisOutcome, EngineError> {
        {
            let registry = self.inner.registry.read().unwrap_or_else(|p| p.into_inner());
            if let Some(entry) = registry.get(id) {
                return match (&entry.outcome, entry.state.is_terminal()) {
                    (Some(outcome), _) => Ok(outcome.clone()),
                    (None, true) => Ok(AnalysisOutcome::Failed(FailureReport::from_error(
                        &EngineError::Cancelled,
                    ))),
                    (None, false) => Err(EngineError::NotReady),
                };
            }
        }

        match self.inner.store.load(id).await {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => Err(EngineError::UnknownRequest(id.to_string())),
            Err(e) => Err(EngineError::Storage(e.to_string())),
        }
    }

    /// Best-effort cancellation: marks the request CANCELLED, signals
    /// every running task and stops further scheduling. In-flight
    /// specialist calls may still finish; their results are discarded.
    pub fn cancel(&self, id: &RequestId) -> Result<(), EngineError> {
        let mut registry = self.inner.registry.write().unwrap_or_else(|p| p.into_inner());
        let entry = registry
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownRequest(id.to_string()))?;

        if entry.state.is_terminal() {
            return Ok(());
        }

        entry.state = RequestState::Cancelled;
        entry.last_message = "cancelled by caller".to_string();
        entry.outcome = Some(AnalysisOutcome::Failed(FailureReport::from_error(
            &EngineError::Cancelled,
        )));
        entry.cancel.cancel();
        drop(registry);

        info!(request = %id, "request cancelled");
        self.inner.progress.publish(ProgressEvent::terminal(
            id.clone(),
            RequestState::Cancelled,
            "cancelled by caller",
        ));
        Ok(())
    }
}

impl Inner {
    /// Update the registry snapshot for a running request. Terminal
    /// entries are never overwritten (a racing `cancel` wins).
    fn set_status(&self, id: &RequestId, state: RequestState, message: String) {
        let mut registry = self.registry.write().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = registry.get_mut(id) {
            if !entry.state.is_terminal() {
                entry.state = state;
                entry.last_message = message;
            }
        }
    }

    /// Record a terminal outcome, unless a racing cancel already did.
    fn finish(&self, id: &RequestId, state: RequestState, message: String, outcome: AnalysisOutcome) {
        {
            let mut registry = self.registry.write().unwrap_or_else(|p| p.into_inner());
            match registry.get_mut(id) {
                Some(entry) if !entry.state.is_terminal() => {
                    entry.state = state;
                    entry.last_message = message.clone();
                    entry.outcome = Some(outcome);
                }
                _ => return,
            }
        }
        self.progress
            .publish(ProgressEvent::terminal(id.clone(), state, message));
    }

    async fn fail_request(
        &self,
        request: &mut AnalysisRequest,
        error: EngineError,
        summaries: &[StageSummary],
    ) {
        warn!(request = %request.id, code = error.code(), "request failed: {}", error);

        let findings = summaries
            .iter()
            .flat_map(|s| s.findings.iter().cloned())
            .collect();
        let reasoning = summaries.iter().map(|s| s.narrative()).collect();
        let report = FailureReport::from_error(&error)
            .with_findings(findings)
            .with_reasoning(reasoning);
        let outcome = AnalysisOutcome::Failed(report);

        if let Err(e) = self.store.save(&request.id, &outcome).await {
            warn!(request = %request.id, "failed to persist failure report: {}", e);
        }
        let _ = request.transition(RequestState::Failed);
        self.finish(&request.id, RequestState::Failed, error.to_string(), outcome);
    }

    async fn complete_request(
        &self,
        request: &mut AnalysisRequest,
        result: terra_domain::ConsensusResult,
    ) {
        let message = format!(
            "completed: {} (confidence {:.2})",
            result.primary.hypothesis, result.primary.confidence
        );
        info!(request = %request.id, "{}", message);

        let outcome = AnalysisOutcome::Completed(result);
        if let Err(e) = self.store.save(&request.id, &outcome).await {
            warn!(request = %request.id, "failed to persist result: {}", e);
        }
        let _ = request.transition(RequestState::Completed);
        self.finish(&request.id, RequestState::Completed, message, outcome);
    }

    /// Run one stage's tasks concurrently under the global worker pool,
    /// closing the stage when every task is terminal or the stage
    /// timeout fires, whichever comes first.
    async fn run_stage(
        &self,
        stage: Stage,
        tasks: Vec<AgentTask>,
        cancel: &CancellationToken,
        request_state: RequestState,
    ) -> Vec<AgentTask> {
        let policy = self.config.stage(stage);
        let mut retained: HashMap<TaskId, AgentTask> =
            tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();
        let started: Arc<Mutex<HashSet<TaskId>>> = Arc::new(Mutex::new(HashSet::new()));

        let mut join_set = JoinSet::new();
        for task in tasks {
            let Some(worker) = self.workers.get(&task.role).cloned() else {
                continue;
            };
            let executor = AgentExecutor::new(worker, self.config.role(task.role));
            join_set.spawn(run_task(
                task,
                executor,
                self.config.clone(),
                self.permits.clone(),
                cancel.clone(),
                started.clone(),
                self.progress.clone(),
                request_state,
            ));
        }

        let deadline = tokio::time::Instant::now() + policy.timeout();
        let mut finished: Vec<AgentTask> = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok(task))) => {
                    retained.remove(&task.id);
                    finished.push(task);
                }
                Ok(Some(Err(e))) => {
                    warn!(stage = %stage, "task join error: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(stage = %stage, "stage timeout elapsed, closing stage");
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Tasks the deadline cut off: anything that had begun an
        // attempt counts as failed, the rest never ran and are skipped.
        let started = started.lock().unwrap_or_else(|p| p.into_inner());
        for (_, mut task) in retained.drain() {
            if started.contains(&task.id) {
                if task.state == TaskState::Pending {
                    let _ = task.start_attempt();
                }
                let _ = task.fail();
            } else {
                let _ = task.skip();
            }
            self.progress.publish(ProgressEvent::task_finished(
                task.request_id.clone(),
                stage,
                task.role,
                task.state,
                request_state,
            ));
            finished.push(task);
        }

        // Downstream consumers see findings in role order, independent
        // of completion order.
        let order = stage.roles();
        finished.sort_by_key(|t| order.iter().position(|r| *r == t.role).unwrap_or(usize::MAX));
        finished
    }
}

/// Drive one request through the stage DAG to a terminal state. The
/// driver owns every write to the request's state.
async fn drive(inner: Arc<Inner>, mut request: AnalysisRequest, cancel: CancellationToken) {
    let aggregator = ResultAggregator::new(inner.config.consensus);
    let mut summaries: Vec<StageSummary> = Vec::new();
    let stage1_ids: Vec<TaskId> = Stage::Analysis
        .roles()
        .into_iter()
        .map(|role| TaskId::for_role(Stage::Analysis, role))
        .collect();

    for stage in Stage::all() {
        if cancel.is_cancelled() {
            debug!(request = %request.id, "driver stopping: cancelled");
            return;
        }

        let state = match stage {
            Stage::Analysis => RequestState::Analyzing,
            Stage::Validation => RequestState::Validating,
            Stage::Research => RequestState::Researching,
        };
        if request.transition(state).is_err() {
            return;
        }
        inner.set_status(
            &request.id,
            state,
            format!("stage {} ({}) running", stage.number(), stage),
        );
        inner
            .progress
            .publish(ProgressEvent::stage_entered(request.id.clone(), stage, state));
        info!(request = %request.id, stage = %stage, "stage started");

        // Later stages consume the closed summaries of everything
        // before them; the snapshot is immutable once built.
        let input = TaskInput::new(request.descriptor.clone(), request.metadata.clone())
            .with_prior_stages(summaries.clone());
        let tasks: Vec<AgentTask> = stage
            .roles()
            .into_iter()
            .map(|role| {
                let task = AgentTask::new(request.id.clone(), role, input.clone());
                if stage == Stage::Analysis {
                    task
                } else {
                    task.with_dependencies(stage1_ids.clone())
                }
            })
            .collect();

        let policy = inner.config.stage(stage);
        let tasks = inner.run_stage(stage, tasks, &cancel, state).await;

        if cancel.is_cancelled() {
            debug!(request = %request.id, "driver stopping after stage: cancelled");
            return;
        }

        let summary = aggregator.summarize(stage, &tasks, policy.quorum);
        inner.progress.publish(ProgressEvent::stage_closed(
            request.id.clone(),
            stage,
            state,
            summary.quorum_met,
            summary.degraded,
        ));

        if !summary.quorum_met {
            let needed = policy.quorum.min_done_needed(summary.total_tasks());
            let error = EngineError::QuorumNotMet {
                stage,
                done: summary.done,
                needed,
            };
            summaries.push(summary);
            inner.fail_request(&mut request, error, &summaries).await;
            return;
        }
        if summary.degraded {
            warn!(
                request = %request.id,
                stage = %stage,
                done = summary.done,
                failed = summary.failed,
                "stage proceeding in degraded mode"
            );
        }
        summaries.push(summary);
    }

    if cancel.is_cancelled() || request.transition(RequestState::Aggregating).is_err() {
        return;
    }
    inner.set_status(
        &request.id,
        RequestState::Aggregating,
        "computing consensus".to_string(),
    );
    inner.progress.publish(ProgressEvent::milestone(
        request.id.clone(),
        RequestState::Aggregating,
        "computing consensus",
    ));

    let engine = ConsensusEngine::new(&inner.config);
    match engine.resolve(&summaries) {
        Ok(result) => inner.complete_request(&mut request, result).await,
        Err(error) => inner.fail_request(&mut request, error, &summaries).await,
    }
}

/// Execute one task to a terminal state: attempts with exponential
/// backoff up to the role's budget, each attempt gated by the worker
/// pool. Owns its task value; nothing else mutates it.
#[allow(clippy::too_many_arguments)]
async fn run_task(
    mut task: AgentTask,
    executor: AgentExecutor,
    config: EngineConfig,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    started: Arc<Mutex<HashSet<TaskId>>>,
    progress: Arc<dyn ProgressSink>,
    request_state: RequestState,
) -> AgentTask {
    let max_attempts = config.role(task.role).max_attempts;

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        started
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(task.id.clone());

        let attempt = match task.start_attempt() {
            Ok(n) => n,
            Err(e) => {
                warn!(task = %task.id, "attempt bookkeeping error: {}", e);
                break;
            }
        };

        let outcome = executor.execute(&task.input, attempt, &cancel).await;
        drop(permit);

        match outcome {
            Ok(finding) => {
                debug!(task = %task.id, attempt, "task done");
                if task.complete(finding).is_ok() {
                    progress.publish(ProgressEvent::task_finished(
                        task.request_id.clone(),
                        task.stage,
                        task.role,
                        task.state,
                        request_state,
                    ));
                }
                break;
            }
            Err(error) => {
                let _ = task.fail();
                if !error.is_retryable() || attempt >= max_attempts {
                    warn!(task = %task.id, attempt, "task failed: {}", error);
                    progress.publish(ProgressEvent::task_finished(
                        task.request_id.clone(),
                        task.stage,
                        task.role,
                        task.state,
                        request_state,
                    ));
                    break;
                }

                let delay = config.retry_delay(attempt);
                debug!(
                    task = %task.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, backing off: {}",
                    error
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    task
}
