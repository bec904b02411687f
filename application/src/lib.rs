//! Application layer for terra-engine
//!
//! Use cases and ports for the consensus orchestration engine. The
//! [`orchestrator::TaskOrchestrator`] drives submitted requests through
//! the stage DAG; the [`executor::AgentExecutor`] wraps individual
//! specialist calls; everything external is reached through the traits
//! in [`ports`].

pub mod executor;
pub mod orchestrator;
pub mod ports;

pub use executor::{AgentExecutor, ExecutionError};
pub use orchestrator::{RequestStatus, TaskOrchestrator};
pub use ports::{
    AnalysisOutcome, DescriptorError, DescriptorProvider, KnowledgeSource, NoProgress,
    ProgressSink, ResultStore, SourceError, SourceRecord, SpecialistWorker, StoreError,
    WorkerError,
};
