//! Ports (interfaces) for external collaborators
//!
//! The engine treats every outside capability as a port: specialist
//! workers, the feature-descriptor provider, external knowledge
//! sources, result persistence and progress delivery. Implementations
//! (adapters) live in the infrastructure layer or in the embedding
//! application.

pub mod descriptor;
pub mod knowledge;
pub mod progress;
pub mod specialist;
pub mod store;

pub use descriptor::{DescriptorError, DescriptorProvider};
pub use knowledge::{KnowledgeSource, SourceError, SourceRecord};
pub use progress::{NoProgress, ProgressSink};
pub use specialist::{SpecialistWorker, WorkerError};
pub use store::{AnalysisOutcome, ResultStore, StoreError};
