//! External knowledge source port
//!
//! Research and validation workers reach outside data exclusively
//! through this port. The infrastructure gateway decorates any
//! implementation with rate limiting, retries and a circuit breaker;
//! callers must treat every failure as non-fatal and downgrade the
//! affected evidence to unverified instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One record returned by an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Which source produced the record
    pub source: String,
    /// Source payload, shape owned by the source
    pub payload: serde_json::Value,
}

impl SourceRecord {
    pub fn new(source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source: source.into(),
            payload,
        }
    }
}

/// Errors surfaced by knowledge sources and the gateway around them.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Transient failure; the gateway may retry
    #[error("transient source failure: {0}")]
    Transient(String),

    /// The source's circuit breaker is open; call failed fast
    #[error("circuit open for source {0}")]
    CircuitOpen(String),

    /// Permanent failure; retrying will not help
    #[error("source failure: {0}")]
    Fatal(String),
}

impl SourceError {
    /// Whether the gateway retry policy applies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// An external data source reachable from workers.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Stable source name, used for breaker state and evidence labels.
    fn name(&self) -> &str;

    /// Look one query up.
    async fn lookup(&self, query: &str) -> Result<SourceRecord, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SourceError::Transient("timeout".into()).is_retryable());
        assert!(!SourceError::CircuitOpen("geo-db".into()).is_retryable());
        assert!(!SourceError::Fatal("bad query".into()).is_retryable());
    }
}
