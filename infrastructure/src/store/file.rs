//! JSON file result store
//!
//! One `<request-id>.json` document per terminal request under a base
//! directory. Matches the persistence contract: a durable key-value
//! store keyed by request id, read back for retrieval after the
//! in-memory registry is gone.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use terra_application::ports::store::{AnalysisOutcome, ResultStore, StoreError};
use terra_domain::RequestId;

/// Directory-backed [`ResultStore`] writing pretty-printed JSON.
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    /// Store documents under `base_dir`, creating it on first save.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, id: &RequestId) -> PathBuf {
        // Request ids are generated from hex and dashes; anything else
        // (caller-supplied ids) gets sanitized away from path tricks.
        let safe: String = id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir.join(format!("{}.json", safe))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn save(&self, id: &RequestId, outcome: &AnalysisOutcome) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| StoreError(format!("create {}: {}", self.base_dir.display(), e)))?;

        let body = serde_json::to_vec_pretty(outcome)
            .map_err(|e| StoreError(format!("serialize {}: {}", id, e)))?;
        let path = self.path_for(id);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StoreError(format!("write {}: {}", path.display(), e)))?;

        debug!(request = %id, path = %path.display(), "outcome persisted");
        Ok(())
    }

    async fn load(&self, id: &RequestId) -> Result<Option<AnalysisOutcome>, StoreError> {
        let path = self.path_for(id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError(format!("read {}: {}", path.display(), e))),
        };
        let outcome = serde_json::from_slice(&body)
            .map_err(|e| StoreError(format!("parse {}: {}", path.display(), e)))?;
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_domain::{EngineError, FailureReport, Stage};

    fn failed_outcome() -> AnalysisOutcome {
        AnalysisOutcome::Failed(FailureReport::from_error(&EngineError::QuorumNotMet {
            stage: Stage::Validation,
            done: 0,
            needed: 1,
        }))
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let id = RequestId::new("req-abc-0001");

        store.save(&id, &failed_outcome()).await.unwrap();
        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded, failed_outcome());
    }

    #[tokio::test]
    async fn test_missing_id_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load(&RequestId::new("req-nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hostile_id_stays_inside_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let id = RequestId::new("../../etc/passwd");

        store.save(&id, &failed_outcome()).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_some());
        // Everything written lands under the base directory
        let mut entries = std::fs::read_dir(dir.path()).unwrap();
        assert!(entries.next().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let id = RequestId::new("req-bad");

        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(store.path_for(&id), b"not json").unwrap();
        assert!(store.load(&id).await.is_err());
    }
}
