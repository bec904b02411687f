//! In-memory result store
//!
//! Keeps terminal outcomes in a map. Suits tests and single-process
//! deployments that do not need durability.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use terra_application::ports::store::{AnalysisOutcome, ResultStore, StoreError};
use terra_domain::RequestId;

/// Map-backed [`ResultStore`].
#[derive(Default)]
pub struct MemoryResultStore {
    outcomes: RwLock<HashMap<RequestId, AnalysisOutcome>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored outcomes.
    pub async fn len(&self) -> usize {
        self.outcomes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.outcomes.read().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(&self, id: &RequestId, outcome: &AnalysisOutcome) -> Result<(), StoreError> {
        self.outcomes
            .write()
            .await
            .insert(id.clone(), outcome.clone());
        Ok(())
    }

    async fn load(&self, id: &RequestId) -> Result<Option<AnalysisOutcome>, StoreError> {
        Ok(self.outcomes.read().await.get(id).cloned())
    }
}
