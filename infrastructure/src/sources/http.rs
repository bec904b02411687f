//! HTTP knowledge source
//!
//! Queries a JSON HTTP endpoint with a single query parameter. Server
//! and transport failures map to transient source errors so the
//! gateway's retry and breaker policies apply; client errors are fatal
//! (retrying the same bad query cannot help).

use async_trait::async_trait;
use std::time::Duration;

use terra_application::ports::knowledge::{KnowledgeSource, SourceError, SourceRecord};

/// Maximum response body size (1 MB)
const MAX_BODY_SIZE: u64 = 1024 * 1024;

/// JSON-over-HTTP [`KnowledgeSource`].
pub struct HttpKnowledgeSource {
    name: String,
    endpoint: String,
    query_param: String,
    client: reqwest::Client,
}

impl HttpKnowledgeSource {
    /// A source named `name` querying `endpoint` with `?q=<query>`.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("terra-engine/0.1")
            .build()
            .map_err(|e| SourceError::Fatal(format!("http client: {}", e)))?;
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            query_param: "q".to_string(),
            client,
        })
    }

    /// Override the query parameter name (default `q`).
    pub fn with_query_param(mut self, param: impl Into<String>) -> Self {
        self.query_param = param.into();
        self
    }
}

#[async_trait]
impl KnowledgeSource for HttpKnowledgeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, query: &str) -> Result<SourceRecord, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[(self.query_param.as_str(), query)])
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SourceError::Transient(format!(
                "server error: {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(SourceError::Fatal(format!(
                "http error: {}",
                status.as_u16()
            )));
        }
        if response.content_length().unwrap_or(0) > MAX_BODY_SIZE {
            return Err(SourceError::Fatal("response body too large".to_string()));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceError::Transient(format!("invalid json body: {}", e)))?;

        Ok(SourceRecord::new(self.name.clone(), payload))
    }
}
