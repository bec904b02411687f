//! External data gateway
//!
//! The single doorway from workers to outside data sources. Wraps any
//! [`KnowledgeSource`] with a shared token-bucket rate limiter, bounded
//! retries with backoff, and a per-source circuit breaker. Gateway
//! failures are never fatal to the owning task: callers record the
//! affected evidence as unverified and move on.

mod breaker;
mod rate_limit;

pub use breaker::CircuitBreaker;
pub use rate_limit::TokenBucket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use terra_application::ports::knowledge::{KnowledgeSource, SourceError, SourceRecord};

/// Gateway tuning, externally supplied (see the `[gateway]` config
/// section).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayPolicy {
    /// Token refill rate shared by all requests to the source
    pub rate_per_sec: f64,
    /// Burst capacity of the token bucket
    pub burst: usize,
    /// Retry budget for transient failures
    pub max_retries: u32,
    /// Base retry delay, doubled per retry
    pub retry_delay_ms: u64,
    /// Consecutive failures that open the breaker
    pub breaker_threshold: u32,
    /// Rolling window the failure run must fall within
    pub breaker_window_ms: u64,
    /// How long an open breaker refuses calls before one trial
    pub breaker_cooldown_ms: u64,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            rate_per_sec: 5.0,
            burst: 10,
            max_retries: 2,
            retry_delay_ms: 200,
            breaker_threshold: 3,
            breaker_window_ms: 30_000,
            breaker_cooldown_ms: 60_000,
        }
    }
}

/// Rate-limited, retrying, circuit-breaking façade over one external
/// source.
pub struct ExternalDataGateway {
    inner: Arc<dyn KnowledgeSource>,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    policy: GatewayPolicy,
}

impl ExternalDataGateway {
    pub fn new(inner: Arc<dyn KnowledgeSource>, policy: GatewayPolicy) -> Self {
        Self {
            limiter: TokenBucket::new(policy.rate_per_sec, policy.burst),
            breaker: CircuitBreaker::new(
                policy.breaker_threshold,
                Duration::from_millis(policy.breaker_window_ms),
                Duration::from_millis(policy.breaker_cooldown_ms),
            ),
            inner,
            policy,
        }
    }

    /// Whether the wrapped source is currently refusing calls.
    pub fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }
}

#[async_trait]
impl KnowledgeSource for ExternalDataGateway {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn lookup(&self, query: &str) -> Result<SourceRecord, SourceError> {
        if !self.breaker.allow() {
            debug!(source = self.name(), "circuit open, failing fast");
            return Err(SourceError::CircuitOpen(self.name().to_string()));
        }

        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire().await;

            match self.inner.lookup(query).await {
                Ok(record) => {
                    self.breaker.record_success();
                    return Ok(record);
                }
                Err(error) => {
                    self.breaker.record_failure();
                    attempt += 1;

                    if !error.is_retryable() || attempt > self.policy.max_retries {
                        warn!(
                            source = self.name(),
                            attempt, "source lookup failed: {}", error
                        );
                        return Err(error);
                    }
                    if self.breaker.is_open() {
                        return Err(SourceError::CircuitOpen(self.name().to_string()));
                    }

                    let delay = self
                        .policy
                        .retry_delay_ms
                        .saturating_mul(1 << (attempt - 1).min(16));
                    debug!(
                        source = self.name(),
                        attempt, delay_ms = delay, "retrying source lookup"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }
}
