//! Token-bucket rate limiter
//!
//! Shared across every concurrent request to the same external source.
//! `acquire` waits for a token; `try_acquire` never waits.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Async token bucket with a fixed refill rate and burst capacity.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A bucket refilling at `rate_per_sec` tokens per second, holding
    /// at most `burst` tokens. Starts full.
    pub fn new(rate_per_sec: f64, burst: usize) -> Self {
        let capacity = (burst.max(1)) as f64;
        Self {
            capacity,
            refill_per_sec: rate_per_sec.max(f64::MIN_POSITIVE),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, waiting for the refill when the bucket is empty.
    pub async fn acquire(&self) {
        loop {
            match self.take_or_deficit() {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Take one token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.take_or_deficit().is_none()
    }

    /// `None` when a token was taken; otherwise the time until one is
    /// available.
    fn take_or_deficit(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}
