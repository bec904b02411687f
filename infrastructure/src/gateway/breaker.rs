//! Circuit breaker
//!
//! Per-source fail-fast guard: after a run of consecutive failures
//! within a rolling window the breaker opens, callers fail immediately
//! for a cooldown period, then a single half-open trial call decides
//! whether it closes again.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: State,
    consecutive_failures: u32,
    window_start: Option<Instant>,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker.
pub struct CircuitBreaker {
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Opens after `threshold` consecutive failures within `window`;
    /// stays open for `cooldown`, then allows one trial call.
    pub fn new(threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: State::Closed,
                consecutive_failures: 0,
                window_start: None,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed right now. An open breaker whose
    /// cooldown has elapsed admits exactly one trial call and moves to
    /// half-open; further calls are refused until the trial reports.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            State::Closed => true,
            State::HalfOpen => false,
            State::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    inner.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Whether the breaker currently refuses calls.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        matches!(inner.state, State::Open)
    }

    /// Report a successful call: closes the breaker and clears the
    /// failure run.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state = State::Closed;
        inner.consecutive_failures = 0;
        inner.window_start = None;
        inner.opened_at = None;
    }

    /// Report a failed call. A failed half-open trial reopens the
    /// breaker and restarts the cooldown.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            State::Open => {}
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
            }
            State::Closed => {
                let now = Instant::now();
                // The failure run resets once the rolling window expires
                let in_window = inner
                    .window_start
                    .is_some_and(|start| now.duration_since(start) <= self.window);
                if in_window {
                    inner.consecutive_failures += 1;
                } else {
                    inner.consecutive_failures = 1;
                    inner.window_start = Some(now);
                }

                if inner.consecutive_failures >= self.threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(now);
                }
            }
        }
    }
}
