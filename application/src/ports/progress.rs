//! Progress delivery port
//!
//! Push-based, best-effort delivery of [`ProgressEvent`]s to whoever is
//! listening. Implementations live in the infrastructure or
//! presentation layers (broadcast channels, websockets, consoles).

use terra_domain::ProgressEvent;

/// Sink for progress events of all requests.
pub trait ProgressSink: Send + Sync {
    /// Deliver one event. Must not block; dropping the event when no
    /// subscriber is listening is acceptable.
    fn publish(&self, event: ProgressEvent);
}

/// No-op sink for when progress reporting is not needed.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn publish(&self, _event: ProgressEvent) {}
}
