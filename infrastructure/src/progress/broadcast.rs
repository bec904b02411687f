//! Broadcast-channel progress fan-out
//!
//! Push-based, at-least-once-effort delivery keyed by request id. A
//! subscriber that connects partway through execution misses earlier
//! events and must fall back to the status/result reads; lagging
//! subscribers drop old events rather than stall the engine. Channels
//! are pruned when the terminal event goes out.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use terra_application::ports::progress::ProgressSink;
use terra_domain::{ProgressEvent, RequestId};

/// Per-request broadcast hub implementing [`ProgressSink`].
pub struct ProgressBroadcaster {
    capacity: usize,
    channels: Mutex<HashMap<RequestId, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressBroadcaster {
    /// `capacity` bounds how many undelivered events a slow subscriber
    /// may lag behind before losing the oldest.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a request's events. Only events published after
    /// this call are delivered.
    pub fn subscribe(&self, id: &RequestId) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        channels
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of requests with live channels.
    pub fn active_channels(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    fn is_terminal(event: &ProgressEvent) -> bool {
        matches!(event.stage.as_str(), "completed" | "failed" | "cancelled")
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ProgressSink for ProgressBroadcaster {
    fn publish(&self, event: ProgressEvent) {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        let terminal = Self::is_terminal(&event);
        let id = event.request_id.clone();

        if let Some(sender) = channels.get(&id) {
            // Err here just means nobody is listening right now
            let _ = sender.send(event);
        }
        if terminal {
            debug!(request = %id, "terminal event delivered, pruning channel");
            channels.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_domain::{RequestState, Stage};

    fn stage_event(id: &RequestId) -> ProgressEvent {
        ProgressEvent::stage_entered(id.clone(), Stage::Analysis, RequestState::Analyzing)
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let hub = ProgressBroadcaster::default();
        let id = RequestId::new("req-1");
        let mut rx = hub.subscribe(&id);

        hub.publish(stage_event(&id));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.stage, "analysis");
    }

    #[tokio::test]
    async fn test_events_before_subscribe_are_missed() {
        let hub = ProgressBroadcaster::default();
        let id = RequestId::new("req-1");

        hub.publish(stage_event(&id));
        let mut rx = hub.subscribe(&id);
        hub.publish(ProgressEvent::terminal(
            id.clone(),
            RequestState::Completed,
            "done",
        ));

        // Only the post-subscription event arrives
        let event = rx.recv().await.unwrap();
        assert_eq!(event.stage, "completed");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_pruned_on_terminal_event() {
        let hub = ProgressBroadcaster::default();
        let id = RequestId::new("req-1");
        let _rx = hub.subscribe(&id);
        assert_eq!(hub.active_channels(), 1);

        hub.publish(ProgressEvent::terminal(
            id.clone(),
            RequestState::Failed,
            "quorum not met",
        ));
        assert_eq!(hub.active_channels(), 0);
    }

    #[tokio::test]
    async fn test_requests_are_isolated() {
        let hub = ProgressBroadcaster::default();
        let a = RequestId::new("req-a");
        let b = RequestId::new("req-b");
        let mut rx_a = hub.subscribe(&a);
        let _rx_b = hub.subscribe(&b);

        hub.publish(stage_event(&b));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let hub = ProgressBroadcaster::default();
        let id = RequestId::new("req-1");
        // No channel, no panic
        hub.publish(stage_event(&id));
        assert_eq!(hub.active_channels(), 0);
    }
}
