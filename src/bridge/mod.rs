//! The one seam the CRUD layer sees.
//!
//! `publish` costs the caller at most a channel enqueue. The calling handler
//! has already committed its own state change; a dropped notification never
//! rolls back or blocks domain mutation, so no error surfaces here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::event::NotificationEvent;
use crate::hub::{BroadcastRequest, Hub};

pub struct EventBridge {
    hub: Arc<Hub>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventBridge {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Fire-and-forget dispatch of a domain event to the hub. Safe to call
    /// from any number of concurrent request contexts; never blocks and
    /// never reports failure to the caller.
    pub fn publish(&self, event: NotificationEvent) {
        let event_type = event.event_type;
        if self.hub.broadcast(BroadcastRequest::Event(event)) {
            self.published.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(event_type = event_type.as_str(), "Event published to hub");
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct BridgeStats {
    pub published: u64,
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::registry::Registry;

    #[tokio::test]
    async fn publish_never_errors_even_when_hub_stopped() {
        let hub = Hub::spawn(Arc::new(Registry::new()), &HubConfig::default());
        hub.stop().await;

        let bridge = EventBridge::new(hub);
        bridge.publish(NotificationEvent::system_broadcast("dropped"));

        let stats = bridge.stats();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.dropped, 1);
    }
}
