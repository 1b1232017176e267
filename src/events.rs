//! Event bus for state changes
//!
//! Stores emit a [`SpaceEvent`] after every successful mutation. Subscribers
//! (the logging listener, future push channels) receive them over a tokio
//! broadcast channel; emitting with no subscribers is a no-op.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::features::FeatureId;
use crate::keys::LocationKey;

/// State changes emitted by the stores
#[derive(Debug, Clone)]
pub enum SpaceEvent {
    LocationCreated {
        key: LocationKey,
        price: f64,
    },
    LocationPurchased {
        key: LocationKey,
        owner: String,
    },
    FeaturePurchased {
        key: LocationKey,
        feature: FeatureId,
    },
    LandSettingsUpdated {
        key: LocationKey,
        owner: String,
    },
    ContentPosted {
        key: LocationKey,
        id: String,
        user_id: String,
    },
    PresenceJoined {
        user_id: String,
    },
    PresenceLeft {
        user_id: String,
    },
    PresenceExpired {
        count: usize,
    },
    BountyCreated {
        id: u64,
        title: String,
        bounty_amount: u32,
    },
    ProfileCreated {
        id: u64,
        username: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &SpaceEvent);
}

/// Broadcast bus for [`SpaceEvent`]s
pub struct EventBus {
    sender: broadcast::Sender<SpaceEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: SpaceEvent) {
        trace!(event = ?event, "Emitting space event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpaceEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit-trail listener that writes events to the tracing log
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &SpaceEvent) {
        match event {
            SpaceEvent::LocationPurchased { key, owner } => {
                info!(key = %key, owner = %owner, "Location purchased");
            }
            SpaceEvent::FeaturePurchased { key, feature } => {
                info!(key = %key, feature = %feature, "Feature purchased");
            }
            SpaceEvent::LandSettingsUpdated { key, owner } => {
                info!(key = %key, owner = %owner, "Land settings updated");
            }
            SpaceEvent::ContentPosted { key, id, user_id } => {
                debug!(key = %key, id = %id, user = %user_id, "Content posted");
            }
            SpaceEvent::BountyCreated { id, title, bounty_amount } => {
                debug!(id = id, title = %title, bounty = bounty_amount, "Bounty event created");
            }
            _ => {
                trace!(event = ?event, "Space event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(SpaceEvent::LocationPurchased {
            key: LocationKey::parse("40.0,-73.0").unwrap(),
            owner: "u1".into(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            SpaceEvent::LocationPurchased { key, owner } => {
                assert_eq!(key.as_str(), "40.0,-73.0");
                assert_eq!(owner, "u1");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        bus.emit(SpaceEvent::PresenceLeft { user_id: "u1".into() });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
