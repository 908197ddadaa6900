//! In-process event bus broadcasting feed events to subscribers.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use super::types::{
    DropReason, FeedEvent, NotificationAdded, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};
use super::EventSink;

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<FeedEvent>,
}

impl Subscription {
    /// Try to send an event, reporting why the subscriber must go if it fails.
    fn try_send(&self, event: FeedEvent) -> Option<DropReason> {
        match self.sender.try_send(event) {
            Ok(()) => None,
            Err(TrySendError::Full(_)) => Some(DropReason::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Some(DropReason::Disconnected),
        }
    }
}

/// Fans `NotificationAdded` signals out to bounded subscriber channels.
///
/// A subscriber whose buffer is full is dropped rather than blocking the
/// pushing thread.
pub struct EventBus {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(FeedEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    fn broadcast(&self, event: &NotificationAdded) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.config.filter.matches(&event.recipient) {
                    continue;
                }
                if let Some(reason) = sub.try_send(FeedEvent::NotificationAdded(event.clone())) {
                    to_remove.push((*id, reason));
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for (id, reason) in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(subscription = id.0, ?reason, "dropping feed subscriber");
                    // Might fail, that's ok
                    let _ = sub.sender.try_send(FeedEvent::Dropped { reason });
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn notification_added(&self, event: &NotificationAdded) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SubscriptionFilter;
    use crate::types::{Notification, NotificationId, Payload, Recipient, Timestamp};
    use std::time::Duration;

    fn make_event(id: u64, recipient: Recipient) -> NotificationAdded {
        NotificationAdded {
            notification: Notification {
                id: NotificationId(id),
                recipient: recipient.clone(),
                fields: Payload::from("ping").into_fields(),
                created_at: Timestamp::now(),
                read_at: None,
            },
            recipient,
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let bus = EventBus::new();

        let handle = bus.subscribe(SubscriptionConfig::default());
        assert_eq!(bus.subscription_count(), 1);

        bus.unsubscribe(handle.id);
        assert_eq!(bus.subscription_count(), 0);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            event,
            FeedEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_broadcast_to_matching() {
        let bus = EventBus::new();
        let config = SubscriptionConfig {
            filter: SubscriptionFilter::kinds(vec!["user".to_string()]),
            ..Default::default()
        };
        let handle = bus.subscribe(config);

        bus.notification_added(&make_event(1, Recipient::new("user", 1)));

        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            FeedEvent::NotificationAdded(added) => {
                assert_eq!(added.notification.id, NotificationId(1));
                assert_eq!(added.recipient, Recipient::new("user", 1));
            }
            other => panic!("Expected NotificationAdded, got {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_filters_non_matching() {
        let bus = EventBus::new();
        let config = SubscriptionConfig {
            filter: SubscriptionFilter::kinds(vec!["user".to_string()]),
            ..Default::default()
        };
        let handle = bus.subscribe(config);

        bus.notification_added(&make_event(1, Recipient::new("team", 1)));

        assert!(handle.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let bus = EventBus::new();
        let config = SubscriptionConfig {
            buffer_size: 2,
            ..Default::default()
        };
        let _handle = bus.subscribe(config);

        for i in 0..10 {
            bus.notification_added(&make_event(i, Recipient::new("user", 1)));
        }

        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn test_drop_disconnected_subscriber() {
        let bus = EventBus::new();
        let handle = bus.subscribe(SubscriptionConfig::default());
        drop(handle);

        bus.notification_added(&make_event(1, Recipient::new("user", 1)));
        assert_eq!(bus.subscription_count(), 0);
    }
}
