//! Event and subscription types.

use crate::types::{Notification, Recipient};
use serde::{Deserialize, Serialize};

/// Signal emitted after a notification was persisted for a recipient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationAdded {
    pub notification: Notification,
    pub recipient: Recipient,
}

/// Events delivered to [`EventBus`](super::EventBus) subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A notification was pushed.
    NotificationAdded(NotificationAdded),

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::default(),
        }
    }
}

/// Filter criteria for subscriptions. Empty filters match everything.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only these recipient kinds (None = all kinds).
    pub kinds: Option<Vec<String>>,

    /// Only these recipients (None = all recipients).
    pub recipients: Option<Vec<Recipient>>,
}

impl SubscriptionFilter {
    /// Subscribe to every notification.
    pub fn all() -> Self {
        Self::default()
    }

    /// Subscribe to notifications for specific recipient kinds.
    pub fn kinds(kinds: Vec<String>) -> Self {
        Self {
            kinds: Some(kinds),
            ..Default::default()
        }
    }

    /// Subscribe to notifications for specific recipients.
    pub fn recipients(recipients: Vec<Recipient>) -> Self {
        Self {
            recipients: Some(recipients),
            ..Default::default()
        }
    }

    pub fn matches(&self, recipient: &Recipient) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.iter().any(|kind| *kind == recipient.kind) {
                return false;
            }
        }

        if let Some(ref recipients) = self.recipients {
            if !recipients.contains(recipient) {
                return false;
            }
        }

        true
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<FeedEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<FeedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<FeedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
