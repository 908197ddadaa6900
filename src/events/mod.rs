//! Notification-added signals.
//!
//! The feed reports every successful push to an [`EventSink`] injected at
//! construction. [`EventBus`] fans the signal out to in-process subscribers
//! over bounded channels; [`NullSink`] discards it.
//!
//! # Example
//!
//! ```ignore
//! let bus = Arc::new(EventBus::new());
//! let handle = bus.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::kinds(vec!["user".to_string()]),
//!     ..Default::default()
//! });
//!
//! let feed = Feed::new(MemoryRepository::new(), Arc::clone(&bus));
//! feed.push("deploy finished", Recipient::new("user", 1))?;
//!
//! match handle.recv()? {
//!     FeedEvent::NotificationAdded(added) => println!("{}", added.recipient),
//!     FeedEvent::Dropped { reason } => println!("dropped: {:?}", reason),
//! }
//! ```

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{
    DropReason, FeedEvent, NotificationAdded, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId,
};

use std::sync::Arc;

/// Receiver of notification-added signals. Fire-and-forget.
pub trait EventSink: Send + Sync {
    fn notification_added(&self, event: &NotificationAdded);
}

/// Sink that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn notification_added(&self, _event: &NotificationAdded) {}
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn notification_added(&self, event: &NotificationAdded) {
        (**self).notification_added(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn notification_added(&self, event: &NotificationAdded) {
        (**self).notification_added(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn notification_added(&self, event: &NotificationAdded) {
        (**self).notification_added(event)
    }
}
