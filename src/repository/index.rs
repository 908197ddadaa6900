//! In-memory notification index shared by the repository implementations.

use crate::error::{FeedError, Result};
use crate::types::{Notification, NotificationId, Pagination, ReadState, Recipient, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct IndexInner {
    /// Notification ID to notification.
    notifications: HashMap<NotificationId, Notification>,

    /// Recipient to the notification IDs it owns, in insertion order.
    by_recipient: HashMap<Recipient, Vec<NotificationId>>,
}

/// Index of notifications by ID and by recipient.
#[derive(Default)]
pub(crate) struct NotificationIndex {
    inner: RwLock<IndexInner>,
}

impl NotificationIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notification to the index, replacing any entry with the same ID.
    ///
    /// A replacement owned by a different recipient moves the ID to that
    /// recipient's list.
    pub fn insert(&self, notification: Notification) {
        let mut inner = self.inner.write();
        let id = notification.id;
        let recipient = notification.recipient.clone();

        let previous = inner.notifications.insert(id, notification);
        match previous {
            Some(previous) if previous.recipient == recipient => {}
            Some(previous) => {
                if let Some(ids) = inner.by_recipient.get_mut(&previous.recipient) {
                    ids.retain(|&other| other != id);
                }
                inner.by_recipient.entry(recipient).or_default().push(id);
            }
            None => inner.by_recipient.entry(recipient).or_default().push(id),
        }
    }

    /// Get a notification by ID.
    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.inner.read().notifications.get(&id).cloned()
    }

    /// Overwrite the read timestamp of a notification.
    pub fn set_read_at(
        &self,
        id: NotificationId,
        read_at: Option<Timestamp>,
    ) -> Result<Notification> {
        let mut inner = self.inner.write();
        let notification = inner
            .notifications
            .get_mut(&id)
            .ok_or(FeedError::NotificationNotFound(id))?;
        notification.read_at = read_at;
        Ok(notification.clone())
    }

    /// Move a notification to `state`.
    ///
    /// Returns the notification and whether anything changed. A notification
    /// already in `state` keeps its original read timestamp.
    pub fn set_state(&self, id: NotificationId, state: ReadState) -> Result<(Notification, bool)> {
        let mut inner = self.inner.write();
        let notification = inner
            .notifications
            .get_mut(&id)
            .ok_or(FeedError::NotificationNotFound(id))?;

        if notification.state() == state {
            return Ok((notification.clone(), false));
        }

        notification.read_at = match state {
            ReadState::Read => Some(Timestamp::now()),
            ReadState::Unread => None,
        };
        Ok((notification.clone(), true))
    }

    /// Notifications owned by any of `recipients` in `state`, newest first,
    /// windowed by `page`.
    pub fn query(
        &self,
        recipients: &[Recipient],
        state: ReadState,
        page: Pagination,
    ) -> Vec<Notification> {
        let inner = self.inner.read();

        let mut matched: Vec<&Notification> = recipients
            .iter()
            .filter_map(|recipient| inner.by_recipient.get(recipient))
            .flatten()
            .filter_map(|id| inner.notifications.get(id))
            .filter(|notification| notification.state() == state)
            .collect();

        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        // Repeated recipients would otherwise yield the same row twice.
        matched.dedup_by_key(|notification| notification.id);

        page.apply(matched.into_iter()).cloned().collect()
    }

    /// Get count of notifications.
    pub fn count(&self) -> usize {
        self.inner.read().notifications.len()
    }

    /// Highest notification ID present.
    pub fn max_id(&self) -> Option<NotificationId> {
        self.inner.read().notifications.keys().max().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;

    fn make_notification(id: u64, recipient: &Recipient, created_at: i64) -> Notification {
        Notification {
            id: NotificationId(id),
            recipient: recipient.clone(),
            fields: Payload::from(format!("notification {}", id)).into_fields(),
            created_at: Timestamp(created_at),
            read_at: None,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let index = NotificationIndex::new();
        let alice = Recipient::new("user", 1);

        index.insert(make_notification(1, &alice, 100));

        assert_eq!(index.count(), 1);
        assert_eq!(index.get(NotificationId(1)).unwrap().recipient, alice);
        assert!(index.get(NotificationId(2)).is_none());
    }

    #[test]
    fn test_reinsert_moves_recipient() {
        let index = NotificationIndex::new();
        let alice = Recipient::new("user", 1);
        let bob = Recipient::new("user", 2);

        index.insert(make_notification(1, &alice, 100));
        index.insert(make_notification(1, &bob, 200));

        assert_eq!(index.count(), 1);
        assert!(index
            .query(&[alice], ReadState::Unread, Pagination::new())
            .is_empty());
        let bobs = index.query(&[bob.clone()], ReadState::Unread, Pagination::new());
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].recipient, bob);
    }

    #[test]
    fn test_query_filters_by_recipient_and_state() {
        let index = NotificationIndex::new();
        let alice = Recipient::new("user", 1);
        let team = Recipient::new("team", 1);

        index.insert(make_notification(1, &alice, 100));
        index.insert(make_notification(2, &team, 200));
        index.insert(make_notification(3, &alice, 300));
        index.set_state(NotificationId(3), ReadState::Read).unwrap();

        let unread = index.query(&[alice.clone()], ReadState::Unread, Pagination::new());
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, NotificationId(1));

        let read = index.query(&[alice, team], ReadState::Read, Pagination::new());
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, NotificationId(3));
    }

    #[test]
    fn test_query_orders_newest_first_and_paginates() {
        let index = NotificationIndex::new();
        let alice = Recipient::new("user", 1);

        for i in 1..=6 {
            index.insert(make_notification(i, &alice, i as i64 * 10));
        }

        let page = Pagination::new().limit(2).offset(1);
        let ids: Vec<u64> = index
            .query(&[alice], ReadState::Unread, page)
            .iter()
            .map(|n| n.id.0)
            .collect();
        assert_eq!(ids, vec![5, 4]);
    }

    #[test]
    fn test_query_with_repeated_recipient() {
        let index = NotificationIndex::new();
        let alice = Recipient::new("user", 1);
        index.insert(make_notification(1, &alice, 100));

        let result = index.query(
            &[alice.clone(), alice],
            ReadState::Unread,
            Pagination::new(),
        );
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_set_state_is_idempotent() {
        let index = NotificationIndex::new();
        let alice = Recipient::new("user", 1);
        index.insert(make_notification(1, &alice, 100));

        let (first, changed) = index.set_state(NotificationId(1), ReadState::Read).unwrap();
        assert!(changed);

        let (second, changed) = index.set_state(NotificationId(1), ReadState::Read).unwrap();
        assert!(!changed);
        assert_eq!(first.read_at, second.read_at);
    }

    #[test]
    fn test_set_state_unknown_id() {
        let index = NotificationIndex::new();
        let result = index.set_state(NotificationId(42), ReadState::Read);
        assert!(matches!(result, Err(FeedError::NotificationNotFound(NotificationId(42)))));
    }

    #[test]
    fn test_max_id() {
        let index = NotificationIndex::new();
        assert_eq!(index.max_id(), None);

        let alice = Recipient::new("user", 1);
        index.insert(make_notification(7, &alice, 100));
        index.insert(make_notification(3, &alice, 100));
        assert_eq!(index.max_id(), Some(NotificationId(7)));
    }
}
