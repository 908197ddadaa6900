//! In-process repository.

use crate::error::Result;
use crate::types::{NewNotification, Notification, NotificationId, Pagination, ReadState, Recipient, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::index::NotificationIndex;
use super::Repository;

/// Repository that keeps every notification in memory.
///
/// Nothing survives the process; use [`LogRepository`](super::LogRepository)
/// when notifications must outlive it.
pub struct MemoryRepository {
    index: NotificationIndex,
    /// Counter for generating notification IDs.
    next_id: AtomicU64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            index: NotificationIndex::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get a notification by ID.
    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.index.get(id)
    }

    /// Number of stored notifications.
    pub fn count(&self) -> usize {
        self.index.count()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for MemoryRepository {
    fn save(&self, recipient: &Recipient, notification: NewNotification) -> Result<Notification> {
        let id = NotificationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let notification = Notification {
            id,
            recipient: recipient.clone(),
            fields: notification.fields,
            created_at: Timestamp::now(),
            read_at: None,
        };

        self.index.insert(notification.clone());
        debug!(%id, %recipient, "saved notification");

        Ok(notification)
    }

    fn get_notifications(
        &self,
        recipients: &[Recipient],
        page: Pagination,
    ) -> Result<Vec<Notification>> {
        Ok(self.index.query(recipients, ReadState::Unread, page))
    }

    fn get_read_notifications(
        &self,
        recipients: &[Recipient],
        page: Pagination,
    ) -> Result<Vec<Notification>> {
        Ok(self.index.query(recipients, ReadState::Read, page))
    }

    fn read(&self, notification: &Notification) -> Result<Notification> {
        let (notification, _) = self.index.set_state(notification.id, ReadState::Read)?;
        Ok(notification)
    }

    fn unread(&self, notification: &Notification) -> Result<Notification> {
        let (notification, _) = self.index.set_state(notification.id, ReadState::Unread)?;
        Ok(notification)
    }
}
