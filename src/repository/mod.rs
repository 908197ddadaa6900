//! Notification persistence.
//!
//! The feed talks to storage only through the [`Repository`] trait. Two
//! implementations ship with the crate:
//!
//! - [`MemoryRepository`]: everything in process memory
//! - [`LogRepository`]: an append-only, checksummed log on disk, replayed
//!   into memory on open
//!
//! Query results are ordered newest first.

mod durable;
mod index;
mod log;
mod memory;

pub use durable::{LogRepository, LogRepositoryConfig};
pub use memory::MemoryRepository;

use crate::error::Result;
use crate::types::{Fields, NewNotification, Notification, Pagination, Recipient};
use std::sync::Arc;

/// Storage and query backend for notifications.
///
/// `recipients` arguments are the distinct (kind, id) pairs to match; a
/// notification matches when its recipient equals any of them.
pub trait Repository: Send + Sync {
    /// Construct an unpersisted notification from normalized fields.
    fn new_notification(&self, fields: Fields) -> NewNotification {
        NewNotification::new(fields)
    }

    /// Persist one notification for one recipient.
    fn save(&self, recipient: &Recipient, notification: NewNotification) -> Result<Notification>;

    /// Unread notifications for any of `recipients`.
    fn get_notifications(
        &self,
        recipients: &[Recipient],
        page: Pagination,
    ) -> Result<Vec<Notification>>;

    /// Read notifications for any of `recipients`.
    fn get_read_notifications(
        &self,
        recipients: &[Recipient],
        page: Pagination,
    ) -> Result<Vec<Notification>>;

    /// Mark a notification read. Must not fail if it already is.
    fn read(&self, notification: &Notification) -> Result<Notification>;

    /// Mark a notification unread. Must not fail if it already is.
    fn unread(&self, notification: &Notification) -> Result<Notification>;
}

macro_rules! forward_repository {
    ($($ty:ty),*) => {$(
        impl<R: Repository + ?Sized> Repository for $ty {
            fn new_notification(&self, fields: Fields) -> NewNotification {
                (**self).new_notification(fields)
            }

            fn save(&self, recipient: &Recipient, notification: NewNotification) -> Result<Notification> {
                (**self).save(recipient, notification)
            }

            fn get_notifications(
                &self,
                recipients: &[Recipient],
                page: Pagination,
            ) -> Result<Vec<Notification>> {
                (**self).get_notifications(recipients, page)
            }

            fn get_read_notifications(
                &self,
                recipients: &[Recipient],
                page: Pagination,
            ) -> Result<Vec<Notification>> {
                (**self).get_read_notifications(recipients, page)
            }

            fn read(&self, notification: &Notification) -> Result<Notification> {
                (**self).read(notification)
            }

            fn unread(&self, notification: &Notification) -> Result<Notification> {
                (**self).unread(notification)
            }
        }
    )*};
}

forward_repository!(&R, Arc<R>, Box<R>);
