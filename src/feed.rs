//! The notification feed: push to recipients, pull unread/read pages, toggle
//! read state.

use crate::error::{FeedError, Result};
use crate::events::{EventSink, NotificationAdded, NullSink};
use crate::repository::Repository;
use crate::types::{Notification, Pagination, Payload, ReadState, Recipients};
use tracing::debug;

/// Feed configuration.
#[derive(Clone, Debug, Default)]
pub struct FeedConfig {
    /// Limit applied to pulls whose pagination sets none (None = unbounded).
    pub default_limit: Option<usize>,
}

/// Push/pull notification feed over a [`Repository`] and an [`EventSink`].
///
/// The feed holds no per-call state: pagination travels with each pull, so
/// one instance can serve concurrent callers.
pub struct Feed<R, S = NullSink> {
    repository: R,
    sink: S,
    config: FeedConfig,
}

impl<R: Repository> Feed<R, NullSink> {
    /// Feed that emits no events.
    pub fn without_events(repository: R) -> Self {
        Self::new(repository, NullSink)
    }
}

impl<R: Repository, S: EventSink> Feed<R, S> {
    /// Create a new feed over a repository and an event sink.
    pub fn new(repository: R, sink: S) -> Self {
        Self::with_config(repository, sink, FeedConfig::default())
    }

    /// Create a new feed with custom configuration.
    pub fn with_config(repository: R, sink: S, config: FeedConfig) -> Self {
        Self {
            repository,
            sink,
            config,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    // --- Push ---

    /// Push a notification to one or more recipients.
    ///
    /// A bare string payload is stored as `{"body": ...}`. Each recipient gets
    /// its own record, saved and then announced to the sink before the next
    /// recipient is handled. The first repository error stops the fan-out;
    /// recipients already handled keep their notification.
    pub fn push<'a>(
        &self,
        payload: impl Into<Payload>,
        recipients: impl Into<Recipients<'a>>,
    ) -> Result<()> {
        let recipients = recipients.into();
        if recipients.is_empty() {
            return Err(FeedError::Validation(
                "cannot push a notification to an empty recipient list".into(),
            ));
        }

        let fields = payload.into().into_fields();

        for recipient in recipients.iter() {
            let notification = self.repository.new_notification(fields.clone());
            let notification = self.repository.save(recipient, notification)?;

            debug!(id = %notification.id, %recipient, "pushed notification");

            self.sink.notification_added(&NotificationAdded {
                notification,
                recipient: recipient.clone(),
            });
        }

        Ok(())
    }

    // --- Pull ---

    /// Unread notifications for the recipients, newest first, unbounded.
    pub fn pull<'a>(&self, recipients: impl Into<Recipients<'a>>) -> Result<Vec<Notification>> {
        self.pull_with(recipients, Pagination::new())
    }

    /// Read notifications for the recipients, newest first, unbounded.
    pub fn pull_read<'a>(
        &self,
        recipients: impl Into<Recipients<'a>>,
    ) -> Result<Vec<Notification>> {
        self.pull_read_with(recipients, Pagination::new())
    }

    /// Unread notifications for the recipients within `page`.
    pub fn pull_with<'a>(
        &self,
        recipients: impl Into<Recipients<'a>>,
        page: Pagination,
    ) -> Result<Vec<Notification>> {
        self.query(recipients.into(), ReadState::Unread, page)
    }

    /// Read notifications for the recipients within `page`.
    pub fn pull_read_with<'a>(
        &self,
        recipients: impl Into<Recipients<'a>>,
        page: Pagination,
    ) -> Result<Vec<Notification>> {
        self.query(recipients.into(), ReadState::Read, page)
    }

    /// Start a paginated pull with a limit.
    pub fn limit(&self, limit: usize) -> PullRequest<'_, R, S> {
        self.paginate(Pagination::new().limit(limit))
    }

    /// Start a paginated pull with an offset.
    pub fn offset(&self, offset: usize) -> PullRequest<'_, R, S> {
        self.paginate(Pagination::new().offset(offset))
    }

    /// Start a pull over an existing pagination.
    pub fn paginate(&self, page: Pagination) -> PullRequest<'_, R, S> {
        PullRequest { feed: self, page }
    }

    fn query(
        &self,
        recipients: Recipients<'_>,
        state: ReadState,
        page: Pagination,
    ) -> Result<Vec<Notification>> {
        let keys = recipients.keys();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let page = page.or_limit(self.config.default_limit);
        debug!(
            recipients = keys.len(),
            ?state,
            limit = ?page.limit,
            offset = ?page.offset,
            "pulling notifications"
        );

        match state {
            ReadState::Unread => self.repository.get_notifications(&keys, page),
            ReadState::Read => self.repository.get_read_notifications(&keys, page),
        }
    }

    // --- Read state ---

    /// Mark a notification read. Safe to repeat.
    pub fn read(&self, notification: &Notification) -> Result<Notification> {
        self.repository.read(notification)
    }

    /// Alias for [`read`](Self::read).
    pub fn mark_as_read(&self, notification: &Notification) -> Result<Notification> {
        self.read(notification)
    }

    /// Mark a notification unread. Safe to repeat.
    pub fn unread(&self, notification: &Notification) -> Result<Notification> {
        self.repository.unread(notification)
    }

    /// Alias for [`unread`](Self::unread).
    pub fn mark_as_unread(&self, notification: &Notification) -> Result<Notification> {
        self.unread(notification)
    }
}

/// A pull waiting for its recipients, carrying an immutable pagination.
///
/// Built by [`Feed::limit`], [`Feed::offset`] or [`Feed::paginate`]:
///
/// ```ignore
/// let page = feed.limit(3).offset(2).pull(&alice)?;
/// ```
pub struct PullRequest<'f, R, S> {
    feed: &'f Feed<R, S>,
    page: Pagination,
}

impl<'f, R: Repository, S: EventSink> PullRequest<'f, R, S> {
    /// Set the maximum number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.page = self.page.limit(limit);
        self
    }

    /// Set how many leading results to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.page = self.page.offset(offset);
        self
    }

    /// The pagination this request will use.
    pub fn pagination(&self) -> Pagination {
        self.page
    }

    /// Unread notifications within this page.
    pub fn pull<'a>(self, recipients: impl Into<Recipients<'a>>) -> Result<Vec<Notification>> {
        self.feed.pull_with(recipients, self.page)
    }

    /// Read notifications within this page.
    pub fn pull_read<'a>(
        self,
        recipients: impl Into<Recipients<'a>>,
    ) -> Result<Vec<Notification>> {
        self.feed.pull_read_with(recipients, self.page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use crate::types::Recipient;

    #[test]
    fn test_push_then_pull() {
        let feed = Feed::without_events(MemoryRepository::new());
        let alice = Recipient::new("user", 1);

        feed.push("hello", &alice).unwrap();

        let unread = feed.pull(&alice).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].body(), Some("hello"));
        assert!(feed.pull_read(&alice).unwrap().is_empty());
    }

    #[test]
    fn test_push_empty_recipients() {
        let feed = Feed::without_events(MemoryRepository::new());
        let none: Vec<Recipient> = Vec::new();

        let result = feed.push("hello", none);
        assert!(matches!(result, Err(FeedError::Validation(_))));
        assert_eq!(feed.repository().count(), 0);
    }

    #[test]
    fn test_pull_empty_recipients() {
        let feed = Feed::without_events(MemoryRepository::new());
        let none: &[Recipient] = &[];
        assert!(feed.pull(none).unwrap().is_empty());
    }

    #[test]
    fn test_fluent_pagination_does_not_stick() {
        let feed = Feed::without_events(MemoryRepository::new());
        let alice = Recipient::new("user", 1);
        for i in 0..5 {
            feed.push(format!("n{}", i), &alice).unwrap();
        }

        assert_eq!(feed.limit(2).pull(&alice).unwrap().len(), 2);
        // A later plain pull is unbounded again.
        assert_eq!(feed.pull(&alice).unwrap().len(), 5);
    }

    #[test]
    fn test_default_limit() {
        let feed = Feed::with_config(
            MemoryRepository::new(),
            NullSink,
            FeedConfig {
                default_limit: Some(2),
            },
        );
        let alice = Recipient::new("user", 1);
        for i in 0..5 {
            feed.push(format!("n{}", i), &alice).unwrap();
        }

        assert_eq!(feed.pull(&alice).unwrap().len(), 2);
        assert_eq!(feed.limit(4).pull(&alice).unwrap().len(), 4);
    }

    #[test]
    fn test_pull_request_pagination() {
        let feed = Feed::without_events(MemoryRepository::new());
        let request = feed.offset(2).limit(3);
        assert_eq!(request.pagination(), Pagination::new().limit(3).offset(2));
    }
}
