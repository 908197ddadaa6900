//! # Notification Feed
//!
//! A push/pull notification feed for "notifiable" entities.
//!
//! ## Core Concepts
//!
//! - **Recipients**: `(kind, id)` pairs; anything implementing [`Notifiable`]
//!   can be addressed
//! - **Push**: one stored notification per recipient, each announced to an
//!   [`EventSink`]
//! - **Pull**: unread or read notifications for a set of recipients, newest
//!   first, windowed by an immutable [`Pagination`]
//! - **Repositories**: in-memory or a durable append-only log
//!
//! ## Example
//!
//! ```ignore
//! use notification_feed::{Feed, MemoryRepository, NullSink, Recipient};
//!
//! let feed = Feed::new(MemoryRepository::new(), NullSink);
//! let alice = Recipient::new("user", 1);
//! let team = Recipient::new("team", 7);
//!
//! feed.push("build is green", [alice.clone(), team.clone()])?;
//!
//! let latest = feed.limit(10).pull(&alice)?;
//! feed.mark_as_read(&latest[0])?;
//! assert_eq!(feed.pull_read(&alice)?.len(), 1);
//! ```

pub mod error;
pub mod events;
pub mod feed;
pub mod repository;
pub mod types;

// Re-exports
pub use error::{FeedError, Result};
pub use events::{
    DropReason, EventBus, EventSink, FeedEvent, NotificationAdded, NullSink, SubscriptionConfig,
    SubscriptionFilter, SubscriptionHandle, SubscriptionId,
};
pub use feed::{Feed, FeedConfig, PullRequest};
pub use repository::{LogRepository, LogRepositoryConfig, MemoryRepository, Repository};
pub use types::*;
