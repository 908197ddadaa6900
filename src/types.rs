//! Core types for the notification feed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field mapping carried by a notification.
pub type Fields = Map<String, Value>;

/// Field name a raw string payload is stored under.
pub const BODY_FIELD: &str = "body";

/// Unique identifier for a notification (assigned by the repository).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub u64);

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", self.0)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// An entity that can receive notifications.
///
/// `kind` discriminates heterogeneous recipient types ("user", "team", ...);
/// `id` is unique within its kind.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub kind: String,
    pub id: String,
}

impl Recipient {
    pub fn new(kind: impl Into<String>, id: impl ToString) -> Self {
        Self {
            kind: kind.into(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Domain types that can be addressed as a notification recipient.
pub trait Notifiable {
    /// The (kind, id) identity notifications are stored against.
    fn recipient(&self) -> Recipient;
}

impl Notifiable for Recipient {
    fn recipient(&self) -> Recipient {
        self.clone()
    }
}

/// One or many recipients.
///
/// A lone recipient and a one-element sequence convert to the same value,
/// so feed call sites never need to care which they were given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipients<'a>(Cow<'a, [Recipient]>);

impl<'a> Recipients<'a> {
    /// Collect recipients from any notifiable domain values.
    pub fn from_notifiables<'n, T, I>(items: I) -> Recipients<'static>
    where
        T: Notifiable + 'n,
        I: IntoIterator<Item = &'n T>,
    {
        Recipients(Cow::Owned(
            items.into_iter().map(T::recipient).collect(),
        ))
    }

    pub fn as_slice(&self) -> &[Recipient] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recipient> {
        self.0.iter()
    }

    /// The distinct (kind, id) pairs, in first-seen order.
    pub fn keys(&self) -> Vec<Recipient> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .filter(|r| seen.insert(*r))
            .cloned()
            .collect()
    }
}

impl<'a> From<&'a Recipient> for Recipients<'a> {
    fn from(recipient: &'a Recipient) -> Self {
        Recipients(Cow::Borrowed(std::slice::from_ref(recipient)))
    }
}

impl From<Recipient> for Recipients<'static> {
    fn from(recipient: Recipient) -> Self {
        Recipients(Cow::Owned(vec![recipient]))
    }
}

impl<'a> From<&'a [Recipient]> for Recipients<'a> {
    fn from(recipients: &'a [Recipient]) -> Self {
        Recipients(Cow::Borrowed(recipients))
    }
}

impl<'a> From<&'a Vec<Recipient>> for Recipients<'a> {
    fn from(recipients: &'a Vec<Recipient>) -> Self {
        Recipients(Cow::Borrowed(recipients.as_slice()))
    }
}

impl From<Vec<Recipient>> for Recipients<'static> {
    fn from(recipients: Vec<Recipient>) -> Self {
        Recipients(Cow::Owned(recipients))
    }
}

impl<'a, const N: usize> From<&'a [Recipient; N]> for Recipients<'a> {
    fn from(recipients: &'a [Recipient; N]) -> Self {
        Recipients(Cow::Borrowed(recipients.as_slice()))
    }
}

impl<const N: usize> From<[Recipient; N]> for Recipients<'static> {
    fn from(recipients: [Recipient; N]) -> Self {
        Recipients(Cow::Owned(Vec::from(recipients)))
    }
}

/// Author-supplied notification content, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A bare human-readable body.
    Body(String),
    /// A full field mapping.
    Fields(Fields),
}

impl Payload {
    /// Normalize to a field mapping. A bare body becomes `{"body": ...}`.
    pub fn into_fields(self) -> Fields {
        match self {
            Payload::Body(body) => {
                let mut fields = Map::new();
                fields.insert(BODY_FIELD.to_string(), Value::String(body));
                fields
            }
            Payload::Fields(fields) => fields,
        }
    }
}

impl From<&str> for Payload {
    fn from(body: &str) -> Self {
        Payload::Body(body.to_string())
    }
}

impl From<String> for Payload {
    fn from(body: String) -> Self {
        Payload::Body(body)
    }
}

impl From<Fields> for Payload {
    fn from(fields: Fields) -> Self {
        Payload::Fields(fields)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Payload::Fields(fields),
            Value::String(body) => Payload::Body(body),
            other => Payload::Body(other.to_string()),
        }
    }
}

/// Read state of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadState {
    Unread,
    Read,
}

/// A notification that has not been persisted yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewNotification {
    pub fields: Fields,
}

impl NewNotification {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }
}

/// A persisted notification, owned by exactly one recipient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier (assigned by repository).
    pub id: NotificationId,

    /// Who the notification belongs to.
    pub recipient: Recipient,

    /// Author-supplied payload.
    pub fields: Fields,

    /// When the notification was created.
    pub created_at: Timestamp,

    /// When it was marked read (None = unread).
    pub read_at: Option<Timestamp>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    pub fn state(&self) -> ReadState {
        if self.is_read() {
            ReadState::Read
        } else {
            ReadState::Unread
        }
    }

    /// The `body` field, if it is a string.
    pub fn body(&self) -> Option<&str> {
        self.fields.get(BODY_FIELD).and_then(Value::as_str)
    }
}

/// Result window for a feed query.
///
/// Immutable: the builder methods return an updated copy. No limit means
/// unbounded, no offset means start at the first result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Pagination {
    /// Unbounded, no offset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Fill in a limit only if none was set.
    pub fn or_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = self.limit.or(limit);
        self
    }

    /// Window an already-ordered result stream.
    pub fn apply<I: Iterator>(&self, iter: I) -> std::iter::Take<std::iter::Skip<I>> {
        iter.skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
    }
}
