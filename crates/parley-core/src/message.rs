//! Message log for Parley.
//!
//! Messages are appended in chronological order; the id assigned on append is
//! the only ordering key. Mutation is restricted to the original sender and
//! never applies to system `status` notices.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Reserved recipient that addresses every participant.
pub const BROADCAST: &str = "Todos";

/// Text of the notice appended when a participant registers.
pub const JOIN_NOTICE: &str = "entra na sala...";

/// Text of the notice appended when a participant is evicted.
pub const LEAVE_NOTICE: &str = "sai da sala...";

/// Unique, monotonically increasing message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Message visibility class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Public message, visible to everyone.
    Message,
    /// Visible only to sender and recipient.
    PrivateMessage,
    /// System join/leave notice.
    Status,
}

impl MessageKind {
    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::PrivateMessage => "private_message",
            Self::Status => "status",
        }
    }

    /// Parse a kind a client may submit. `status` is system-only and rejected.
    #[must_use]
    pub fn from_client(s: &str) -> Option<Self> {
        match s {
            "message" => Some(Self::Message),
            "private_message" => Some(Self::PrivateMessage),
            _ => None,
        }
    }
}

/// Local wall-clock time as shown next to a message.
#[must_use]
pub fn display_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Store-assigned id.
    pub id: MessageId,
    /// Sender name.
    pub from: String,
    /// Recipient name or [`BROADCAST`].
    pub to: String,
    /// Body.
    pub text: String,
    /// Visibility class.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Creation time, display only.
    pub time: String,
}

impl Message {
    /// Whether `requester` may update or delete this message.
    #[must_use]
    pub fn is_owned_by(&self, requester: &str) -> bool {
        self.kind != MessageKind::Status && self.from == requester
    }
}

/// A message that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub from: String,
    pub to: String,
    pub text: String,
    pub kind: MessageKind,
    pub time: String,
}

impl NewMessage {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        text: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            text: text.into(),
            kind,
            time: display_time(),
        }
    }

    /// Create a system notice. Notices always address [`BROADCAST`].
    #[must_use]
    pub fn status(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(from, BROADCAST, text, MessageKind::Status)
    }

    pub(crate) fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            from: self.from,
            to: self.to,
            text: self.text,
            kind: self.kind,
            time: self.time,
        }
    }
}

/// Replacement fields for an update. `id` and `from` never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageUpdate {
    pub to: String,
    pub text: String,
    pub kind: MessageKind,
    pub time: String,
}

/// Outcome of an ownership-checked mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// The change was applied.
    Applied,
    /// No message has that id.
    Missing,
    /// The message exists but the requester may not change it.
    NotOwner,
}

/// Predicate used to select messages in [`MessageStore::query`].
pub type MessageFilter<'a> = &'a (dyn Fn(&Message) -> bool + Send + Sync);

/// Storage backend for the message log.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Assign a new id and store the message.
    async fn append(&self, message: NewMessage) -> Result<MessageId, StoreError>;

    /// Messages matching `filter`, oldest first. With a `limit`, only the most
    /// recent `limit` matches are returned, still oldest first.
    async fn query(
        &self,
        filter: MessageFilter<'_>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError>;

    /// Look up one message.
    async fn get(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// Replace `to`, `text`, `kind` and `time` if `requester` owns the message.
    async fn update(
        &self,
        id: MessageId,
        update: MessageUpdate,
        requester: &str,
    ) -> Result<Mutation, StoreError>;

    /// Remove the message if `requester` owns it.
    async fn delete(&self, id: MessageId, requester: &str) -> Result<Mutation, StoreError>;
}

#[derive(Debug, Default)]
struct Log {
    last_id: u64,
    entries: BTreeMap<MessageId, Message>,
}

/// In-process message log.
///
/// Ids come from a counter advanced under the write lock, so id order is
/// insertion order. Readers clone whole messages and never see a partial
/// update.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    log: RwLock<Log>,
}

impl MemoryMessageStore {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub async fn len(&self) -> usize {
        self.log.read().await.entries.len()
    }

    /// Check if the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.log.read().await.entries.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: NewMessage) -> Result<MessageId, StoreError> {
        let mut log = self.log.write().await;
        log.last_id += 1;
        let id = MessageId(log.last_id);
        debug!(id = %id, from = %message.from, kind = message.kind.as_str(), "Message appended");
        log.entries.insert(id, message.into_message(id));
        Ok(id)
    }

    async fn query(
        &self,
        filter: MessageFilter<'_>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let log = self.log.read().await;
        let matching = log.entries.values().rev().filter(|m| filter(m));

        let mut selected: Vec<Message> = match limit {
            Some(n) => matching.take(n).cloned().collect(),
            None => matching.cloned().collect(),
        };
        selected.reverse();

        trace!(count = selected.len(), ?limit, "Messages queried");
        Ok(selected)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.log.read().await.entries.get(&id).cloned())
    }

    async fn update(
        &self,
        id: MessageId,
        update: MessageUpdate,
        requester: &str,
    ) -> Result<Mutation, StoreError> {
        let mut log = self.log.write().await;
        let Some(message) = log.entries.get_mut(&id) else {
            return Ok(Mutation::Missing);
        };
        if !message.is_owned_by(requester) {
            return Ok(Mutation::NotOwner);
        }

        message.to = update.to;
        message.text = update.text;
        message.kind = update.kind;
        message.time = update.time;

        debug!(id = %id, "Message updated");
        Ok(Mutation::Applied)
    }

    async fn delete(&self, id: MessageId, requester: &str) -> Result<Mutation, StoreError> {
        let mut log = self.log.write().await;
        let owned = match log.entries.get(&id) {
            Some(message) => message.is_owned_by(requester),
            None => return Ok(Mutation::Missing),
        };
        if !owned {
            return Ok(Mutation::NotOwner);
        }

        log.entries.remove(&id);
        debug!(id = %id, "Message deleted");
        Ok(Mutation::Applied)
    }
}
