//! Message visibility rules.

use crate::message::{Message, MessageKind, BROADCAST};

/// Decides which messages a requester may read.
#[derive(Debug, Clone)]
pub struct AccessFilter {
    requester: String,
}

impl AccessFilter {
    /// Create a filter for `requester`.
    #[must_use]
    pub fn new(requester: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
        }
    }

    /// Public messages and notices are visible to everyone; anything else only
    /// to its sender, its recipient, or everyone when sent to [`BROADCAST`].
    #[must_use]
    pub fn visible(&self, message: &Message) -> bool {
        matches!(message.kind, MessageKind::Message | MessageKind::Status)
            || message.from == self.requester
            || message.to == self.requester
            || message.to == BROADCAST
    }
}
