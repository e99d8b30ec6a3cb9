//! Error taxonomy for Parley.
//!
//! Client-correctable failures (validation, conflicts, missing records,
//! ownership violations) are recovered into [`ChatError`] and returned to the
//! caller. Backend faults arrive as [`StoreError`] and surface as
//! [`ChatError::Internal`].

use crate::message::MessageId;
use thiserror::Error;

/// A fault inside a registry or message store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation.
    #[error("Store operation failed: {0}")]
    Backend(String),
}

/// Failures returned by chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// One or more field-level validation reasons.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A send or update was rejected, either by validation or because the
    /// requester or recipient is not live.
    #[error("Invalid message: {}", .0.join("; "))]
    InvalidMessage(Vec<String>),

    /// A live participant already holds this name.
    #[error("Participant already exists: {0}")]
    Conflict(String),

    /// No live participant has this name.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// No message has this id.
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    /// The requester does not own the message.
    #[error("Not the owner of this message")]
    Unauthorized,

    /// The requester is not a live participant.
    #[error("Invalid user: {0}")]
    InvalidUser(String),

    /// Backend fault.
    #[error("Internal failure: {0}")]
    Internal(#[from] StoreError),
}

/// Reason reported when a requester or recipient is not live.
pub const INVALID_USER_REASON: &str = "invalid user";

impl ChatError {
    /// HTTP status code the transport reports for this failure.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidMessage(_) | Self::InvalidUser(_) => 422,
            Self::Conflict(_) => 409,
            Self::ParticipantNotFound(_) | Self::MessageNotFound(_) => 404,
            Self::Unauthorized => 401,
            Self::Internal(_) => 500,
        }
    }

    /// Field-level reasons, if this failure carries any.
    #[must_use]
    pub fn reasons(&self) -> Option<&[String]> {
        match self {
            Self::Validation(reasons) | Self::InvalidMessage(reasons) => Some(reasons),
            _ => None,
        }
    }

    /// Short machine-readable kind, used as a metrics label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidMessage(_) => "invalid_message",
            Self::Conflict(_) => "conflict",
            Self::ParticipantNotFound(_) => "participant_not_found",
            Self::MessageNotFound(_) => "message_not_found",
            Self::Unauthorized => "unauthorized",
            Self::InvalidUser(_) => "invalid_user",
            Self::Internal(_) => "internal",
        }
    }

    pub(crate) fn invalid_user() -> Self {
        Self::InvalidMessage(vec![INVALID_USER_REASON.to_string()])
    }
}
