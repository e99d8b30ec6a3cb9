//! Chat operations exposed to the transport.
//!
//! [`ChatService`] validates untrusted input, then consults and mutates the
//! participant registry and the message log. Every failure comes back as a
//! [`ChatError`].

use crate::access::AccessFilter;
use crate::error::ChatError;
use crate::message::{
    display_time, MemoryMessageStore, Message, MessageId, MessageStore, MessageUpdate, Mutation,
    NewMessage, BROADCAST, JOIN_NOTICE,
};
use crate::participant::{MemoryRegistry, Participant, ParticipantRegistry, Registration};
use crate::sweeper::{PresenceSweeper, SweeperConfig};
use crate::validation::{MessageFields, RawMessage, ValidationPipeline};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Reason reported for a zero or unparsable `limit`.
pub const INVALID_LIMIT_REASON: &str = "limit must be a positive integer";

/// The presence/message engine.
pub struct ChatService {
    registry: Arc<dyn ParticipantRegistry>,
    messages: Arc<dyn MessageStore>,
    validation: ValidationPipeline,
    /// Held across register + join notice and across evict + leave notices, so
    /// notices for one name follow the order its membership changed.
    membership: Arc<Mutex<()>>,
}

impl ChatService {
    /// Create a service over the given backends.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ParticipantRegistry>,
        messages: Arc<dyn MessageStore>,
        validation: ValidationPipeline,
    ) -> Self {
        Self {
            registry,
            messages,
            validation,
            membership: Arc::new(Mutex::new(())),
        }
    }

    /// Create a service over in-process backends.
    #[must_use]
    pub fn in_memory(validation: ValidationPipeline) -> Self {
        Self::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(MemoryMessageStore::new()),
            validation,
        )
    }

    /// Build a sweeper sharing this service's backends.
    #[must_use]
    pub fn sweeper(&self, config: SweeperConfig) -> PresenceSweeper {
        PresenceSweeper::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.messages),
            Arc::clone(&self.membership),
            config,
        )
    }

    /// Register a participant and announce the join.
    ///
    /// If the join notice cannot be stored the registration is withdrawn, so
    /// the caller can retry.
    ///
    /// # Errors
    ///
    /// [`ChatError::Validation`] for a bad name, [`ChatError::Conflict`] if the
    /// name is live.
    pub async fn register_participant(
        &self,
        raw_name: Option<&str>,
    ) -> Result<Participant, ChatError> {
        let name = self
            .validation
            .participant(raw_name)
            .map_err(ChatError::Validation)?;

        let _membership = self.membership.lock().await;

        let participant = match self.registry.register(&name).await? {
            Registration::Created(participant) => participant,
            Registration::Taken => {
                warn!(participant = %name, "Registration rejected: name taken");
                return Err(ChatError::Conflict(name));
            }
        };

        if let Err(e) = self.messages.append(NewMessage::status(name.clone(), JOIN_NOTICE)).await {
            error!(participant = %name, error = %e, "Failed to append join notice");
            if let Err(rollback) = self.registry.withdraw(&name).await {
                error!(participant = %name, error = %rollback, "Failed to withdraw registration");
            }
            return Err(e.into());
        }

        info!(participant = %name, "Participant joined");
        Ok(participant)
    }

    /// Snapshot of live participants.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry fails.
    pub async fn list_participants(&self) -> Result<Vec<Participant>, ChatError> {
        Ok(self.registry.list_live().await?)
    }

    /// Send a message from `raw_from`.
    ///
    /// # Errors
    ///
    /// [`ChatError::InvalidMessage`] carrying the validation reasons, or
    /// `invalid user` if sender or recipient is not live.
    pub async fn send_message(
        &self,
        raw_from: Option<&str>,
        raw: &RawMessage,
    ) -> Result<Message, ChatError> {
        let fields = self
            .validation
            .message(raw)
            .map_err(ChatError::InvalidMessage)?;
        let from = self.validation.sanitize(raw_from);
        self.check_parties(&from, &fields).await?;

        let message = NewMessage::new(from, fields.to, fields.text, fields.kind);
        let id = self.messages.append(message.clone()).await?;

        debug!(id = %id, from = %message.from, to = %message.to, "Message sent");
        Ok(message.into_message(id))
    }

    /// Messages visible to `raw_requester`, oldest first.
    ///
    /// # Errors
    ///
    /// [`ChatError::Validation`] for a zero `limit`, [`ChatError::InvalidUser`]
    /// if the requester is not live.
    pub async fn list_messages(
        &self,
        raw_requester: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, ChatError> {
        if limit == Some(0) {
            return Err(ChatError::Validation(vec![INVALID_LIMIT_REASON.to_string()]));
        }

        let requester = self.validation.sanitize(raw_requester);
        if !self.registry.is_live(&requester).await? {
            return Err(ChatError::InvalidUser(requester));
        }

        let filter = AccessFilter::new(requester);
        let messages = self
            .messages
            .query(&|m: &Message| filter.visible(m), limit)
            .await?;
        Ok(messages)
    }

    /// Refresh the requester's liveness.
    ///
    /// # Errors
    ///
    /// [`ChatError::ParticipantNotFound`] if the requester is not live.
    pub async fn heartbeat(&self, raw_requester: Option<&str>) -> Result<(), ChatError> {
        let requester = self.validation.sanitize(raw_requester);
        if self.registry.heartbeat(&requester).await? {
            debug!(participant = %requester, "Heartbeat");
            Ok(())
        } else {
            Err(ChatError::ParticipantNotFound(requester))
        }
    }

    /// Replace a message's recipient, text and type.
    ///
    /// Failures are reported in precedence order: invalid input (including a
    /// requester or recipient that is not live), then a missing message, then
    /// an ownership violation.
    ///
    /// # Errors
    ///
    /// [`ChatError::InvalidMessage`], [`ChatError::MessageNotFound`] or
    /// [`ChatError::Unauthorized`].
    pub async fn update_message(
        &self,
        id: MessageId,
        raw_requester: Option<&str>,
        raw: &RawMessage,
    ) -> Result<(), ChatError> {
        let fields = self
            .validation
            .message(raw)
            .map_err(ChatError::InvalidMessage)?;
        let requester = self.validation.sanitize(raw_requester);
        self.check_parties(&requester, &fields).await?;

        let update = MessageUpdate {
            to: fields.to,
            text: fields.text,
            kind: fields.kind,
            time: display_time(),
        };
        let outcome = self.messages.update(id, update, &requester).await?;
        self.resolve(outcome, id, &requester)
    }

    /// Delete a message owned by the requester.
    ///
    /// # Errors
    ///
    /// [`ChatError::MessageNotFound`] or [`ChatError::Unauthorized`].
    pub async fn delete_message(
        &self,
        id: MessageId,
        raw_requester: Option<&str>,
    ) -> Result<(), ChatError> {
        let requester = self.validation.sanitize(raw_requester);
        let outcome = self.messages.delete(id, &requester).await?;
        self.resolve(outcome, id, &requester)
    }

    async fn check_parties(&self, from: &str, fields: &MessageFields) -> Result<(), ChatError> {
        let recipient_valid =
            fields.to == BROADCAST || self.registry.is_live(&fields.to).await?;
        if !recipient_valid || !self.registry.is_live(from).await? {
            warn!(from = %from, to = %fields.to, "Message rejected: invalid user");
            return Err(ChatError::invalid_user());
        }
        Ok(())
    }

    fn resolve(&self, outcome: Mutation, id: MessageId, requester: &str) -> Result<(), ChatError> {
        match outcome {
            Mutation::Applied => Ok(()),
            Mutation::Missing => Err(ChatError::MessageNotFound(id)),
            Mutation::NotOwner => {
                warn!(id = %id, requester = %requester, "Mutation rejected: not the owner");
                Err(ChatError::Unauthorized)
            }
        }
    }
}
