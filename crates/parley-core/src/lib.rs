//! # parley-core
//!
//! Presence-tracked message exchange engine for Parley.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Validation** - Sanitize and schema-check untrusted fields
//! - **Participant** - Registry of live participants and their heartbeats
//! - **Message** - Ordered message log with ownership-checked mutation
//! - **Access** - Which messages a requester may read
//! - **Sweeper** - Periodic eviction of idle participants
//! - **Service** - The operations exposed to clients
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│ ChatService │────▶│ Participant │
//! └─────────────┘     └─────────────┘     │  Registry   │
//!                            │            └─────────────┘
//!                            ▼                   ▲
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │ MessageStore│◀────│   Sweeper   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use parley_core::{ChatService, RawMessage, ValidationPipeline};
//!
//! # tokio_test_block(async {
//! let chat = ChatService::in_memory(ValidationPipeline::default());
//! chat.register_participant(Some("Alice")).await.unwrap();
//!
//! let raw = RawMessage {
//!     to: Some("Todos".into()),
//!     text: Some("hi".into()),
//!     kind: Some("message".into()),
//! };
//! chat.send_message(Some("Alice"), &raw).await.unwrap();
//!
//! let visible = chat.list_messages(Some("Alice"), None).await.unwrap();
//! assert_eq!(visible.len(), 2);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod access;
pub mod error;
pub mod message;
pub mod participant;
pub mod service;
pub mod sweeper;
pub mod validation;

pub use access::AccessFilter;
pub use error::{ChatError, StoreError};
pub use message::{
    MemoryMessageStore, Message, MessageId, MessageKind, MessageStore, MessageUpdate, Mutation,
    NewMessage, BROADCAST,
};
pub use participant::{MemoryRegistry, Participant, ParticipantRegistry, Registration};
pub use service::ChatService;
pub use sweeper::{PresenceSweeper, SweeperConfig, SweeperHandle};
pub use validation::{MarkupSanitizer, RawMessage, Sanitizer, ValidationLimits, ValidationPipeline};
