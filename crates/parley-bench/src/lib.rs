//! Shared fixtures for Parley benchmarks.

use parley_core::{ChatService, RawMessage, ValidationPipeline};

/// A public message to everyone.
#[must_use]
pub fn broadcast(text: &str) -> RawMessage {
    RawMessage {
        to: Some("Todos".to_string()),
        text: Some(text.to_string()),
        kind: Some("message".to_string()),
    }
}

/// A private message to `to`.
#[must_use]
pub fn private(to: &str, text: &str) -> RawMessage {
    RawMessage {
        to: Some(to.to_string()),
        text: Some(text.to_string()),
        kind: Some("private_message".to_string()),
    }
}

/// Build a service with `participants` registered and `messages` sent,
/// alternating public and private traffic.
pub async fn populated(participants: usize, messages: usize) -> ChatService {
    let chat = ChatService::in_memory(ValidationPipeline::default());
    let names: Vec<String> = (0..participants).map(|i| format!("user-{i}")).collect();

    for name in &names {
        let _ = chat.register_participant(Some(name)).await;
    }

    if names.is_empty() {
        return chat;
    }

    for i in 0..messages {
        let from = &names[i % names.len()];
        let raw = if i % 2 == 0 {
            broadcast("hello everyone")
        } else {
            private(&names[(i + 1) % names.len()], "just for you")
        };
        let _ = chat.send_message(Some(from), &raw).await;
    }

    chat
}
