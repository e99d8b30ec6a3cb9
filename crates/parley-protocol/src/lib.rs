//! # parley-protocol
//!
//! HTTP wire types for the Parley chat server.
//!
//! This crate defines the JSON bodies, query strings and headers that the
//! transport maps onto [`parley_core::ChatService`] operations.
//!
//! ## Routes
//!
//! - `POST /participants` / `GET /participants` - Register and list
//! - `POST /messages` / `GET /messages?limit=N` - Send and read
//! - `PUT /messages/{id}` / `DELETE /messages/{id}` - Edit and remove
//! - `POST /status` - Heartbeat
//!
//! The requester identity travels in the [`USER_HEADER`] header and is taken
//! on trust.
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::MessageRequest;
//!
//! let body: MessageRequest =
//!     serde_json::from_str(r#"{"to":"Todos","text":"hi","type":"message"}"#).unwrap();
//! let raw = body.into_raw();
//! assert_eq!(raw.kind.as_deref(), Some("message"));
//! ```

pub mod requests;
pub mod responses;

pub use requests::{LimitError, ListQuery, MessageRequest, RegisterRequest};
pub use responses::{ErrorBody, HealthResponse};

/// Header carrying the requester's participant name.
pub const USER_HEADER: &str = "user";

/// Route paths.
pub mod paths {
    pub const PARTICIPANTS: &str = "/participants";
    pub const MESSAGES: &str = "/messages";
    pub const MESSAGE: &str = "/messages/:id";
    pub const STATUS: &str = "/status";
    pub const HEALTH: &str = "/health";
}
