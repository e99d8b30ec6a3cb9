//! Response bodies.

use parley_core::ChatError;
use serde::{Deserialize, Serialize};

/// Body returned with a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    /// Field-level reasons (422).
    Invalid { errors: Vec<String> },
    /// Any other failure.
    Message { error: String },
}

/// Text returned for internal failures. The cause is logged, never sent.
pub const INTERNAL_FAILURE: &str = "internal failure";

impl ErrorBody {
    /// Build the body the transport sends for `err`.
    #[must_use]
    pub fn from_error(err: &ChatError) -> Self {
        match err {
            ChatError::Internal(_) => Self::Message {
                error: INTERNAL_FAILURE.to_string(),
            },
            ChatError::InvalidUser(_) => Self::Invalid {
                errors: vec![parley_core::error::INVALID_USER_REASON.to_string()],
            },
            other => match other.reasons() {
                Some(reasons) => Self::Invalid {
                    errors: reasons.to_vec(),
                },
                None => Self::Message {
                    error: other.to_string(),
                },
            },
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    /// A healthy response for the given version.
    #[must_use]
    pub fn ok(version: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            version: version.into(),
        }
    }
}
