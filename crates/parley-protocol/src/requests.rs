//! Request bodies and query strings.

use parley_core::RawMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of `POST /participants`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of `POST /messages` and `PUT /messages/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl MessageRequest {
    /// Convert into the engine's unvalidated form.
    #[must_use]
    pub fn into_raw(self) -> RawMessage {
        RawMessage {
            to: self.to,
            text: self.text,
            kind: self.kind,
        }
    }
}

/// Rejected `limit` query value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("limit must be a positive integer")]
pub struct LimitError;

/// Query string of `GET /messages`.
///
/// `limit` is kept as text so that a malformed value is reported as a
/// validation failure instead of a generic extractor rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<String>,
}

impl ListQuery {
    /// Parse the limit. Absent means unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError`] unless the value is a positive integer.
    pub fn limit(&self) -> Result<Option<usize>, LimitError> {
        match self.limit.as_deref().map(str::trim) {
            None => Ok(None),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(LimitError),
            },
        }
    }
}
