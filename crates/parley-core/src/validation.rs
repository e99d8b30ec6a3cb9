//! Input sanitization and schema checks.
//!
//! Every untrusted field is sanitized first, then checked against its schema.
//! All violated rules are reported together, in schema field order.

use crate::message::MessageKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;
use validator::{Validate, ValidationError, ValidationErrors};

/// Minimum participant name length, in characters.
pub const MIN_NAME_LENGTH: usize = 3;

static MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("markup pattern is valid"));

/// Cleans a raw field value before validation.
pub trait Sanitizer: Send + Sync {
    /// Return the sanitized form of `raw`.
    fn sanitize(&self, raw: &str) -> String;
}

/// Strips markup tags and control characters, then trims whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupSanitizer;

impl Sanitizer for MarkupSanitizer {
    fn sanitize(&self, raw: &str) -> String {
        MARKUP
            .replace_all(raw, "")
            .chars()
            .filter(|c| !c.is_control() || *c == '\n')
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Length caps applied on top of the schemas.
#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    pub max_name_length: usize,
    pub max_text_length: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_name_length: 64,
            max_text_length: 4096,
        }
    }
}

/// Unvalidated message fields as received from a client.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub to: Option<String>,
    pub text: Option<String>,
    pub kind: Option<String>,
}

/// Message fields that passed the message schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFields {
    pub to: String,
    pub text: String,
    pub kind: MessageKind,
}

#[derive(Debug, Validate)]
struct ParticipantSchema {
    #[validate(custom(function = "validate_name"))]
    name: String,
}

#[derive(Debug, Validate)]
struct MessageSchema {
    #[validate(custom(function = "validate_recipient"))]
    to: String,
    #[validate(custom(function = "validate_text"))]
    text: String,
    #[validate(custom(function = "validate_kind"))]
    kind: String,
}

const PARTICIPANT_FIELDS: &[&str] = &["name"];
const MESSAGE_FIELDS: &[&str] = &["to", "text", "kind"];

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(rule("required", "name is required"));
    }
    if name.chars().count() < MIN_NAME_LENGTH {
        return Err(rule("length", "name must be at least 3 characters long"));
    }
    Ok(())
}

fn validate_recipient(to: &str) -> Result<(), ValidationError> {
    if to.is_empty() {
        return Err(rule("required", "to is required"));
    }
    Ok(())
}

fn validate_text(text: &str) -> Result<(), ValidationError> {
    if text.is_empty() {
        return Err(rule("required", "text is required"));
    }
    Ok(())
}

fn validate_kind(kind: &str) -> Result<(), ValidationError> {
    if kind.is_empty() {
        return Err(rule("required", "type is required"));
    }
    if MessageKind::from_client(kind).is_none() {
        return Err(rule(
            "one_of",
            "type must be one of [message, private_message]",
        ));
    }
    Ok(())
}

/// Flatten validator errors into reasons, ordered by `fields`.
fn reasons(errors: &ValidationErrors, fields: &[&str]) -> Vec<String> {
    let by_field = errors.field_errors();
    fields
        .iter()
        .filter_map(|field| by_field.get(*field))
        .flat_map(|errs| errs.iter())
        .map(|e| match &e.message {
            Some(message) => message.to_string(),
            None => e.code.to_string(),
        })
        .collect()
}

fn too_long(field: &str, max: usize) -> String {
    format!("{field} must be at most {max} characters long")
}

/// Sanitizes and checks untrusted input.
#[derive(Clone)]
pub struct ValidationPipeline {
    sanitizer: Arc<dyn Sanitizer>,
    limits: ValidationLimits,
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::new(Arc::new(MarkupSanitizer), ValidationLimits::default())
    }
}

impl ValidationPipeline {
    /// Create a pipeline with a custom sanitizer.
    #[must_use]
    pub fn new(sanitizer: Arc<dyn Sanitizer>, limits: ValidationLimits) -> Self {
        Self { sanitizer, limits }
    }

    /// Sanitize a single value, treating absence as empty.
    #[must_use]
    pub fn sanitize(&self, raw: Option<&str>) -> String {
        raw.map(|s| self.sanitizer.sanitize(s)).unwrap_or_default()
    }

    /// Check a participant name.
    ///
    /// # Errors
    ///
    /// Returns every violated rule, in order.
    pub fn participant(&self, raw_name: Option<&str>) -> Result<String, Vec<String>> {
        let schema = ParticipantSchema {
            name: self.sanitize(raw_name),
        };

        let mut failures = match schema.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => reasons(&errors, PARTICIPANT_FIELDS),
        };
        if schema.name.chars().count() > self.limits.max_name_length {
            failures.push(too_long("name", self.limits.max_name_length));
        }

        if failures.is_empty() {
            Ok(schema.name)
        } else {
            Err(failures)
        }
    }

    /// Check message fields.
    ///
    /// # Errors
    ///
    /// Returns every violated rule, in order.
    pub fn message(&self, raw: &RawMessage) -> Result<MessageFields, Vec<String>> {
        let schema = MessageSchema {
            to: self.sanitize(raw.to.as_deref()),
            text: self.sanitize(raw.text.as_deref()),
            kind: self.sanitize(raw.kind.as_deref()),
        };

        let mut failures = match schema.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => reasons(&errors, MESSAGE_FIELDS),
        };
        if schema.to.chars().count() > self.limits.max_name_length {
            failures.push(too_long("to", self.limits.max_name_length));
        }
        if schema.text.chars().count() > self.limits.max_text_length {
            failures.push(too_long("text", self.limits.max_text_length));
        }

        match MessageKind::from_client(&schema.kind) {
            Some(kind) if failures.is_empty() => Ok(MessageFields {
                to: schema.to,
                text: schema.text,
                kind,
            }),
            _ => Err(failures),
        }
    }
}
