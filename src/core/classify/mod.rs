//! Error classification
//!
//! Turns anything caught at the edge of the system into one normalized
//! [`ErrorRecord`]. Classification is a fixed, ordered chain of
//! [`ErrorRule`]s: the first rule that recognizes the caught value wins.
//! Some failure shapes overlap (a storage timeout also looks like a network
//! failure), so the order of the chain is significant.
//!
//! # Chain order
//!
//! 1. HTTP exceptions raised by this crate ([`ApiError`](crate::core::error::ApiError) and friends)
//! 2. Token errors (`jsonwebtoken`)
//! 3. Storage mapping errors
//! 4. Storage driver errors
//! 5. Outbound call errors (`reqwest`)
//! 6. Input validation errors (`validator`)
//! 7. Filesystem errors
//! 8. Network errors
//! 9. Permission errors (message sniffing)
//! 10. Rate-limit errors (message and status sniffing)
//! 11. Generic parse/conversion errors
//! 12. Native errors and panics with a message
//!
//! Anything left over becomes an `UnknownError`.

pub mod rules;
pub mod validation;

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

pub use rules::*;
pub use validation::{describe_issue, issues_from_validator};

/// A value caught at the boundary
#[derive(Debug, Clone, Copy)]
pub enum Caught<'a> {
    /// A returned error, with its full source chain
    Error(&'a anyhow::Error),

    /// A panic; the payload message when it was a string
    Panic(Option<&'a str>),

    /// Nothing usable was caught
    Nothing,
}

impl<'a> Caught<'a> {
    /// First error of type `E` anywhere in the source chain
    pub fn find<E>(&self) -> Option<&'a E>
    where
        E: std::error::Error + 'static,
    {
        match *self {
            Caught::Error(err) => err.chain().find_map(|cause| cause.downcast_ref::<E>()),
            _ => None,
        }
    }

    /// Every message in the chain, outermost first
    pub fn messages(&self) -> Vec<String> {
        match self {
            Caught::Error(err) => err.chain().map(ToString::to_string).collect(),
            Caught::Panic(Some(message)) => vec![message.to_string()],
            _ => Vec::new(),
        }
    }
}

/// Human-readable message: a single sentence, or one per failing field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ErrorMessage {
    /// `One` for a single sentence, `Many` otherwise
    pub fn from_sentences(mut sentences: Vec<String>) -> Self {
        if sentences.len() == 1 {
            ErrorMessage::One(sentences.remove(0))
        } else {
            ErrorMessage::Many(sentences)
        }
    }

    /// Every sentence joined into one line
    pub fn joined(&self) -> String {
        match self {
            ErrorMessage::One(message) => message.clone(),
            ErrorMessage::Many(messages) => messages.join("; "),
        }
    }
}

impl From<String> for ErrorMessage {
    fn from(message: String) -> Self {
        ErrorMessage::One(message)
    }
}

impl From<&str> for ErrorMessage {
    fn from(message: &str) -> Self {
        ErrorMessage::One(message.to_string())
    }
}

/// Normalized description of one failure. Built once and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    status: StatusCode,
    message: ErrorMessage,
    error_type: String,
    code: Option<String>,
    details: Option<Value>,
}

impl ErrorRecord {
    pub fn new(
        status: StatusCode,
        error_type: impl Into<String>,
        message: impl Into<ErrorMessage>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            error_type: error_type.into(),
            code: None,
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The record produced when nothing recognizes the caught value
    pub fn unknown() -> Self {
        ErrorRecord::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "UnknownError",
            "An unknown error occurred",
        )
        .with_code("UNKNOWN_ERROR")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &ErrorMessage {
        &self.message
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }
}

/// One link of the classification chain
pub trait ErrorRule: Send + Sync {
    /// Short name used in trace output
    fn name(&self) -> &'static str;

    /// A record when this rule recognizes the caught value
    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord>;
}

/// Ordered chain of rules, first match wins
pub struct Classifier {
    rules: Vec<Box<dyn ErrorRule>>,
}

impl Classifier {
    /// A classifier with no rules; everything classifies as unknown
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The standard chain, in priority order
    pub fn standard() -> Self {
        Self::empty()
            .with_rule(HttpExceptionRule)
            .with_rule(TokenRule)
            .with_rule(StorageMappingRule)
            .with_rule(StorageDriverRule)
            .with_rule(OutboundRule)
            .with_rule(InputValidationRule)
            .with_rule(FilesystemRule)
            .with_rule(NetworkRule)
            .with_rule(PermissionRule)
            .with_rule(RateLimitRule)
            .with_rule(GenericErrorRule)
            .with_rule(NativeErrorRule)
    }

    /// Append a rule at the lowest priority
    pub fn with_rule(mut self, rule: impl ErrorRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn classify(&self, caught: &Caught<'_>) -> ErrorRecord {
        for rule in &self.rules {
            if let Some(record) = rule.classify(caught) {
                tracing::trace!(rule = rule.name(), status = record.status().as_u16(), "classified failure");
                return record;
            }
        }
        ErrorRecord::unknown()
    }

    /// Shorthand for classifying a returned error
    pub fn classify_error(&self, err: &anyhow::Error) -> ErrorRecord {
        self.classify(&Caught::Error(err))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("rules", &self.rule_names())
            .finish()
    }
}
