//! Failure vocabulary surfaced by storage backends
//!
//! Backends translate their driver errors into [`StorageError`] before
//! handing them to the rest of the crate, so nothing downstream needs to
//! sniff driver-specific error shapes.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Which layer of the storage stack a failure comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFamily {
    /// Document mapping: schema, casting, versioning, connection state
    Mapping,
    /// The driver talking to the server: writes, timeouts, network, auth
    Driver,
}

/// What went wrong with one field of a rejected document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    Required,
    Enum { allowed: Vec<String> },
    MinLength { min: u64 },
    MaxLength { max: u64 },
    Min { min: f64 },
    Max { max: f64 },
    Unique,
    Other { code: String },
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    #[serde(flatten)]
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, kind: IssueKind) -> Self {
        Self {
            field: field.into(),
            kind,
            value: None,
            message: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Closed set of failures a storage backend can report
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    // --- mapping layer ---
    #[error("document failed validation ({} field(s))", issues.len())]
    Validation { issues: Vec<FieldIssue> },

    #[error("cannot cast {value} to {expected} at '{path}'")]
    Cast {
        path: String,
        value: String,
        expected: String,
    },

    #[error("version conflict on document {id}")]
    VersionConflict { id: String },

    #[error("no document matched {filter}")]
    DocumentNotFound { filter: String },

    #[error("document {id} is already being saved")]
    ParallelSave { id: String },

    #[error("field '{path}' is not in the schema")]
    StrictMode { path: String },

    #[error("storage connection lost: {message}")]
    Disconnected { message: String },

    #[error("no storage server available: {message}")]
    ServerSelection { message: String },

    #[error("document (de)serialization failed: {message}")]
    Serialization { message: String },

    // --- driver layer ---
    #[error("duplicate key: {}", describe_key_value(key_value))]
    DuplicateKey { key_value: Vec<(String, Value)> },

    #[error("write concern failed: {message}")]
    WriteConcern { message: String },

    #[error("storage operation timed out: {message}")]
    Timeout { message: String },

    #[error("storage network error: {message}")]
    Network { message: String },

    #[error("storage authentication failed: {message}")]
    Authentication { message: String },

    #[error("storage error: {message}")]
    Other { message: String },
}

impl StorageError {
    pub fn family(&self) -> StorageFamily {
        match self {
            StorageError::Validation { .. }
            | StorageError::Cast { .. }
            | StorageError::VersionConflict { .. }
            | StorageError::DocumentNotFound { .. }
            | StorageError::ParallelSave { .. }
            | StorageError::StrictMode { .. }
            | StorageError::Disconnected { .. }
            | StorageError::ServerSelection { .. }
            | StorageError::Serialization { .. } => StorageFamily::Mapping,
            StorageError::DuplicateKey { .. }
            | StorageError::WriteConcern { .. }
            | StorageError::Timeout { .. }
            | StorageError::Network { .. }
            | StorageError::Authentication { .. }
            | StorageError::Other { .. } => StorageFamily::Driver,
        }
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        StorageError::Other {
            message: message.into(),
        }
    }
}

fn describe_key_value(key_value: &[(String, Value)]) -> String {
    key_value
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}
