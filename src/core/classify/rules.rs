//! The rules making up the standard classification chain

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use jsonwebtoken::errors::ErrorKind as TokenErrorKind;
use serde_json::{Map, Value, json};
use std::io::ErrorKind as IoKind;

use super::validation::{describe_issue, issues_from_validator};
use super::{Caught, ErrorMessage, ErrorRecord, ErrorRule};
use crate::core::error::{ApiError, EntityError, HttpException, QueryError, RequestError};
use crate::storage::{FieldIssue, StorageError, StorageFamily};

fn from_exception(err: &dyn HttpException) -> ErrorRecord {
    let record = ErrorRecord::new(err.status_code(), err.error_type(), err.to_string())
        .with_code(err.error_code());
    match err.details() {
        Some(details) => record.with_details(details),
        None => record,
    }
}

fn validation_record(issues: &[FieldIssue]) -> ErrorRecord {
    let sentences = issues.iter().map(describe_issue).collect();
    ErrorRecord::new(
        StatusCode::BAD_REQUEST,
        "ValidationError",
        ErrorMessage::from_sentences(sentences),
    )
    .with_code("VALIDATION_ERROR")
    .with_details(json!(issues))
}

// =============================================================================
// HTTP exceptions
// =============================================================================

/// Errors that already carry their HTTP mapping pass through unchanged
pub struct HttpExceptionRule;

impl ErrorRule for HttpExceptionRule {
    fn name(&self) -> &'static str {
        "http_exception"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        if let Some(err) = caught.find::<ApiError>() {
            return Some(from_exception(err));
        }
        if let Some(err) = caught.find::<QueryError>() {
            return Some(from_exception(err));
        }
        if let Some(err) = caught.find::<EntityError>() {
            return Some(from_exception(err));
        }
        if let Some(err) = caught.find::<RequestError>() {
            return Some(from_exception(err));
        }
        if let Some(rejection) = caught.find::<JsonRejection>() {
            return Some(from_exception(&RequestError::from(rejection)));
        }
        if let Some(rejection) = caught.find::<PathRejection>() {
            return Some(from_exception(&RequestError::from(rejection)));
        }
        if let Some(rejection) = caught.find::<QueryRejection>() {
            return Some(from_exception(&RequestError::from(rejection)));
        }
        None
    }
}

// =============================================================================
// Tokens
// =============================================================================

/// `jsonwebtoken` failures, all 401
pub struct TokenRule;

impl ErrorRule for TokenRule {
    fn name(&self) -> &'static str {
        "token"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let err = caught.find::<jsonwebtoken::errors::Error>()?;
        let record = match err.kind() {
            TokenErrorKind::ExpiredSignature => {
                ErrorRecord::new(StatusCode::UNAUTHORIZED, "TokenExpiredError", "Token has expired")
                    .with_code("TOKEN_EXPIRED")
            }
            TokenErrorKind::ImmatureSignature => {
                ErrorRecord::new(StatusCode::UNAUTHORIZED, "NotBeforeError", "Token is not active yet")
                    .with_code("TOKEN_NOT_ACTIVE")
            }
            _ => ErrorRecord::new(StatusCode::UNAUTHORIZED, "JsonWebTokenError", "Invalid token")
                .with_code("INVALID_TOKEN")
                .with_details(json!({ "reason": err.to_string() })),
        };
        Some(record)
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Document mapping failures: schema, casting, versioning, connection state
pub struct StorageMappingRule;

impl ErrorRule for StorageMappingRule {
    fn name(&self) -> &'static str {
        "storage_mapping"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let err = caught
            .find::<StorageError>()
            .filter(|e| e.family() == StorageFamily::Mapping)?;

        let record = match err {
            StorageError::Validation { issues } => validation_record(issues),
            StorageError::Cast {
                path,
                value,
                expected,
            } => ErrorRecord::new(
                StatusCode::BAD_REQUEST,
                "CastError",
                format!("Invalid value for {}: expected {}", path, expected),
            )
            .with_code("CAST_ERROR")
            .with_details(json!({ "path": path, "value": value, "expected": expected })),
            StorageError::VersionConflict { id } => ErrorRecord::new(
                StatusCode::CONFLICT,
                "VersionError",
                "Document was modified by another request, please retry",
            )
            .with_code("VERSION_CONFLICT")
            .with_details(json!({ "id": id })),
            StorageError::DocumentNotFound { filter } => {
                ErrorRecord::new(StatusCode::NOT_FOUND, "DocumentNotFoundError", "Document not found")
                    .with_code("DOCUMENT_NOT_FOUND")
                    .with_details(json!({ "filter": filter }))
            }
            StorageError::ParallelSave { id } => ErrorRecord::new(
                StatusCode::CONFLICT,
                "ParallelSaveError",
                "Document is already being saved, please retry",
            )
            .with_code("PARALLEL_SAVE")
            .with_details(json!({ "id": id })),
            StorageError::StrictMode { path } => ErrorRecord::new(
                StatusCode::BAD_REQUEST,
                "StrictModeError",
                format!("Field '{}' is not allowed", path),
            )
            .with_code("STRICT_MODE"),
            StorageError::Disconnected { message } => ErrorRecord::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "DisconnectedError",
                "Database connection lost",
            )
            .with_code("DATABASE_DISCONNECTED")
            .with_details(json!({ "reason": message })),
            StorageError::ServerSelection { message } => ErrorRecord::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "ServerSelectionError",
                "Database server is unavailable",
            )
            .with_code("DATABASE_UNAVAILABLE")
            .with_details(json!({ "reason": message })),
            StorageError::Serialization { message } => ErrorRecord::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SerializationError",
                "Failed to process stored data",
            )
            .with_code("SERIALIZATION_ERROR")
            .with_details(json!({ "reason": message })),
            _ => return None,
        };
        Some(record)
    }
}

/// Failures reported by the driver itself
pub struct StorageDriverRule;

impl ErrorRule for StorageDriverRule {
    fn name(&self) -> &'static str {
        "storage_driver"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let err = caught
            .find::<StorageError>()
            .filter(|e| e.family() == StorageFamily::Driver)?;

        let record = match err {
            StorageError::DuplicateKey { key_value } => {
                let described: Vec<String> = key_value
                    .iter()
                    .map(|(field, value)| match value {
                        Value::String(s) => format!("{} '{}'", field, s),
                        other => format!("{} '{}'", field, other),
                    })
                    .collect();
                let message = if described.is_empty() {
                    "A record with this value already exists".to_string()
                } else {
                    format!("A record with {} already exists", described.join(", "))
                };
                let key_value: Map<String, Value> = key_value.iter().cloned().collect();

                ErrorRecord::new(StatusCode::CONFLICT, "DuplicateKeyError", message)
                    .with_code("DUPLICATE_KEY")
                    .with_details(json!({ "keyValue": key_value }))
            }
            StorageError::WriteConcern { message } => ErrorRecord::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "WriteConcernError",
                "Write could not be acknowledged",
            )
            .with_code("WRITE_CONCERN")
            .with_details(json!({ "reason": message })),
            StorageError::Timeout { message } => ErrorRecord::new(
                StatusCode::GATEWAY_TIMEOUT,
                "TimeoutError",
                "Database operation timed out",
            )
            .with_code("DATABASE_TIMEOUT")
            .with_details(json!({ "reason": message })),
            StorageError::Network { message } => ErrorRecord::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "NetworkError",
                "Database network error",
            )
            .with_code("DATABASE_NETWORK")
            .with_details(json!({ "reason": message })),
            StorageError::Authentication { message } => ErrorRecord::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "AuthenticationError",
                "Database authentication failed",
            )
            .with_code("DATABASE_AUTH")
            .with_details(json!({ "reason": message })),
            StorageError::Other { message } => ErrorRecord::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DatabaseError",
                "A database error occurred",
            )
            .with_code("DATABASE_ERROR")
            .with_details(json!({ "reason": message })),
            _ => return None,
        };
        Some(record)
    }
}

// =============================================================================
// Outbound calls
// =============================================================================

/// `reqwest` failures when calling another service
pub struct OutboundRule;

impl ErrorRule for OutboundRule {
    fn name(&self) -> &'static str {
        "outbound"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let err = caught.find::<reqwest::Error>()?;
        let url = err.url().map(|u| u.to_string());

        if err.is_timeout() {
            return Some(
                ErrorRecord::new(
                    StatusCode::GATEWAY_TIMEOUT,
                    "TimeoutError",
                    "Upstream service timed out",
                )
                .with_code("UPSTREAM_TIMEOUT")
                .with_details(json!({ "url": url })),
            );
        }
        if err.is_connect() {
            return Some(
                ErrorRecord::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "ServiceUnavailableError",
                    "Upstream service is unavailable",
                )
                .with_code("UPSTREAM_UNAVAILABLE")
                .with_details(json!({ "url": url })),
            );
        }
        match err.status() {
            // left for the rate-limit rule
            Some(status) if status.as_u16() == 429 => None,
            Some(status) => Some(
                ErrorRecord::new(
                    StatusCode::BAD_GATEWAY,
                    "UpstreamError",
                    "Upstream service returned an error",
                )
                .with_code("UPSTREAM_ERROR")
                .with_details(json!({ "url": url, "upstreamStatus": status.as_u16() })),
            ),
            None => Some(
                ErrorRecord::new(
                    StatusCode::BAD_GATEWAY,
                    "UpstreamError",
                    "Upstream request failed",
                )
                .with_code("UPSTREAM_ERROR")
                .with_details(json!({ "url": url, "reason": err.to_string() })),
            ),
        }
    }
}

// =============================================================================
// Input validation
// =============================================================================

/// `validator` failures, one sentence per failing field
pub struct InputValidationRule;

impl ErrorRule for InputValidationRule {
    fn name(&self) -> &'static str {
        "input_validation"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let errors = caught.find::<validator::ValidationErrors>()?;
        Some(validation_record(&issues_from_validator(errors)))
    }
}

// =============================================================================
// Filesystem and network
// =============================================================================

/// Filesystem `io::Error` kinds
pub struct FilesystemRule;

impl ErrorRule for FilesystemRule {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let err = caught.find::<std::io::Error>()?;
        let (status, error_type, message, code) = match err.kind() {
            IoKind::NotFound => (StatusCode::NOT_FOUND, "FileNotFoundError", "File or directory not found", "ENOENT"),
            IoKind::PermissionDenied => (StatusCode::FORBIDDEN, "PermissionError", "Permission denied", "EACCES"),
            IoKind::AlreadyExists => (StatusCode::CONFLICT, "FileExistsError", "File already exists", "EEXIST"),
            IoKind::StorageFull => (StatusCode::INSUFFICIENT_STORAGE, "StorageFullError", "No space left on device", "ENOSPC"),
            IoKind::IsADirectory => (StatusCode::BAD_REQUEST, "IsADirectoryError", "Expected a file but found a directory", "EISDIR"),
            IoKind::NotADirectory => (StatusCode::BAD_REQUEST, "NotADirectoryError", "Expected a directory but found a file", "ENOTDIR"),
            _ => return None,
        };
        Some(
            ErrorRecord::new(status, error_type, message)
                .with_code(code)
                .with_details(json!({ "reason": err.to_string() })),
        )
    }
}

/// Network `io::Error` kinds
pub struct NetworkRule;

impl ErrorRule for NetworkRule {
    fn name(&self) -> &'static str {
        "network"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let err = caught.find::<std::io::Error>()?;
        let (status, message, code) = match err.kind() {
            IoKind::ConnectionRefused => (StatusCode::SERVICE_UNAVAILABLE, "Connection refused", "ECONNREFUSED"),
            IoKind::ConnectionReset => (StatusCode::SERVICE_UNAVAILABLE, "Connection reset", "ECONNRESET"),
            IoKind::ConnectionAborted => (StatusCode::SERVICE_UNAVAILABLE, "Connection aborted", "ECONNABORTED"),
            IoKind::HostUnreachable => (StatusCode::SERVICE_UNAVAILABLE, "Host unreachable", "EHOSTUNREACH"),
            IoKind::NetworkUnreachable => (StatusCode::SERVICE_UNAVAILABLE, "Network unreachable", "ENETUNREACH"),
            IoKind::TimedOut => (StatusCode::GATEWAY_TIMEOUT, "Connection timed out", "ETIMEDOUT"),
            IoKind::AddrInUse => (StatusCode::INTERNAL_SERVER_ERROR, "Address already in use", "EADDRINUSE"),
            _ => return None,
        };
        Some(
            ErrorRecord::new(status, "NetworkError", message)
                .with_code(code)
                .with_details(json!({ "reason": err.to_string() })),
        )
    }
}

// =============================================================================
// Message sniffing
// =============================================================================

const PERMISSION_MARKERS: &[&str] = &["permission denied", "forbidden", "not authorized", "access denied"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "too many requests"];

fn mentions_any(caught: &Caught<'_>, markers: &[&str]) -> bool {
    caught.messages().iter().any(|message| {
        let message = message.to_lowercase();
        markers.iter().any(|marker| message.contains(marker))
    })
}

/// Failures whose message reads like a permission problem
pub struct PermissionRule;

impl ErrorRule for PermissionRule {
    fn name(&self) -> &'static str {
        "permission"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        mentions_any(caught, PERMISSION_MARKERS).then(|| {
            ErrorRecord::new(
                StatusCode::FORBIDDEN,
                "ForbiddenError",
                "You do not have permission to perform this action",
            )
            .with_code("PERMISSION_DENIED")
        })
    }
}

/// Throttling, recognized by message or by an upstream 429
pub struct RateLimitRule;

impl ErrorRule for RateLimitRule {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let upstream_429 = caught
            .find::<reqwest::Error>()
            .and_then(reqwest::Error::status)
            .is_some_and(|status| status.as_u16() == 429);

        (upstream_429 || mentions_any(caught, RATE_LIMIT_MARKERS)).then(|| {
            ErrorRecord::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitError",
                "Too many requests, please try again later",
            )
            .with_code("RATE_LIMIT_EXCEEDED")
        })
    }
}

// =============================================================================
// Generic and native errors
// =============================================================================

/// Standard parse and conversion failures, all client errors
pub struct GenericErrorRule;

impl ErrorRule for GenericErrorRule {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let (error_type, message, reason) = if let Some(err) = caught.find::<serde_json::Error>() {
            if err.is_syntax() || err.is_eof() {
                ("SyntaxError", "Malformed JSON", err.to_string())
            } else if err.is_data() {
                ("TypeError", "Unexpected value type", err.to_string())
            } else {
                return None;
            }
        } else if let Some(err) = caught.find::<std::num::ParseIntError>() {
            ("TypeError", "Invalid integer value", err.to_string())
        } else if let Some(err) = caught.find::<std::num::ParseFloatError>() {
            ("TypeError", "Invalid numeric value", err.to_string())
        } else if let Some(err) = caught.find::<std::num::TryFromIntError>() {
            ("RangeError", "Numeric value out of range", err.to_string())
        } else if let Some(err) = caught.find::<chrono::ParseError>() {
            ("RangeError", "Invalid date or time value", err.to_string())
        } else {
            return None;
        };

        Some(
            ErrorRecord::new(StatusCode::BAD_REQUEST, error_type, message)
                .with_code("BAD_REQUEST")
                .with_details(json!({ "reason": reason })),
        )
    }
}

/// Any remaining error or panic that at least has a message
pub struct NativeErrorRule;

impl ErrorRule for NativeErrorRule {
    fn name(&self) -> &'static str {
        "native"
    }

    fn classify(&self, caught: &Caught<'_>) -> Option<ErrorRecord> {
        let raw = match caught {
            Caught::Error(err) => format!("{:#}", err),
            Caught::Panic(Some(message)) => message.to_string(),
            Caught::Panic(None) | Caught::Nothing => return None,
        };
        Some(
            ErrorRecord::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "An unexpected error occurred",
            )
            .with_code("INTERNAL_ERROR")
            .with_details(json!({ "message": raw })),
        )
    }
}
