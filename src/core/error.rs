//! Typed errors raised by the data-access layer itself
//!
//! These are the "HTTP exceptions" of the crate: each carries its own status
//! code, a stable machine-readable code and an error type name. The error
//! classifier passes them through unchanged, so clients always see the same
//! wording whether a handler returns them directly or they bubble up from the
//! repository.
//!
//! # Error Categories
//!
//! - [`QueryError`]: malformed or disallowed listing parameters
//! - [`EntityError`]: lookups that miss or receive an invalid identifier
//! - [`RequestError`]: request bodies, paths and query strings that fail to extract
//!
//! # Example
//!
//! ```rust,ignore
//! use tradebook::prelude::*;
//!
//! async fn get_account(repo: &Repository<TradingAccount>, id: &str) -> Result<TradingAccount, Failure> {
//!     let id = parse_object_id(id)?;
//!     let account = repo.find_by_id(&id, None).await?;
//!     account.ok_or_else(|| EntityError::not_found("account", id).into())
//! }
//! ```

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mongodb::bson::oid::ObjectId;
use std::fmt;

use crate::server::Failure;

/// Behaviour shared by every error that already knows its HTTP mapping.
pub trait HttpException: std::error::Error + Send + Sync + 'static {
    /// HTTP status to respond with
    fn status_code(&self) -> StatusCode;

    /// Stable code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Error type name shown to clients
    fn error_type(&self) -> &'static str;

    /// Optional structured details
    fn details(&self) -> Option<serde_json::Value> {
        None
    }
}

/// The main error type raised by this crate's own code paths
#[derive(Debug)]
pub enum ApiError {
    /// Listing parameter errors
    Query(QueryError),

    /// Entity lookup errors
    Entity(EntityError),

    /// HTTP/Request errors
    Request(RequestError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Query(e) => write!(f, "{}", e),
            ApiError::Entity(e) => write!(f, "{}", e),
            ApiError::Request(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Query(e) => Some(e),
            ApiError::Entity(e) => Some(e),
            ApiError::Request(e) => Some(e),
        }
    }
}

impl HttpException for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Query(e) => e.status_code(),
            ApiError::Entity(e) => e.status_code(),
            ApiError::Request(e) => e.status_code(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::Query(e) => e.error_code(),
            ApiError::Entity(e) => e.error_code(),
            ApiError::Request(e) => e.error_code(),
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::Query(e) => e.error_type(),
            ApiError::Entity(e) => e.error_type(),
            ApiError::Request(e) => e.error_type(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Query(e) => e.details(),
            ApiError::Entity(e) => e.details(),
            ApiError::Request(e) => e.details(),
        }
    }
}

/// Handlers may return `ApiError` directly; it still goes through the boundary.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Failure::from(self).into_response()
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors raised while decoding filter, sort and pagination parameters
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The filter string is not a well-formed filter expression
    InvalidFilterFormat { message: String },

    /// The sort string is not a signed field token or an array of them
    InvalidSortFormat { message: String },

    /// The filter references fields outside the endpoint's allow-list
    FieldNotFilterable { fields: Vec<String> },

    /// A `field__op` key names an operator that does not exist
    UnknownOperator { key: String, operator: String },
}

impl QueryError {
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        QueryError::InvalidFilterFormat {
            message: message.into(),
        }
    }

    pub fn invalid_sort(message: impl Into<String>) -> Self {
        QueryError::InvalidSortFormat {
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // parser text stays in `details`
            QueryError::InvalidFilterFormat { .. } => write!(f, "Invalid filter format"),
            QueryError::InvalidSortFormat { .. } => write!(f, "Invalid sort format"),
            QueryError::FieldNotFilterable { fields } => {
                let quoted: Vec<String> = fields.iter().map(|name| format!("'{}'", name)).collect();
                if fields.len() == 1 {
                    write!(f, "Field {} is not filterable", quoted.join(", "))
                } else {
                    write!(f, "Fields {} are not filterable", quoted.join(", "))
                }
            }
            QueryError::UnknownOperator { key, operator } => {
                write!(f, "Unknown filter operator '{}' in '{}'", operator, key)
            }
        }
    }
}

impl std::error::Error for QueryError {}

impl HttpException for QueryError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_code(&self) -> &'static str {
        match self {
            QueryError::InvalidFilterFormat { .. } => "INVALID_FILTER_FORMAT",
            QueryError::InvalidSortFormat { .. } => "INVALID_SORT_FORMAT",
            QueryError::FieldNotFilterable { .. } => "FIELD_NOT_FILTERABLE",
            QueryError::UnknownOperator { .. } => "UNKNOWN_FILTER_OPERATOR",
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            QueryError::InvalidFilterFormat { .. } => "InvalidFilterFormat",
            QueryError::InvalidSortFormat { .. } => "InvalidSortFormat",
            QueryError::FieldNotFilterable { .. } => "FieldNotFilterable",
            QueryError::UnknownOperator { .. } => "UnknownOperator",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            QueryError::FieldNotFilterable { fields } => {
                Some(serde_json::json!({ "fields": fields }))
            }
            QueryError::UnknownOperator { operator, .. } => Some(serde_json::json!({
                "operator": operator,
                "allowed": crate::core::query::Operator::NAMES,
            })),
            QueryError::InvalidFilterFormat { message }
            | QueryError::InvalidSortFormat { message } => {
                Some(serde_json::json!({ "reason": message }))
            }
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Query(err)
    }
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Errors related to entity lookups
#[derive(Debug, Clone, PartialEq)]
pub enum EntityError {
    /// Entity was not found (or is soft-deleted)
    NotFound { entity_type: String, id: String },

    /// Identifier is not a valid object id
    InvalidId { value: String },
}

impl EntityError {
    pub fn not_found(entity_type: impl Into<String>, id: ObjectId) -> Self {
        EntityError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_hex(),
        }
    }
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::NotFound { entity_type, id } => {
                write!(f, "{} with id '{}' not found", entity_type, id)
            }
            EntityError::InvalidId { value } => {
                write!(f, "Invalid identifier: '{}'", value)
            }
        }
    }
}

impl std::error::Error for EntityError {}

impl HttpException for EntityError {
    fn status_code(&self) -> StatusCode {
        match self {
            EntityError::NotFound { .. } => StatusCode::NOT_FOUND,
            EntityError::InvalidId { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            EntityError::NotFound { .. } => "ENTITY_NOT_FOUND",
            EntityError::InvalidId { .. } => "INVALID_ID",
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            EntityError::NotFound { .. } => "NotFoundError",
            EntityError::InvalidId { .. } => "InvalidIdError",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            EntityError::NotFound { entity_type, id } => Some(serde_json::json!({
                "entity_type": entity_type,
                "id": id,
            })),
            EntityError::InvalidId { .. } => None,
        }
    }
}

impl From<EntityError> for ApiError {
    fn from(err: EntityError) -> Self {
        ApiError::Entity(err)
    }
}

/// Parse a path segment into an object id
pub fn parse_object_id(value: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| {
        ApiError::Entity(EntityError::InvalidId {
            value: value.to_string(),
        })
    })
}

// =============================================================================
// Request Errors
// =============================================================================

/// Request parts that failed to extract.
///
/// Each variant keeps the status the extractor chose (415 for a missing JSON
/// content type, 422 for a body of the wrong shape, 400 otherwise). The
/// extractor's own text goes to `details`, never to the message.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestError {
    /// Body could not be read or deserialized
    InvalidBody { status: StatusCode, reason: String },

    /// Path parameters did not match the route's expected shape
    InvalidPath { status: StatusCode, reason: String },

    /// Query string could not be deserialized
    InvalidQuery { status: StatusCode, reason: String },
}

impl RequestError {
    fn reason(&self) -> &str {
        match self {
            RequestError::InvalidBody { reason, .. }
            | RequestError::InvalidPath { reason, .. }
            | RequestError::InvalidQuery { reason, .. } => reason,
        }
    }
}

impl From<&JsonRejection> for RequestError {
    fn from(rejection: &JsonRejection) -> Self {
        RequestError::InvalidBody {
            status: rejection.status(),
            reason: rejection.body_text(),
        }
    }
}

impl From<&PathRejection> for RequestError {
    fn from(rejection: &PathRejection) -> Self {
        RequestError::InvalidPath {
            status: rejection.status(),
            reason: rejection.body_text(),
        }
    }
}

impl From<&QueryRejection> for RequestError {
    fn from(rejection: &QueryRejection) -> Self {
        RequestError::InvalidQuery {
            status: rejection.status(),
            reason: rejection.body_text(),
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidBody { .. } => write!(f, "Invalid request body"),
            RequestError::InvalidPath { .. } => write!(f, "Invalid path parameter"),
            RequestError::InvalidQuery { .. } => write!(f, "Invalid query string"),
        }
    }
}

impl std::error::Error for RequestError {}

impl HttpException for RequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidBody { status, .. }
            | RequestError::InvalidPath { status, .. }
            | RequestError::InvalidQuery { status, .. } => *status,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::InvalidPath { .. } => "INVALID_PATH",
            RequestError::InvalidQuery { .. } => "INVALID_QUERY",
        }
    }

    fn error_type(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNPROCESSABLE_ENTITY => "UnprocessableEntityError",
            StatusCode::UNSUPPORTED_MEDIA_TYPE => "UnsupportedMediaTypeError",
            status if status.is_server_error() => "InternalServerError",
            _ => "BadRequestError",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "reason": self.reason() }))
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        ApiError::Request(err)
    }
}

// =============================================================================
// Tests
// =============================================================================
