//! Error boundary for axum routers
//!
//! Handlers return [`Failure`] (or anything convertible into it). The
//! failure travels out of the handler inside the response extensions, and
//! the [`error_boundary`] middleware turns it into the uniform JSON error
//! body after classifying and logging it. Panics are caught by
//! `CatchPanicLayer` and take the same path.
//!
//! ```json
//! {
//!   "success": false,
//!   "error": {
//!     "type": "DuplicateKeyError",
//!     "message": "A record with email 'a@b.com' already exists",
//!     "code": "DUPLICATE_KEY",
//!     "timestamp": "2024-03-15T10:21:03.120Z",
//!     "path": "/accounts",
//!     "method": "POST"
//!   }
//! }
//! ```
//!
//! `details` is added to the error object outside production.

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::{StreamExt, future, stream};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::redact::redact;
use crate::config::{AppConfig, BoundaryConfig, RuntimeMode};
use crate::core::classify::{Caught, Classifier, ErrorMessage, ErrorRecord};

/// Header carrying the id under which a failure was logged
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// =============================================================================
// Failure
// =============================================================================

/// Error type for handlers behind the boundary.
///
/// Anything convertible into `anyhow::Error` converts into `Failure`, so `?`
/// works on repository calls, decoders and third-party errors alike.
#[derive(Debug)]
pub struct Failure(anyhow::Error);

impl Failure {
    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

impl<E> From<E> for Failure
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Failure(err.into())
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

/// Without the boundary installed this is a bare 500.
impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let mut response = axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response
            .extensions_mut()
            .insert(CaughtFailure::Error(Arc::new(self.0)));
        response
    }
}

/// Result alias for handlers
pub type HandlerResult<T> = Result<T, Failure>;

/// Marker left in response extensions for the boundary to pick up
#[derive(Debug, Clone)]
pub enum CaughtFailure {
    Error(Arc<anyhow::Error>),
    Panic(Option<String>),
}

impl CaughtFailure {
    pub fn as_caught(&self) -> Caught<'_> {
        match self {
            CaughtFailure::Error(err) => Caught::Error(err),
            CaughtFailure::Panic(message) => Caught::Panic(message.as_deref()),
        }
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()));

    let mut response = axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response
        .extensions_mut()
        .insert(CaughtFailure::Panic(message));
    response
}

// =============================================================================
// Request context
// =============================================================================

/// What the boundary records about the request that failed
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub user_agent: Option<String>,
    pub client_addr: Option<String>,
    /// Buffered request body; `None` when it was too large to keep
    pub body: Option<Bytes>,
}

impl RequestContext {
    pub fn from_request(request: &Request) -> Self {
        let headers = request.headers();
        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: Query::<HashMap<String, String>>::try_from_uri(request.uri())
                .map(|Query(query)| query)
                .unwrap_or_default(),
            user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
            client_addr: client_addr(headers, request.extensions().get::<ConnectInfo<SocketAddr>>()),
            body: None,
        }
    }

    /// Body as it may appear in logs
    pub fn redacted_body(&self, placeholder: &str) -> String {
        match &self.body {
            None => "[omitted]".to_string(),
            Some(bytes) if bytes.is_empty() => String::new(),
            Some(bytes) => match serde_json::from_slice::<Value>(bytes) {
                Ok(value) => redact(&value, placeholder).to_string(),
                Err(_) => format!("[{} bytes, not JSON]", bytes.len()),
            },
        }
    }

    /// Query parameters as they may appear in logs
    pub fn redacted_query(&self, placeholder: &str) -> String {
        let query = serde_json::to_value(&self.query).unwrap_or(Value::Null);
        redact(&query, placeholder).to_string()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// First `x-forwarded-for` hop, else the peer address
fn client_addr(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(|hop| hop.trim().to_string())
        .filter(|hop| !hop.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.to_string()))
}

// =============================================================================
// Boundary
// =============================================================================

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: ErrorPayload<'a>,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    #[serde(rename = "type")]
    error_type: &'a str,
    message: &'a ErrorMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    timestamp: String,
    path: &'a str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

/// Classifies, logs and renders failures. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ErrorBoundary {
    classifier: Arc<Classifier>,
    mode: RuntimeMode,
    config: BoundaryConfig,
}

impl ErrorBoundary {
    pub fn new(classifier: Classifier, mode: RuntimeMode, config: BoundaryConfig) -> Self {
        Self {
            classifier: Arc::new(classifier),
            mode,
            config,
        }
    }

    /// Standard classifier with the mode and limits from `config`
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Classifier::standard(), config.mode, config.boundary.clone())
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classify `caught`, log it, and build the error response
    pub fn respond(&self, context: &RequestContext, caught: &Caught<'_>) -> Response {
        let record = self.classifier.classify(caught);
        let correlation_id = Uuid::new_v4();
        let timestamp = Utc::now();

        self.log(&record, context, caught, correlation_id, timestamp);

        let body = self.render(&record, context, timestamp);
        let mut response = (record.status(), Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }

    /// The JSON error body; `details` only outside production
    pub fn render(&self, record: &ErrorRecord, context: &RequestContext, timestamp: DateTime<Utc>) -> Value {
        let body = ErrorBody {
            success: false,
            error: ErrorPayload {
                error_type: record.error_type(),
                message: record.message(),
                code: record.code(),
                timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                path: &context.path,
                method: context.method.as_str(),
                details: record.details().filter(|_| !self.mode.is_production()),
            },
        };
        serde_json::to_value(body).unwrap_or(Value::Null)
    }

    fn log(
        &self,
        record: &ErrorRecord,
        context: &RequestContext,
        caught: &Caught<'_>,
        correlation_id: Uuid,
        timestamp: DateTime<Utc>,
    ) {
        let placeholder = &self.config.redaction_placeholder;
        let cause = match caught {
            Caught::Error(err) => format!("{:#}", err),
            Caught::Panic(Some(message)) => format!("panic: {}", message),
            Caught::Panic(None) => "panic with opaque payload".to_string(),
            Caught::Nothing => "nothing caught".to_string(),
        };
        let body = context.redacted_body(placeholder);
        let query = context.redacted_query(placeholder);
        let message = record.message().joined();
        let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);

        if record.status().is_server_error() {
            tracing::error!(
                correlation_id = %correlation_id,
                method = %context.method,
                path = %context.path,
                status = record.status().as_u16(),
                error_type = record.error_type(),
                error_code = record.code(),
                message = %message,
                cause = %cause,
                user_agent = context.user_agent.as_deref(),
                client_addr = context.client_addr.as_deref(),
                query = %query,
                body = %body,
                details = ?record.details(),
                timestamp = %timestamp,
                "request failed"
            );
        } else {
            tracing::warn!(
                correlation_id = %correlation_id,
                method = %context.method,
                path = %context.path,
                status = record.status().as_u16(),
                error_type = record.error_type(),
                error_code = record.code(),
                message = %message,
                cause = %cause,
                user_agent = context.user_agent.as_deref(),
                client_addr = context.client_addr.as_deref(),
                query = %query,
                body = %body,
                details = ?record.details(),
                timestamp = %timestamp,
                "request rejected"
            );
        }
    }
}

/// Middleware running every request under the boundary.
///
/// Install with [`with_error_boundary`] so the panic layer sits inside it.
pub async fn error_boundary(
    State(boundary): State<ErrorBoundary>,
    request: Request,
    next: Next,
) -> Response {
    let mut context = RequestContext::from_request(&request);
    let limit = boundary.config.max_logged_body_bytes;

    let declared_len = header_str(request.headers(), header::CONTENT_LENGTH.as_str())
        .and_then(|len| len.parse::<usize>().ok());

    let request = if declared_len.is_some_and(|len| len > limit) {
        request
    } else {
        let (parts, body) = request.into_parts();
        let (logged, body) = buffer_body(body, limit).await;
        context.body = logged;
        Request::from_parts(parts, body)
    };

    let response = next.run(request).await;

    match response.extensions().get::<CaughtFailure>().cloned() {
        Some(failure) => boundary.respond(&context, &failure.as_caught()),
        None => response,
    }
}

/// Buffer up to `limit` bytes of `body` for logging.
///
/// Returns the buffered bytes and a body carrying the same content. Past the
/// limit, or on a read error, nothing is kept for logging and the body is
/// handed on as a stream: the bytes already read followed by the rest.
async fn buffer_body(body: Body, limit: usize) -> (Option<Bytes>, Body) {
    let mut frames = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut read = 0;

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(chunk) => {
                read += chunk.len();
                chunks.push(chunk);
                if read > limit {
                    let prefix = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
                    return (None, Body::from_stream(prefix.chain(frames)));
                }
            }
            Err(err) => {
                let prefix = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
                let failed = stream::once(future::ready(Err(err)));
                return (None, Body::from_stream(prefix.chain(failed)));
            }
        }
    }

    let bytes = Bytes::from(chunks.concat());
    (Some(bytes.clone()), Body::from(bytes))
}

/// Wrap `router` in the panic catcher, the error boundary and request tracing.
pub fn with_error_boundary(router: Router, boundary: ErrorBoundary) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(boundary, error_boundary))
        .layer(TraceLayer::new_for_http())
}
