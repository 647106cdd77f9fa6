//! HTTP edge of the crate
//!
//! - [`boundary`]: the error boundary turning failures into the uniform error body
//! - [`builder`]: `ServerBuilder` assembling routes behind the boundary
//! - [`extract`]: `Json`, `Path` and `Query` extractors that reject through the boundary
//! - [`redact`]: masking of sensitive values before logging

pub mod boundary;
pub mod builder;
pub mod extract;
pub mod redact;

pub use boundary::{
    CORRELATION_HEADER, CaughtFailure, ErrorBoundary, Failure, HandlerResult, RequestContext,
    error_boundary, with_error_boundary,
};
pub use builder::ServerBuilder;
pub use extract::{Json, Path, Query};
pub use redact::{is_sensitive_key, redact};
