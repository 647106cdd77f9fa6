//! Extractors whose rejections go through the error boundary
//!
//! Drop-in replacements for axum's `Json`, `Path` and `Query`. A failed
//! extraction becomes a [`Failure`] carrying a [`RequestError`], so clients
//! get the uniform error body instead of axum's plain-text rejection.
//!
//! ```rust,ignore
//! use tradebook::prelude::*;
//!
//! async fn create_transaction(
//!     State(repo): State<Repository<Transaction>>,
//!     Json(input): Json<Transaction>,
//! ) -> HandlerResult<Json<Transaction>> {
//!     input.validate()?;
//!     Ok(Json(repo.create(&input).await?))
//! }
//! ```

use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::boundary::Failure;
use crate::core::error::{ApiError, RequestError};

fn rejected(err: RequestError) -> Failure {
    Failure::from(ApiError::from(err))
}

/// JSON request body, and JSON response body
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Failure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(rejected(RequestError::from(&rejection))),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Typed path parameters
#[derive(Debug, Clone)]
pub struct Path<T>(pub T);

impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Failure;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Path(value)) => Ok(Path(value)),
            Err(rejection) => Err(rejected(RequestError::from(&rejection))),
        }
    }
}

/// Typed query string
#[derive(Debug, Clone, Default)]
pub struct Query<T>(pub T);

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Failure;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Query::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Query(value)) => Ok(Query(value)),
            Err(rejection) => Err(rejected(RequestError::from(&rejection))),
        }
    }
}
