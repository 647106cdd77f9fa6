//! # Tradebook Data
//!
//! Data-access and error-normalization layer for a backend managing trading
//! accounts and their ledger transactions.
//!
//! ## Features
//!
//! - **Query Decoding**: quote-tolerant filter strings, signed sort tokens and
//!   page/length pairs decoded into typed predicates, checked against a
//!   per-endpoint allow-list
//! - **Generic Repository**: CRUD with soft deletion and hidden credential
//!   fields, plus paginated listing through find + count or one aggregation
//! - **Execution Hints**: sessions, time limits, read preference and friends,
//!   each optional and applied only when set
//! - **Error Classification**: an ordered rule chain mapping any failure to one
//!   `{status, message, type, code, details}` record
//! - **Error Boundary**: axum middleware that logs failures with redacted
//!   request context and renders the uniform JSON error body
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tradebook::prelude::*;
//!
//! async fn list_accounts(
//!     State(accounts): State<Repository<TradingAccount>>,
//!     Query(params): Query<QueryParams>,
//! ) -> HandlerResult<Json<ListResult<TradingAccount>>> {
//!     let params = ListParams::for_entity::<TradingAccount>(params);
//!     Ok(Json(accounts.list(&params, &ExecutionHints::default()).await?))
//! }
//!
//! let config = AppConfig::from_env();
//! init_tracing(&config);
//!
//! let client = mongodb::Client::with_uri_str("mongodb://localhost:27017").await?;
//! let accounts = Repository::<TradingAccount>::new(MongoStore::new(
//!     client.database("trading"),
//!     TradingAccount::collection_name(),
//! ));
//!
//! let routes = Router::new()
//!     .route("/accounts", get(list_accounts))
//!     .with_state(accounts);
//!
//! ServerBuilder::new(config)
//!     .with_routes(routes)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        classify::{Caught, Classifier, ErrorMessage, ErrorRecord, ErrorRule},
        entity::Entity,
        error::{ApiError, EntityError, HttpException, QueryError, RequestError, parse_object_id},
        query::{
            FilterExpr, PageRequest, PaginationResult, QueryParams, SortDirection, SortSpec,
            decode_filter, decode_sort, pagination_request, pagination_result,
        },
        repository::{ListParams, ListResult, Repository},
    };

    // === Macros ===
    pub use crate::{impl_entity, one_of_validator};

    // === Entities ===
    pub use crate::entities::{TradingAccount, Transaction};

    // === Storage ===
    pub use crate::storage::{
        DocumentStore, ExecutionHints, FindQuery, InMemoryStore, MongoStore, SessionHandle,
        StorageError,
    };

    // === Config ===
    pub use crate::config::{AppConfig, RuntimeMode, init_tracing};

    // === Server ===
    pub use crate::server::{
        ErrorBoundary, Failure, HandlerResult, Json, Path, Query, ServerBuilder, with_error_boundary,
    };

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use mongodb::bson::{Document, doc, oid::ObjectId};
    pub use serde::{Deserialize, Serialize};

    // === Axum ===
    pub use axum::{
        Router,
        extract::State,
        routing::{delete, get, patch, post},
    };
}
