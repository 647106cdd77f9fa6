//! Query parameter decoding: filters, sorting and pagination
//!
//! Everything in here is pure. Decoders take the raw strings a client put in
//! the query string and either produce structured values or fail with a
//! [`QueryError`](crate::core::error::QueryError) before anything reaches
//! storage.

pub mod filter;
pub mod pagination;
pub mod sort;

pub use filter::{Condition, Connective, FieldCondition, FilterExpr, Group, Operator, Predicate, decode_filter};
pub use pagination::{PageRequest, PaginationResult, pagination_request, pagination_result};
pub use sort::{SortDirection, SortSpec, decode_sort};

use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Raw listing parameters as they arrive in the query string
///
/// All fields stay strings: decoding (and rejecting) them is the job of the
/// decoders, not of the extractor.
///
/// # Example
/// ```rust,ignore
/// pub async fn list_transactions(
///     State(repo): State<Repository<Transaction>>,
///     Query(params): Query<QueryParams>,
/// ) -> Result<Json<ListResult<Transaction>>, Failure> {
///     Ok(Json(repo.list(&ListParams::for_entity::<Transaction>(params), &ExecutionHints::default()).await?))
/// }
///
/// // Usage:
/// GET /transactions?page=2&length=10
/// GET /transactions?filter={'and':{'status':'settled','amount__gte':100}}&sort=-createdAt
/// GET /transactions?sort=['+currency','-amount']
/// ```
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct QueryParams {
    /// Filter expression (quote-tolerant JSON with `and` / `or` groups)
    pub filter: Option<String>,

    /// Sort expression (`-field`, `+field` or `['+a','-b']`)
    pub sort: Option<String>,

    /// Page number, starting at 1
    pub page: Option<String>,

    /// Items per page
    pub length: Option<String>,
}

impl QueryParams {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_page(mut self, page: impl Into<String>, length: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self.length = Some(length.into());
        self
    }
}

/// Replace single quotes with double quotes so `{'a':1}` parses as JSON.
pub(crate) fn normalize_quotes(raw: &str) -> String {
    raw.replace('\'', "\"")
}

/// Parse `raw` as JSON, retrying with single quotes swapped for double ones.
///
/// Input that is already valid JSON is taken as is, so double-quoted values
/// may contain apostrophes. Single-quoted input cannot: `{'note':'O'Brien'}`
/// is rejected.
pub(crate) fn parse_quote_tolerant<T: DeserializeOwned>(raw: &str) -> serde_json::Result<T> {
    serde_json::from_str(raw).or_else(|_| serde_json::from_str(&normalize_quotes(raw)))
}
