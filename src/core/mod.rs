//! Core module: query decoding, the generic repository and error classification

pub mod classify;
pub mod entity;
pub mod error;
pub mod query;
pub mod repository;

pub use classify::{Caught, Classifier, ErrorMessage, ErrorRecord, ErrorRule};
pub use entity::Entity;
pub use error::{ApiError, EntityError, HttpException, QueryError, RequestError, parse_object_id};
pub use query::{
    FilterExpr, PageRequest, PaginationResult, QueryParams, SortDirection, SortSpec, decode_filter,
    decode_sort, pagination_request, pagination_result,
};
pub use repository::{ListParams, ListResult, Repository};
