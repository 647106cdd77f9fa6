//! Entity trait describing how a document type is stored and listed

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Name of the soft-delete flag carried by every stored document
pub const DELETED_FLAG: &str = "isDeleted";

/// Timestamp written when a document is soft-deleted
pub const DELETED_AT: &str = "deletedAt";

/// Timestamp written on every update
pub const UPDATED_AT: &str = "updatedAt";

/// Base trait for all stored entities.
///
/// An entity maps one-to-one onto a collection. Read operations hide
/// soft-deleted documents and strip [`hidden_fields`](Entity::hidden_fields)
/// unless the caller supplies its own projection.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Collection name (e.g., "accounts", "transactions")
    fn collection_name() -> &'static str;

    /// Singular name used in messages (e.g., "account")
    fn entity_name() -> &'static str;

    /// Fields removed from every read by default
    fn hidden_fields() -> &'static [&'static str] {
        &["password"]
    }

    /// Fields clients may reference in listing filters
    fn filterable_fields() -> &'static [&'static str];
}
