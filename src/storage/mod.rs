//! Storage collaborators for the generic repository
//!
//! The repository builds query documents and aggregation pipelines; a
//! [`DocumentStore`] executes them against one collection. Two backends ship
//! with the crate:
//!
//! - [`MongoStore`]: a `mongodb::Collection<Document>`
//! - [`InMemoryStore`]: a lock-protected vector of documents for tests and
//!   local development

pub mod error;
mod evaluate;
pub mod in_memory;
pub mod mongodb;

pub use error::{FieldIssue, IssueKind, StorageError, StorageFamily, StorageResult};
pub use in_memory::InMemoryStore;
pub use self::mongodb::MongoStore;

use ::mongodb::ClientSession;
use ::mongodb::bson::{Bson, Document};
use ::mongodb::options::{Collation, Hint, ReadConcern, ReadPreference, SelectionCriteria};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared handle to a caller-owned session / transaction.
///
/// The repository only passes it through; starting, committing and aborting
/// stay with the caller.
pub type SessionHandle = Arc<Mutex<ClientSession>>;

/// Optional execution hints for storage calls.
///
/// Every field defaults to `None`, which leaves the storage server's own
/// default behaviour in place. Each hint is applied only when set.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHints {
    /// Session to run the call in. Default: none (implicit session).
    pub session: Option<SessionHandle>,

    /// Let aggregation stages spill to disk. Default: server default.
    pub allow_disk_use: Option<bool>,

    /// Server-side time limit. Default: unlimited.
    pub max_time: Option<Duration>,

    /// Read preference / server selection. Default: primary.
    pub selection_criteria: Option<SelectionCriteria>,

    /// Read concern. Default: the collection's read concern.
    pub read_concern: Option<ReadConcern>,

    /// Index to use. Default: chosen by the query planner.
    pub hint: Option<Hint>,

    /// String comparison rules. Default: binary comparison.
    pub collation: Option<Collation>,
}

impl ExecutionHints {
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = Some(allow);
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_read_preference(mut self, preference: ReadPreference) -> Self {
        self.selection_criteria = Some(SelectionCriteria::ReadPreference(preference));
        self
    }

    pub fn with_read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = Some(read_concern);
        self
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Fill every unset hint from `fallback`.
    pub fn or(&self, fallback: &ExecutionHints) -> ExecutionHints {
        ExecutionHints {
            session: self.session.clone().or_else(|| fallback.session.clone()),
            allow_disk_use: self.allow_disk_use.or(fallback.allow_disk_use),
            max_time: self.max_time.or(fallback.max_time),
            selection_criteria: self
                .selection_criteria
                .clone()
                .or_else(|| fallback.selection_criteria.clone()),
            read_concern: self
                .read_concern
                .clone()
                .or_else(|| fallback.read_concern.clone()),
            hint: self.hint.clone().or_else(|| fallback.hint.clone()),
            collation: self.collation.clone().or_else(|| fallback.collation.clone()),
        }
    }
}

/// A multi-document read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

/// One collection of documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Collection name, used in logs
    fn name(&self) -> &str;

    /// Insert a document, returning its `_id`
    async fn insert_one(&self, document: Document, hints: &ExecutionHints) -> StorageResult<Bson>;

    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
        hints: &ExecutionHints,
    ) -> StorageResult<Option<Document>>;

    async fn find(&self, query: FindQuery, hints: &ExecutionHints) -> StorageResult<Vec<Document>>;

    async fn count(&self, filter: Document, hints: &ExecutionHints) -> StorageResult<u64>;

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        hints: &ExecutionHints,
    ) -> StorageResult<Vec<Document>>;

    /// Apply `update` to the first match and return the document after the update
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        hints: &ExecutionHints,
    ) -> StorageResult<Option<Document>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_default_to_unset() {
        let hints = ExecutionHints::default();
        assert!(hints.session.is_none());
        assert!(hints.allow_disk_use.is_none());
        assert!(hints.max_time.is_none());
        assert!(hints.selection_criteria.is_none());
        assert!(hints.read_concern.is_none());
        assert!(hints.hint.is_none());
        assert!(hints.collation.is_none());
    }

    #[test]
    fn test_hints_or_prefers_explicit_values() {
        let base = ExecutionHints::default()
            .with_allow_disk_use(false)
            .with_max_time(Duration::from_secs(5));
        let explicit = ExecutionHints::default().with_max_time(Duration::from_secs(1));

        let merged = explicit.or(&base);
        assert_eq!(merged.allow_disk_use, Some(false));
        assert_eq!(merged.max_time, Some(Duration::from_secs(1)));
    }
}
