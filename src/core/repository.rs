//! Generic repository over one entity collection
//!
//! [`Repository`] wraps a [`DocumentStore`] and adds the conventions every
//! collection shares: soft deletion, hidden credential fields and the
//! paginated listing driven by client query parameters.

use anyhow::Result;
use mongodb::bson::{Bson, DateTime as BsonDateTime, Document, doc};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::PaginationConfig;
use crate::core::entity::{DELETED_AT, DELETED_FLAG, Entity, UPDATED_AT};
use crate::core::error::ApiError;
use crate::core::query::{
    PageRequest, PaginationResult, QueryParams, SortSpec, decode_filter, decode_sort,
    pagination_request, pagination_result,
};
use crate::storage::{
    DocumentStore, ExecutionHints, FindQuery, MongoStore, SessionHandle, StorageError,
};

/// Page length used when the client sends none
pub const DEFAULT_PAGE_LENGTH: u64 = 10;

/// Field listings sort on, newest first, when the client sends no sort
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

/// Everything `list` needs besides execution hints
#[derive(Debug, Clone)]
pub struct ListParams {
    /// Raw client parameters
    pub query: QueryParams,

    /// Fields the endpoint allows in filters
    pub filterable_fields: Vec<String>,

    /// Run as one aggregation (`$match` + `$facet`) instead of find + count
    pub use_aggregation: bool,

    /// Stages placed before the generated `$match` (aggregation only)
    pub pipeline: Vec<Document>,

    /// Fields stripped from results in addition to the entity's hidden fields
    pub exclude_fields: Vec<String>,

    /// Ordering applied when the client sends no sort
    pub default_sort: SortSpec,

    /// Page length applied when the client sends none
    pub default_length: u64,
}

impl ListParams {
    pub fn new(query: QueryParams) -> Self {
        Self {
            query,
            filterable_fields: Vec::new(),
            use_aggregation: false,
            pipeline: Vec::new(),
            exclude_fields: Vec::new(),
            default_sort: SortSpec::descending(DEFAULT_SORT_FIELD),
            default_length: DEFAULT_PAGE_LENGTH,
        }
    }

    /// Parameters using `T`'s declared filterable fields
    pub fn for_entity<T: Entity>(query: QueryParams) -> Self {
        Self::new(query).filterable(T::filterable_fields().iter().copied())
    }

    pub fn filterable<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.filterable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Execute through the aggregation path, with `stages` placed first
    pub fn aggregated(mut self, stages: Vec<Document>) -> Self {
        self.use_aggregation = true;
        self.pipeline = stages;
        self
    }

    pub fn exclude<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.exclude_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn default_sort(mut self, sort: SortSpec) -> Self {
        self.default_sort = sort;
        self
    }

    pub fn default_length(mut self, length: u64) -> Self {
        self.default_length = length;
        self
    }

    /// Take the default length and sort field from configuration
    pub fn with_defaults(self, config: &PaginationConfig) -> Self {
        self.default_length(config.default_length)
            .default_sort(SortSpec::descending(config.default_sort_field.clone()))
    }
}

/// One page of entities with its pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct ListResult<T> {
    pub data: Vec<T>,
    pub pagination: PaginationResult,
}

/// Repository for entity type `T` stored in `S`.
///
/// Storage failures are not caught here; they propagate as
/// [`StorageError`]s inside `anyhow::Error` for the error boundary to
/// classify.
///
/// # Example
///
/// ```rust,ignore
/// let accounts = Repository::<TradingAccount, _>::new(InMemoryStore::new("accounts"));
/// let page = accounts
///     .list(&ListParams::for_entity::<TradingAccount>(params), &ExecutionHints::default())
///     .await?;
/// ```
pub struct Repository<T, S = MongoStore> {
    store: Arc<S>,
    hints: ExecutionHints,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> Clone for Repository<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            hints: self.hints.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity, S: DocumentStore> Repository<T, S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            hints: ExecutionHints::default(),
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// A view of this repository whose calls all run in `session`.
    ///
    /// The caller owns the session: starting, committing and aborting the
    /// transaction never happen here.
    pub fn in_session(&self, session: SessionHandle) -> Self {
        let mut repository = self.clone();
        repository.hints.session = Some(session);
        repository
    }

    /// Hints applied to every call unless a call overrides them
    pub fn with_hints(mut self, hints: ExecutionHints) -> Self {
        self.hints = hints;
        self
    }

    /// Insert a new entity and return it as stored.
    pub async fn create(&self, entity: &T) -> Result<T> {
        let mut document = mongodb::bson::to_document(entity).map_err(StorageError::serialization)?;
        if !document.contains_key(DELETED_FLAG) {
            document.insert(DELETED_FLAG, false);
        }

        let id = self.store.insert_one(document, &self.hints).await?;
        tracing::debug!(collection = self.store.name(), id = %id, "created document");

        let created = self
            .store
            .find_one(doc! { "_id": id.clone() }, Self::default_projection(), &self.hints)
            .await?
            .ok_or_else(|| StorageError::DocumentNotFound {
                filter: format!("{{ _id: {} }}", id),
            })?;

        Ok(Self::decode(created)?)
    }

    /// First live document matching `filter`.
    ///
    /// Without a projection, the entity's hidden fields are excluded.
    pub async fn find_one(&self, filter: Document, projection: Option<Document>) -> Result<Option<T>> {
        let found = self
            .store
            .find_one(
                exclude_deleted(filter),
                projection.or_else(Self::default_projection),
                &self.hints,
            )
            .await?;

        Ok(found.map(Self::decode).transpose()?)
    }

    /// Every live document matching `filter`.
    pub async fn find(&self, filter: Document, projection: Option<Document>) -> Result<Vec<T>> {
        let query = FindQuery {
            filter: exclude_deleted(filter),
            projection: projection.or_else(Self::default_projection),
            ..FindQuery::default()
        };
        let documents = self.store.find(query, &self.hints).await?;

        Ok(documents
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Every live document in the collection.
    pub async fn find_all(&self, projection: Option<Document>) -> Result<Vec<T>> {
        self.find(Document::new(), projection).await
    }

    pub async fn find_by_id(&self, id: &ObjectId, projection: Option<Document>) -> Result<Option<T>> {
        self.find_one(doc! { "_id": *id }, projection).await
    }

    /// Set the given fields on the identified live document.
    ///
    /// Returns `None` when no live document has this id; soft-deleted
    /// records are left untouched.
    pub async fn update<U: Serialize>(&self, id: &ObjectId, changes: &U) -> Result<Option<T>> {
        let mut changes =
            mongodb::bson::to_document(changes).map_err(StorageError::serialization)?;
        changes.remove("_id");
        // TODO: drop this write once every stored record carries the flag; it only matches live records now.
        changes.insert(DELETED_FLAG, false);
        changes.insert(UPDATED_AT, BsonDateTime::now());

        let updated = self
            .store
            .find_one_and_update(
                exclude_deleted(doc! { "_id": *id }),
                doc! { "$set": changes },
                &self.hints,
            )
            .await?;

        Ok(updated.map(Self::decode_visible).transpose()?)
    }

    /// Soft-delete the identified document.
    ///
    /// Returns `None` when no live document has this id. Nothing is ever
    /// physically removed.
    pub async fn delete(&self, id: &ObjectId) -> Result<Option<T>> {
        let deleted = self
            .store
            .find_one_and_update(
                exclude_deleted(doc! { "_id": *id }),
                doc! { "$set": { DELETED_FLAG: true, DELETED_AT: BsonDateTime::now() } },
                &self.hints,
            )
            .await?;

        if deleted.is_some() {
            tracing::debug!(collection = self.store.name(), id = %id, "soft-deleted document");
        }

        Ok(deleted.map(Self::decode_visible).transpose()?)
    }

    /// Decode client parameters and return one page of live documents.
    ///
    /// Data and total count always come from the same predicate: the decoded
    /// filter AND `isDeleted != true`. Ordering ends on `_id` so documents
    /// tied on the sort keys come back in the same order on both paths and
    /// never straddle a page boundary.
    pub async fn list(&self, params: &ListParams, hints: &ExecutionHints) -> Result<ListResult<T>> {
        let filter = decode_filter(params.query.filter.as_deref(), &params.filterable_fields)
            .map_err(ApiError::from)?;
        let sort = decode_sort(params.query.sort.as_deref())
            .map_err(ApiError::from)?
            .unwrap_or_else(|| params.default_sort.clone())
            .with_tiebreaker("_id");
        let page = pagination_request(
            params.query.page.as_deref(),
            params.query.length.as_deref(),
            params.default_length,
        );

        let predicate = exclude_deleted(filter.to_document());
        let sort = (!sort.is_empty()).then(|| sort.to_document());
        let exclusions = exclusion(
            T::hidden_fields()
                .iter()
                .copied()
                .chain(params.exclude_fields.iter().map(String::as_str)),
        );
        let hints = hints.or(&self.hints);

        tracing::debug!(
            collection = self.store.name(),
            predicate = %predicate,
            skip = page.skip,
            limit = page.limit,
            aggregated = params.use_aggregation,
            "listing documents"
        );

        let (documents, total) = if params.use_aggregation {
            self.list_aggregated(&params.pipeline, predicate, sort, exclusions, page, &hints)
                .await?
        } else {
            self.list_with_find(predicate, sort, exclusions, page, &hints)
                .await?
        };

        let data = documents
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResult {
            data,
            pagination: pagination_result(total, &page),
        })
    }

    /// Find and count issued concurrently against the same predicate.
    async fn list_with_find(
        &self,
        predicate: Document,
        sort: Option<Document>,
        projection: Option<Document>,
        page: PageRequest,
        hints: &ExecutionHints,
    ) -> Result<(Vec<Document>, u64), StorageError> {
        let query = FindQuery {
            filter: predicate.clone(),
            sort,
            skip: Some(page.skip),
            limit: Some(i64::try_from(page.limit).unwrap_or(i64::MAX)),
            projection,
        };

        tokio::try_join!(self.store.find(query, hints), self.store.count(predicate, hints))
    }

    /// One pipeline: caller stages, `$match`, then a `$facet` computing the
    /// page and the total count from the same filtered set.
    async fn list_aggregated(
        &self,
        stages: &[Document],
        predicate: Document,
        sort: Option<Document>,
        projection: Option<Document>,
        page: PageRequest,
        hints: &ExecutionHints,
    ) -> Result<(Vec<Document>, u64), StorageError> {
        let mut data_branch = Vec::new();
        if let Some(sort) = sort {
            data_branch.push(doc! { "$sort": sort });
        }
        data_branch.push(doc! { "$skip": i64::try_from(page.skip).unwrap_or(i64::MAX) });
        data_branch.push(doc! { "$limit": i64::try_from(page.limit).unwrap_or(i64::MAX) });
        if let Some(projection) = projection {
            data_branch.push(doc! { "$project": projection });
        }

        let mut pipeline = stages.to_vec();
        pipeline.push(doc! { "$match": predicate });
        pipeline.push(doc! {
            "$facet": {
                "data": data_branch,
                "total": [{ "$count": "count" }],
            }
        });

        let facet = self
            .store
            .aggregate(pipeline, hints)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let documents = match facet.get("data") {
            Some(Bson::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_document().cloned())
                .collect(),
            _ => Vec::new(),
        };

        // `$count` emits nothing for an empty input set
        let total = facet
            .get_array("total")
            .ok()
            .and_then(|total| total.first())
            .and_then(Bson::as_document)
            .and_then(|d| d.get("count"))
            .and_then(as_count)
            .unwrap_or(0);

        Ok((documents, total))
    }

    fn default_projection() -> Option<Document> {
        exclusion(T::hidden_fields().iter().copied())
    }

    fn decode(document: Document) -> Result<T, StorageError> {
        mongodb::bson::from_document(document).map_err(StorageError::serialization)
    }

    /// Decode a document returned by a write, dropping hidden fields first.
    fn decode_visible(mut document: Document) -> Result<T, StorageError> {
        for field in T::hidden_fields() {
            document.remove(*field);
        }
        Self::decode(document)
    }
}

/// AND a filter with `isDeleted != true`, unless it already constrains the flag.
fn exclude_deleted(filter: Document) -> Document {
    if filter.contains_key(DELETED_FLAG) {
        return filter;
    }

    let live = doc! { DELETED_FLAG: { "$ne": true } };
    if filter.is_empty() {
        live
    } else {
        doc! { "$and": [filter, live] }
    }
}

fn exclusion<'a>(fields: impl IntoIterator<Item = &'a str>) -> Option<Document> {
    let mut projection = Document::new();
    for field in fields {
        projection.insert(field, 0);
    }
    (!projection.is_empty()).then_some(projection)
}

fn as_count(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        Bson::Double(n) if *n >= 0.0 => Some(*n as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_deleted_wraps_filter() {
        assert_eq!(
            exclude_deleted(Document::new()),
            doc! { "isDeleted": { "$ne": true } }
        );
        assert_eq!(
            exclude_deleted(doc! { "status": "open" }),
            doc! { "$and": [{ "status": "open" }, { "isDeleted": { "$ne": true } }] }
        );
    }

    #[test]
    fn test_explicit_deleted_query_is_kept() {
        assert_eq!(
            exclude_deleted(doc! { "isDeleted": true }),
            doc! { "isDeleted": true }
        );
    }

    #[test]
    fn test_exclusion_projection() {
        assert_eq!(exclusion([]), None);
        assert_eq!(
            exclusion(["password", "server"]),
            Some(doc! { "password": 0, "server": 0 })
        );
    }

    #[test]
    fn test_list_params_builders() {
        let params = ListParams::new(QueryParams::default())
            .filterable(["status", "amount"])
            .aggregated(vec![doc! { "$match": { "kind": "deposit" } }])
            .exclude(["note"])
            .default_length(25);
        assert_eq!(params.filterable_fields, vec!["status", "amount"]);
        assert!(params.use_aggregation);
        assert_eq!(params.pipeline.len(), 1);
        assert_eq!(params.exclude_fields, vec!["note"]);
        assert_eq!(params.default_length, 25);
        assert_eq!(params.default_sort.to_document(), doc! { "createdAt": -1 });
    }

    #[test]
    fn test_as_count() {
        assert_eq!(as_count(&Bson::Int32(3)), Some(3));
        assert_eq!(as_count(&Bson::Int64(-1)), None);
        assert_eq!(as_count(&Bson::String("3".into())), None);
    }
}
