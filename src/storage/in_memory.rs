//! In-memory document store for testing and development

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use std::sync::{Arc, RwLock};

use super::error::{StorageError, StorageResult};
use super::evaluate::{apply_update, lookup, matches, project, run_pipeline, sort_documents};
use super::{DocumentStore, ExecutionHints, FindQuery};

/// In-memory collection
///
/// Documents live in insertion order behind an `RwLock`. Execution hints are
/// accepted and ignored. Fields registered with [`InMemoryStore::unique`]
/// reject duplicates the way a unique index would.
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    name: String,
    documents: Arc<RwLock<Vec<Document>>>,
    unique_fields: Vec<String>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Arc::new(RwLock::new(Vec::new())),
            unique_fields: Vec::new(),
        }
    }

    /// Enforce uniqueness of `field` on insert and update
    pub fn unique(mut self, field: impl Into<String>) -> Self {
        self.unique_fields.push(field.into());
        self
    }

    /// Number of stored documents, soft-deleted ones included
    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Vec<Document>>> {
        self.documents
            .read()
            .map_err(|e| StorageError::other(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Vec<Document>>> {
        self.documents
            .write()
            .map_err(|e| StorageError::other(format!("Failed to acquire write lock: {}", e)))
    }

    fn check_unique(&self, documents: &[Document], candidate: &Document, skip: Option<usize>) -> StorageResult<()> {
        for field in &self.unique_fields {
            let Some(value) = lookup(candidate, field) else {
                continue;
            };
            let clash = documents
                .iter()
                .enumerate()
                .any(|(i, d)| Some(i) != skip && lookup(d, field) == Some(value));
            if clash {
                return Err(StorageError::DuplicateKey {
                    key_value: vec![(field.clone(), value.clone().into_relaxed_extjson())],
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, mut document: Document, _hints: &ExecutionHints) -> StorageResult<Bson> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        let mut documents = self.write()?;
        if documents.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(StorageError::DuplicateKey {
                key_value: vec![("_id".to_string(), id.into_relaxed_extjson())],
            });
        }
        self.check_unique(&documents, &document, None)?;
        documents.push(document);

        Ok(id)
    }

    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
        _hints: &ExecutionHints,
    ) -> StorageResult<Option<Document>> {
        let documents = self.read()?;
        for document in documents.iter() {
            if matches(document, &filter)? {
                let found = document.clone();
                return Ok(Some(match &projection {
                    Some(p) => project(found, p),
                    None => found,
                }));
            }
        }
        Ok(None)
    }

    async fn find(&self, query: FindQuery, _hints: &ExecutionHints) -> StorageResult<Vec<Document>> {
        let mut found = Vec::new();
        for document in self.read()?.iter() {
            if matches(document, &query.filter)? {
                found.push(document.clone());
            }
        }

        if let Some(sort) = &query.sort {
            sort_documents(&mut found, sort);
        }

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = match query.limit {
            Some(n) if n > 0 => n as usize,
            _ => usize::MAX,
        };

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| match &query.projection {
                Some(p) => project(d, p),
                None => d,
            })
            .collect())
    }

    async fn count(&self, filter: Document, _hints: &ExecutionHints) -> StorageResult<u64> {
        let mut total = 0;
        for document in self.read()?.iter() {
            if matches(document, &filter)? {
                total += 1;
            }
        }
        Ok(total)
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        _hints: &ExecutionHints,
    ) -> StorageResult<Vec<Document>> {
        let snapshot = self.read()?.clone();
        run_pipeline(snapshot, &pipeline)
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        _hints: &ExecutionHints,
    ) -> StorageResult<Option<Document>> {
        let mut documents = self.write()?;

        let mut position = None;
        for (i, document) in documents.iter().enumerate() {
            if matches(document, &filter)? {
                position = Some(i);
                break;
            }
        }
        let Some(i) = position else {
            return Ok(None);
        };

        let mut updated = documents[i].clone();
        apply_update(&mut updated, &update)?;
        self.check_unique(&documents, &updated, Some(i))?;
        documents[i] = updated.clone();

        Ok(Some(updated))
    }
}
