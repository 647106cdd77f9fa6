//! MongoDB storage backend using the official MongoDB async driver.
//!
//! Provides [`MongoStore`], a [`DocumentStore`] backed by one
//! `mongodb::Collection<Document>`.
//!
//! # Execution hints
//!
//! Every call takes an [`ExecutionHints`]. Hints that are `None` are never
//! written into the driver options, so the server applies its own defaults.
//! When a session is present the call runs inside it; cursors opened in a
//! session are drained through the same session.
//!
//! # Error translation
//!
//! Driver errors are converted into [`StorageError`] right here so nothing
//! else in the crate has to inspect `mongodb::error::ErrorKind`. Duplicate
//! key failures (code 11000) carry the offending key/value pairs parsed from
//! the server message.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    AggregateOptions, CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
    ReturnDocument,
};
use mongodb::{Collection, Database};
use regex::Regex;
use std::sync::LazyLock;

use super::error::{StorageError, StorageResult};
use super::{DocumentStore, ExecutionHints, FindQuery};

const DUPLICATE_KEY: i32 = 11000;
const DUPLICATE_KEY_LEGACY: i32 = 11001;
const MAX_TIME_EXPIRED: i32 = 50;
const AUTHENTICATION_FAILED: i32 = 18;
const UNAUTHORIZED: i32 = 13;

static DUP_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dup key: \{(?P<body>.*)\}").expect("valid dup key pattern"));

// ---------------------------------------------------------------------------
// MongoStore
// ---------------------------------------------------------------------------

/// Document store backed by one MongoDB collection.
///
/// # Example
///
/// ```rust,ignore
/// use mongodb::Client;
/// use tradebook::prelude::*;
///
/// let client = Client::with_uri_str("mongodb://localhost:27017").await?;
/// let store = MongoStore::new(client.database("trading"), TradingAccount::collection_name());
/// let accounts = Repository::<TradingAccount>::new(store);
/// ```
#[derive(Clone, Debug)]
pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    pub fn new(database: Database, collection: &str) -> Self {
        Self {
            collection: database.collection(collection),
        }
    }

    pub fn from_collection(collection: Collection<Document>) -> Self {
        Self { collection }
    }

    /// Get a reference to the underlying collection.
    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn insert_one(&self, document: Document, hints: &ExecutionHints) -> StorageResult<Bson> {
        let action = self.collection.insert_one(document);
        let result = match &hints.session {
            Some(session) => {
                let mut session = session.lock().await;
                action.session(&mut *session).await
            }
            None => action.await,
        }?;
        Ok(result.inserted_id)
    }

    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
        hints: &ExecutionHints,
    ) -> StorageResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.projection = projection;
        options.max_time = hints.max_time;
        options.selection_criteria = hints.selection_criteria.clone();
        options.read_concern = hints.read_concern.clone();
        options.hint = hints.hint.clone();
        options.collation = hints.collation.clone();

        let action = self.collection.find_one(filter).with_options(options);
        let found = match &hints.session {
            Some(session) => {
                let mut session = session.lock().await;
                action.session(&mut *session).await
            }
            None => action.await,
        }?;
        Ok(found)
    }

    async fn find(&self, query: FindQuery, hints: &ExecutionHints) -> StorageResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.sort = query.sort;
        options.skip = query.skip;
        options.limit = query.limit;
        options.projection = query.projection;
        options.allow_disk_use = hints.allow_disk_use;
        options.max_time = hints.max_time;
        options.selection_criteria = hints.selection_criteria.clone();
        options.read_concern = hints.read_concern.clone();
        options.hint = hints.hint.clone();
        options.collation = hints.collation.clone();

        let action = self.collection.find(query.filter).with_options(options);
        let documents = match &hints.session {
            Some(session) => {
                let mut session = session.lock().await;
                let mut cursor = action.session(&mut *session).await?;
                cursor.stream(&mut *session).try_collect().await?
            }
            None => action.await?.try_collect().await?,
        };
        Ok(documents)
    }

    async fn count(&self, filter: Document, hints: &ExecutionHints) -> StorageResult<u64> {
        let mut options = CountOptions::default();
        options.max_time = hints.max_time;
        options.selection_criteria = hints.selection_criteria.clone();
        options.read_concern = hints.read_concern.clone();
        options.hint = hints.hint.clone();
        options.collation = hints.collation.clone();

        let action = self.collection.count_documents(filter).with_options(options);
        let total = match &hints.session {
            Some(session) => {
                let mut session = session.lock().await;
                action.session(&mut *session).await
            }
            None => action.await,
        }?;
        Ok(total)
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        hints: &ExecutionHints,
    ) -> StorageResult<Vec<Document>> {
        let mut options = AggregateOptions::default();
        options.allow_disk_use = hints.allow_disk_use;
        options.max_time = hints.max_time;
        options.selection_criteria = hints.selection_criteria.clone();
        options.read_concern = hints.read_concern.clone();
        options.hint = hints.hint.clone();
        options.collation = hints.collation.clone();

        let action = self.collection.aggregate(pipeline).with_options(options);
        let documents = match &hints.session {
            Some(session) => {
                let mut session = session.lock().await;
                let mut cursor = action.session(&mut *session).await?;
                cursor.stream(&mut *session).try_collect().await?
            }
            None => action.await?.try_collect().await?,
        };
        Ok(documents)
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        hints: &ExecutionHints,
    ) -> StorageResult<Option<Document>> {
        let mut options = FindOneAndUpdateOptions::default();
        options.return_document = Some(ReturnDocument::After);
        options.max_time = hints.max_time;
        options.hint = hints.hint.clone();
        options.collation = hints.collation.clone();

        let action = self
            .collection
            .find_one_and_update(filter, update)
            .with_options(options);
        let updated = match &hints.session {
            Some(session) => {
                let mut session = session.lock().await;
                action.session(&mut *session).await
            }
            None => action.await,
        }?;
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Error translation
// ---------------------------------------------------------------------------

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        let message = err.to_string();
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_error))
                if is_duplicate_key(write_error.code) =>
            {
                StorageError::DuplicateKey {
                    key_value: parse_duplicate_key(&write_error.message),
                }
            }
            ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => {
                StorageError::WriteConcern {
                    message: concern.message.clone(),
                }
            }
            ErrorKind::Command(command) if is_duplicate_key(command.code) => {
                StorageError::DuplicateKey {
                    key_value: parse_duplicate_key(&command.message),
                }
            }
            ErrorKind::Command(command) if command.code == MAX_TIME_EXPIRED => {
                StorageError::Timeout { message }
            }
            ErrorKind::Command(command)
                if command.code == AUTHENTICATION_FAILED || command.code == UNAUTHORIZED =>
            {
                StorageError::Authentication { message }
            }
            ErrorKind::Authentication { .. } => StorageError::Authentication { message },
            ErrorKind::ServerSelection { .. } => StorageError::ServerSelection { message },
            ErrorKind::ConnectionPoolCleared { .. } => StorageError::Disconnected { message },
            ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                StorageError::Timeout { message }
            }
            ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => StorageError::Network { message },
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                StorageError::Serialization { message }
            }
            _ => StorageError::Other { message },
        }
    }
}

fn is_duplicate_key(code: i32) -> bool {
    code == DUPLICATE_KEY || code == DUPLICATE_KEY_LEGACY
}

/// Pull `field: value` pairs out of `... dup key: { email: "a@b.com" }`.
fn parse_duplicate_key(message: &str) -> Vec<(String, serde_json::Value)> {
    let Some(body) = DUP_KEY.captures(message).and_then(|c| c.name("body")) else {
        return Vec::new();
    };

    body.as_str()
        .split(", ")
        .filter_map(|pair| {
            let (key, value) = pair.split_once(':')?;
            let value = value.trim();
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            Some((key.trim().to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_duplicate_key_message() {
        let message = r#"E11000 duplicate key error collection: trading.users index: email_1 dup key: { email: "a@b.com" }"#;
        assert_eq!(
            parse_duplicate_key(message),
            vec![("email".to_string(), json!("a@b.com"))]
        );
    }

    #[test]
    fn test_parse_compound_duplicate_key() {
        let message = r#"E11000 duplicate key error collection: trading.accounts index: login_1_server_1 dup key: { login: 1001, server: "Live-2" }"#;
        assert_eq!(
            parse_duplicate_key(message),
            vec![
                ("login".to_string(), json!(1001)),
                ("server".to_string(), json!("Live-2")),
            ]
        );
    }

    #[test]
    fn test_parse_unrelated_message() {
        assert!(parse_duplicate_key("something else").is_empty());
    }
}
