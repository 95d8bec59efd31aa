//! MongoDB client and collection wrapper

use bson::{doc, Document};
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    results::UpdateResult,
    Client, ClientSession, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::types::CivicError;

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Whether `err` is a unique-index violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, CivicError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| CivicError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| CivicError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, applying its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, CivicError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Start a client session for multi-document transactions
    pub async fn start_session(&self) -> Result<ClientSession, CivicError> {
        self.client
            .start_session()
            .await
            .map_err(|e| CivicError::Database(format!("Failed to start session: {}", e)))
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, CivicError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), CivicError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| CivicError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Find a document by `_id`
    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>, CivicError> {
        self.inner
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| CivicError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, CivicError> {
        self.find_sorted(filter, None).await
    }

    /// Find many documents by filter, in `sort` order when given
    pub async fn find_sorted(
        &self,
        filter: Document,
        sort: Option<Document>,
    ) -> Result<Vec<T>, CivicError> {
        use futures_util::StreamExt;

        let mut find = self.inner.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        let cursor = find
            .await
            .map_err(|e| CivicError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Count documents matching `filter`
    pub async fn count(&self, filter: Document) -> Result<u64, CivicError> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| CivicError::Database(format!("Count failed: {}", e)))
    }

    /// Insert or replace the document with `_id == id`
    pub async fn upsert_by_id(&self, id: &str, item: &T) -> Result<(), CivicError> {
        self.inner
            .replace_one(doc! { "_id": id }, item)
            .upsert(true)
            .await
            .map_err(|e| CivicError::Database(format!("Replace failed: {}", e)))?;
        Ok(())
    }

    /// Update the document with `_id == id`
    pub async fn update_by_id(
        &self,
        id: &str,
        update: Document,
    ) -> Result<UpdateResult, CivicError> {
        self.inner
            .update_one(doc! { "_id": id }, update)
            .await
            .map_err(|e| CivicError::Database(format!("Update failed: {}", e)))
    }

    /// Delete the document with `_id == id`; returns whether one was removed
    pub async fn delete_by_id(&self, id: &str) -> Result<bool, CivicError> {
        let result = self
            .inner
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| CivicError::Database(format!("Delete failed: {}", e)))?;
        Ok(result.deleted_count > 0)
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}
