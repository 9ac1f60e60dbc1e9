//! Document store abstraction.
//!
//! Everything above this module talks to [`Collection`], a handle on one logical
//! collection that implicitly scopes every read to non-removed documents. The backing
//! [`DocumentStore`] is either MongoDB or the in-memory engine used for local runs and
//! tests; both accept the same filter, update and pipeline documents.

pub mod matcher;
pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use mongodb::bson::{doc, DateTime, Document};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Soft-delete flag carried by every document.
pub const REMOVED: &str = "removed";
/// Creation timestamp, the default sort key.
pub const CREATED: &str = "created";
pub const UPDATED: &str = "updated";
pub const ID: &str = "_id";

/// Sort/skip/limit for a `find`.
#[derive(Debug, Clone, Default)]
pub struct FindSpec {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindSpec {
    pub fn sorted(sort: Document) -> Self {
        Self {
            sort: Some(sort),
            ..Default::default()
        }
    }

    pub fn page(sort: Document, skip: u64, limit: i64) -> Self {
        Self {
            sort: Some(sort),
            skip: Some(skip),
            limit: Some(limit),
        }
    }
}

/// Raw operations over named collections of BSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>, AppError>;

    async fn find_one(&self, collection: &str, filter: Document)
        -> Result<Option<Document>, AppError>;

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, AppError>;

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, AppError>;

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), AppError>;

    /// Returns the number of matched documents (0 or 1).
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, AppError>;

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, AppError>;

    /// Physical delete. Only used to roll back a half-applied write.
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, AppError>;

    async fn ensure_indexes(&self, collection: &str, keys: &[Document]) -> Result<(), AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Generate an opaque primary key.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A single collection with the soft-delete filter baked in.
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn DocumentStore>,
    name: &'static str,
}

impl Collection {
    pub fn new(store: Arc<dyn DocumentStore>, name: &'static str) -> Self {
        Self { store, name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn active(mut filter: Document) -> Document {
        filter.insert(REMOVED, false);
        filter
    }

    fn stamp_updated(mut update: Document) -> Document {
        let now = DateTime::now();
        match update.get_document_mut("$set") {
            Ok(set) => {
                set.insert(UPDATED, now);
            }
            Err(_) => {
                update.insert("$set", doc! { UPDATED: now });
            }
        }
        update
    }

    pub async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>, AppError> {
        self.store.find(self.name, Self::active(filter), spec).await
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<Document>, AppError> {
        self.store.find_one(self.name, Self::active(filter)).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Document>, AppError> {
        self.find_one(doc! { ID: id }).await
    }

    /// Primary-key lookup that also sees removed documents.
    pub async fn find_by_id_including_removed(
        &self,
        id: &str,
    ) -> Result<Option<Document>, AppError> {
        self.store.find_one(self.name, doc! { ID: id }).await
    }

    pub async fn count(&self, filter: Document) -> Result<u64, AppError> {
        self.store.count(self.name, Self::active(filter)).await
    }

    /// Run a pipeline over non-removed documents only.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, AppError> {
        let mut stages = Vec::with_capacity(pipeline.len() + 1);
        stages.push(doc! { "$match": { REMOVED: false } });
        stages.extend(pipeline);
        self.store.aggregate(self.name, stages).await
    }

    /// Insert a new document, stamping `_id`, `removed` and timestamps when absent.
    /// Returns the stored document.
    pub async fn insert(&self, mut document: Document) -> Result<Document, AppError> {
        let now = DateTime::now();
        if !document.contains_key(ID) {
            document.insert(ID, new_id());
        }
        document.insert(REMOVED, false);
        if !document.contains_key(CREATED) {
            document.insert(CREATED, now);
        }
        document.insert(UPDATED, now);

        self.store.insert_one(self.name, document.clone()).await?;
        Ok(document)
    }

    /// Update one non-removed document by id. Returns whether it matched.
    pub async fn update_by_id(&self, id: &str, update: Document) -> Result<bool, AppError> {
        let matched = self
            .store
            .update_one(
                self.name,
                Self::active(doc! { ID: id }),
                Self::stamp_updated(update),
            )
            .await?;
        Ok(matched > 0)
    }

    pub async fn update_many(&self, filter: Document, update: Document) -> Result<u64, AppError> {
        self.store
            .update_many(self.name, Self::active(filter), Self::stamp_updated(update))
            .await
    }

    /// Mark a document removed. Returns whether a live document was found.
    pub async fn soft_delete(&self, id: &str) -> Result<bool, AppError> {
        self.update_by_id(id, doc! { "$set": { REMOVED: true } })
            .await
    }

    /// Physically remove a document written earlier in a failed operation.
    pub async fn purge(&self, id: &str) -> Result<(), AppError> {
        self.store.delete_one(self.name, doc! { ID: id }).await?;
        Ok(())
    }

    pub async fn ensure_indexes(&self, keys: &[Document]) -> Result<(), AppError> {
        self.store.ensure_indexes(self.name, keys).await
    }
}
