use super::{DocumentStore, FindSpec};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::{ClientOptions, FindOptions, IndexOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

/// MongoDB-backed store.
#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");

        let mut client_options = ClientOptions::parse(uri).await.map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        client_options.app_name = Some("backoffice-service".to_string());

        let client = MongoClient::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        let db = client.database(database);

        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    /// Drop the whole database. Used by test teardown.
    pub async fn drop_database(&self) -> Result<(), AppError> {
        self.db.drop(None).await?;
        Ok(())
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| format!("{}_{}", field, direction))
        .collect::<Vec<_>>()
        .join("_")
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>, AppError> {
        let options = FindOptions::builder()
            .sort(spec.sort)
            .skip(spec.skip)
            .limit(spec.limit)
            .build();

        let cursor = self
            .collection(collection)
            .find(filter, options)
            .await
            .map_err(|e| {
                tracing::error!(collection = %collection, "Failed to query documents: {}", e);
                AppError::from(e)
            })?;

        Ok(cursor.try_collect().await?)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, AppError> {
        Ok(self.collection(collection).find_one(filter, None).await?)
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, AppError> {
        Ok(self
            .collection(collection)
            .count_documents(filter, None)
            .await?)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, AppError> {
        let cursor = self
            .collection(collection)
            .aggregate(pipeline, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = %collection, "Aggregation failed: {}", e);
                AppError::from(e)
            })?;

        Ok(cursor.try_collect().await?)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), AppError> {
        self.collection(collection)
            .insert_one(document, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = %collection, "Failed to insert document: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, AppError> {
        let result = self
            .collection(collection)
            .update_one(filter, update, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = %collection, "Failed to update document: {}", e);
                AppError::from(e)
            })?;
        Ok(result.matched_count)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, AppError> {
        let result = self
            .collection(collection)
            .update_many(filter, update, None)
            .await?;
        Ok(result.matched_count)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, AppError> {
        let result = self
            .collection(collection)
            .delete_one(filter, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn ensure_indexes(&self, collection: &str, keys: &[Document]) -> Result<(), AppError> {
        if keys.is_empty() {
            return Ok(());
        }

        let indexes: Vec<IndexModel> = keys
            .iter()
            .map(|key| {
                IndexModel::builder()
                    .keys(key.clone())
                    .options(IndexOptions::builder().name(index_name(key)).build())
                    .build()
            })
            .collect();

        self.collection(collection)
            .create_indexes(indexes, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = %collection, "Failed to create indexes: {}", e);
                AppError::from(e)
            })?;

        tracing::info!(collection = %collection, count = keys.len(), "Indexes ensured");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }
}
