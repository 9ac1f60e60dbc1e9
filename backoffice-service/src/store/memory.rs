use super::matcher;
use super::{DocumentStore, FindSpec, ID};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Process-local document store.
///
/// Serves `STORE_BACKEND=memory` deployments and the test suites. Writes to a collection
/// are serialized by a single mutex, so every individual operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Document>>>, AppError> {
        self.collections
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("memory store lock poisoned")))
    }

    fn matching(documents: &[Document], filter: &Document) -> Result<Vec<Document>, AppError> {
        let mut found = Vec::new();
        for document in documents {
            if matcher::matches(document, filter)? {
                found.push(document.clone());
            }
        }
        Ok(found)
    }

    fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        many: bool,
    ) -> Result<u64, AppError> {
        let mut collections = self.lock()?;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut matched = 0;
        for document in documents.iter_mut() {
            if !matcher::matches(document, filter)? {
                continue;
            }
            // Apply to a copy so a failing operator leaves the document untouched.
            let mut next = document.clone();
            matcher::apply_update(&mut next, update)?;
            *document = next;
            matched += 1;
            if !many {
                break;
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>, AppError> {
        let collections = self.lock()?;
        let mut found = match collections.get(collection) {
            Some(documents) => Self::matching(documents, &filter)?,
            None => return Ok(Vec::new()),
        };
        drop(collections);

        if let Some(sort) = &spec.sort {
            matcher::sort_documents(&mut found, sort);
        }
        let skip = spec.skip.unwrap_or(0) as usize;
        let found = found.into_iter().skip(skip);
        Ok(match spec.limit {
            Some(limit) if limit != 0 => found.take(limit.unsigned_abs() as usize).collect(),
            _ => found.collect(),
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, AppError> {
        let collections = self.lock()?;
        if let Some(documents) = collections.get(collection) {
            for document in documents {
                if matcher::matches(document, &filter)? {
                    return Ok(Some(document.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, AppError> {
        let collections = self.lock()?;
        let mut count = 0;
        if let Some(documents) = collections.get(collection) {
            for document in documents {
                if matcher::matches(document, &filter)? {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, AppError> {
        let documents = self
            .lock()?
            .get(collection)
            .cloned()
            .unwrap_or_default();
        matcher::aggregate(documents, &pipeline)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), AppError> {
        let mut collections = self.lock()?;
        let documents = collections.entry(collection.to_string()).or_default();

        let mut document = document;
        if !document.contains_key(ID) {
            document.insert(ID, Bson::String(super::new_id()));
        }
        let id = document.get(ID).cloned().unwrap_or(Bson::Null);
        if documents.iter().any(|existing| existing.get(ID) == Some(&id)) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "duplicate key {} in {}",
                id,
                collection
            )));
        }

        documents.push(document);
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, AppError> {
        self.update(collection, &filter, &update, false)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, AppError> {
        self.update(collection, &filter, &update, true)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, AppError> {
        let mut collections = self.lock()?;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut position = None;
        for (index, document) in documents.iter().enumerate() {
            if matcher::matches(document, &filter)? {
                position = Some(index);
                break;
            }
        }
        Ok(match position {
            Some(index) => {
                documents.remove(index);
                1
            }
            None => 0,
        })
    }

    async fn ensure_indexes(&self, _collection: &str, _keys: &[Document]) -> Result<(), AppError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn find_applies_sort_skip_and_limit() {
        let store = MemoryStore::new();
        for n in 0..5 {
            store
                .insert_one("items", doc! { "_id": format!("i{}", n), "n": n })
                .await
                .unwrap();
        }

        let page = store
            .find("items", doc! {}, FindSpec::page(doc! { "n": -1 }, 1, 2))
            .await
            .unwrap();
        let ns: Vec<i32> = page.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(ns, vec![3, 2]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        store.insert_one("items", doc! { "_id": "a" }).await.unwrap();
        let second = store.insert_one("items", doc! { "_id": "a" }).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn failed_update_leaves_document_untouched() {
        let store = MemoryStore::new();
        store
            .insert_one("items", doc! { "_id": "a", "tags": "not-an-array", "n": 1 })
            .await
            .unwrap();

        let result = store
            .update_one(
                "items",
                doc! { "_id": "a" },
                doc! { "$set": { "n": 2 }, "$push": { "tags": "x" } },
            )
            .await;
        assert!(result.is_err());

        let stored = store.find_one("items", doc! { "_id": "a" }).await.unwrap().unwrap();
        assert_eq!(stored.get_i32("n").unwrap(), 1);
    }

    #[tokio::test]
    async fn update_one_touches_only_the_first_match() {
        let store = MemoryStore::new();
        store.insert_one("items", doc! { "_id": "a", "flag": true }).await.unwrap();
        store.insert_one("items", doc! { "_id": "b", "flag": true }).await.unwrap();

        let matched = store
            .update_one("items", doc! { "flag": true }, doc! { "$set": { "flag": false } })
            .await
            .unwrap();
        assert_eq!(matched, 1);
        assert_eq!(store.count("items", doc! { "flag": true }).await.unwrap(), 1);
    }
}
