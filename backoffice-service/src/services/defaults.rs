//! Single-default rule for reference collections (taxes, payment modes).
//!
//! Among non-removed documents at most one has `isDefault = true`, it is always
//! enabled, and a collection with any enabled document always has one. Every write goes
//! through one mutex per collection so the cascade onto sibling documents cannot
//! interleave with another write.

use crate::models::fields::{ENABLED, IS_DEFAULT};
use crate::outcome::Outcome;
use crate::services::metrics::record_default_cascade;
use crate::store::{Collection, CREATED, ID, REMOVED};
use mongodb::bson::{doc, Document};
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::Mutex;

const LAST_ENABLED: &str = "cannot disable the only existing one";
const DISABLED_DEFAULT: &str = "a disabled record cannot be the default";
const LAST_DEFAULT_REMOVAL: &str = "cannot remove the default while no other enabled record exists";

/// What has to happen to sibling documents before a patch is applied.
enum Cascade {
    Nothing,
    DemoteOthers,
    Promote(String),
}

#[derive(Clone)]
pub struct DefaultManager {
    collection: Collection,
    lock: Arc<Mutex<()>>,
}

impl DefaultManager {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    fn reject(&self, message: &str) -> Outcome<Document> {
        tracing::info!(
            collection = self.collection.name(),
            reason = message,
            "Default change refused"
        );
        record_default_cascade(self.collection.name(), "rejected");
        Outcome::Conflict(message.to_string())
    }

    /// Some enabled document other than `id`.
    async fn other_enabled(&self, id: &str) -> Result<Option<String>, AppError> {
        let other = self
            .collection
            .find_one(doc! { ID: { "$ne": id }, ENABLED: true })
            .await?;
        Ok(other.and_then(|document| document.get_str(ID).ok().map(str::to_string)))
    }

    async fn has_default(&self) -> Result<bool, AppError> {
        Ok(self
            .collection
            .count(doc! { IS_DEFAULT: true, ENABLED: true })
            .await?
            > 0)
    }

    async fn demote_others(&self, keep: &str) -> Result<(), AppError> {
        let demoted = self
            .collection
            .update_many(
                doc! { ID: { "$ne": keep }, IS_DEFAULT: true },
                doc! { "$set": { IS_DEFAULT: false } },
            )
            .await?;
        if demoted > 0 {
            tracing::info!(
                collection = self.collection.name(),
                keep = %keep,
                demoted = demoted,
                "Previous default cleared"
            );
            record_default_cascade(self.collection.name(), "demoted");
        }
        Ok(())
    }

    async fn promote(&self, id: &str) -> Result<(), AppError> {
        self.collection
            .update_by_id(id, doc! { "$set": { IS_DEFAULT: true } })
            .await?;
        tracing::info!(
            collection = self.collection.name(),
            promoted = %id,
            "Default moved to another record"
        );
        record_default_cascade(self.collection.name(), "promoted");
        Ok(())
    }

    async fn apply(&self, cascade: Cascade, keep: &str) -> Result<(), AppError> {
        match cascade {
            Cascade::Nothing => Ok(()),
            Cascade::DemoteOthers => self.demote_others(keep).await,
            Cascade::Promote(other) => self.promote(&other).await,
        }
    }

    /// Insert a reference document. The first enabled document becomes the default, and
    /// an explicit `isDefault: true` takes the flag from whoever had it.
    pub async fn create(&self, mut document: Document) -> Result<Outcome<Document>, AppError> {
        let _guard = self.lock.lock().await;

        let enabled = document.get_bool(ENABLED).unwrap_or(true);
        let requested = document.get_bool(IS_DEFAULT).unwrap_or(false);
        if requested && !enabled {
            return Ok(self.reject(DISABLED_DEFAULT));
        }

        let is_default = requested || (enabled && !self.has_default().await?);
        document.insert(ENABLED, enabled);
        document.insert(IS_DEFAULT, is_default);

        let stored = self.collection.insert(document).await?;
        if requested {
            let id = stored.get_str(ID).unwrap_or_default();
            if let Err(e) = self.demote_others(id).await {
                if let Err(purge) = self.collection.purge(id).await {
                    tracing::error!(
                        collection = self.collection.name(),
                        id = %id,
                        "Failed to roll back new default: {}",
                        purge
                    );
                }
                return Err(e);
            }
        }
        Ok(Outcome::Created(stored))
    }

    /// Apply `set` (a `$set` body) to one document, moving the default flag around as
    /// needed. Refusals happen before any document is touched.
    pub async fn update(&self, id: &str, mut set: Document) -> Result<Outcome<Document>, AppError> {
        for protected in [ID, REMOVED, CREATED] {
            set.remove(protected);
        }

        let _guard = self.lock.lock().await;

        let Some(current) = self.collection.find_by_id(id).await? else {
            return Ok(Outcome::NotFound(format!("No document found by id: {}", id)));
        };
        let current_default = current.get_bool(IS_DEFAULT).unwrap_or(false);
        let current_enabled = current.get_bool(ENABLED).unwrap_or(false);
        let patch_enabled = set.get_bool(ENABLED).ok();
        let patch_default = set.get_bool(IS_DEFAULT).ok();
        let enabled_after = patch_enabled.unwrap_or(current_enabled);

        let cascade = if patch_default == Some(true) {
            if !enabled_after {
                return Ok(self.reject(DISABLED_DEFAULT));
            }
            Cascade::DemoteOthers
        } else if patch_enabled == Some(false) && current_default {
            let Some(other) = self.other_enabled(id).await? else {
                return Ok(self.reject(LAST_ENABLED));
            };
            set.insert(IS_DEFAULT, false);
            Cascade::Promote(other)
        } else if patch_default == Some(false) && current_default {
            let enabled = self.collection.count(doc! { ENABLED: true }).await?;
            match self.other_enabled(id).await? {
                Some(other) if enabled > 1 => Cascade::Promote(other),
                _ => return Ok(self.reject(LAST_ENABLED)),
            }
        } else {
            Cascade::Nothing
        };

        self.apply(cascade, id).await?;
        self.collection
            .update_by_id(id, doc! { "$set": set })
            .await?;

        // Enabling a record in a collection that had no enabled record left.
        if enabled_after && !self.has_default().await? {
            self.promote(id).await?;
        }

        Ok(match self.collection.find_by_id(id).await? {
            Some(document) => Outcome::Ok(document),
            None => Outcome::NotFound(format!("No document found by id: {}", id)),
        })
    }

    /// Soft-delete a reference document, handing the default flag to another enabled one.
    pub async fn remove(&self, id: &str) -> Result<Outcome<Document>, AppError> {
        let _guard = self.lock.lock().await;

        let Some(current) = self.collection.find_by_id(id).await? else {
            return Ok(Outcome::NotFound(format!("No document found by id: {}", id)));
        };

        if current.get_bool(IS_DEFAULT).unwrap_or(false) {
            let Some(other) = self.other_enabled(id).await? else {
                return Ok(self.reject(LAST_DEFAULT_REMOVAL));
            };
            self.promote(&other).await?;
        }
        self.collection.soft_delete(id).await?;

        Ok(match self.collection.find_by_id_including_removed(id).await? {
            Some(document) => Outcome::Ok(document),
            None => Outcome::NotFound(format!("No document found by id: {}", id)),
        })
    }
}
