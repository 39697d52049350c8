//! Redirect Ledger
//!
//! Maps retired paths to their replacement. One record per old path: a path
//! redirected twice keeps only the latest target. Chains (`/a -> /b -> /c`)
//! are not collapsed here; following them is the router's concern.

use crate::db::SiteStore;
use crate::models::RedirectRecord;
use crate::services::error::SiteError;
use crate::services::events::SiteEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Old path -> new path mapping with a read-through cache over the store
#[derive(Clone)]
pub struct RedirectLedger {
    store: Arc<dyn SiteStore>,
    cache: Arc<RwLock<HashMap<String, String>>>,
    event_tx: broadcast::Sender<SiteEvent>,
}

impl RedirectLedger {
    pub fn new(store: Arc<dyn SiteStore>, event_tx: broadcast::Sender<SiteEvent>) -> Self {
        Self {
            store,
            cache: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Replace the cache with every record in the store
    pub async fn load(&self) -> Result<usize, SiteError> {
        let records = self
            .store
            .list_redirects()
            .await
            .map_err(SiteError::backing_store)?;
        let mut cache = self.cache.write().await;
        cache.clear();
        cache.extend(records.into_iter().map(|r| (r.old_path, r.new_path)));
        tracing::debug!("Loaded {} redirects", cache.len());
        Ok(cache.len())
    }

    /// Record that `old_path` now lives at `new_path`
    ///
    /// Returns `None` without writing when the paths are equal.
    pub async fn record(
        &self,
        old_path: &str,
        new_path: &str,
    ) -> Result<Option<RedirectRecord>, SiteError> {
        if old_path == new_path {
            return Ok(None);
        }
        let record = RedirectRecord::new(old_path, new_path);
        self.store
            .upsert_redirect(record.clone())
            .await
            .map_err(SiteError::backing_store)?;
        self.cache
            .write()
            .await
            .insert(record.old_path.clone(), record.new_path.clone());

        tracing::info!("Recorded redirect {} -> {}", old_path, new_path);
        let _ = self.event_tx.send(SiteEvent::RedirectRecorded(record.clone()));
        Ok(Some(record))
    }

    /// Target for `path`, if it was redirected
    pub async fn resolve(&self, path: &str) -> Result<Option<String>, SiteError> {
        if let Some(target) = self.cache.read().await.get(path) {
            return Ok(Some(target.clone()));
        }
        let record = self
            .store
            .get_redirect(path)
            .await
            .map_err(SiteError::backing_store)?;
        Ok(match record {
            Some(record) => {
                self.cache
                    .write()
                    .await
                    .insert(record.old_path, record.new_path.clone());
                Some(record.new_path)
            }
            None => None,
        })
    }

    /// Every redirect, ordered by old path
    pub async fn list(&self) -> Result<Vec<RedirectRecord>, SiteError> {
        self.store
            .list_redirects()
            .await
            .map_err(SiteError::backing_store)
    }
}
