//! Content Document Service
//!
//! Block-level editing of a page's content document. Every mutation is a
//! read-modify-write of the whole document:
//!
//! 1. Take the cached document (or fetch it, or start an empty one)
//! 2. Apply the edit to a copy
//! 3. Write the full document with the cached version as the expected version
//! 4. On success cache the copy and stamp the page's `last_modified`
//!
//! A stale expected version means another writer got there first; the
//! service reports `VersionConflict` and drops its cached copy so the next
//! read sees the winner.

use crate::db::{DocumentWrite, SiteStore};
use crate::models::{CodeKind, ContentBlock, ContentDocument, PageUpdate};
use crate::services::error::SiteError;
use crate::services::events::SiteEvent;
use crate::services::page_tree::SharedTree;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Per-page content documents with versioned full-document persistence
#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn SiteStore>,
    tree: SharedTree,
    cache: Arc<RwLock<HashMap<String, ContentDocument>>>,
    event_tx: broadcast::Sender<SiteEvent>,
}

impl ContentService {
    pub fn new(
        store: Arc<dyn SiteStore>,
        tree: SharedTree,
        event_tx: broadcast::Sender<SiteEvent>,
    ) -> Self {
        Self {
            store,
            tree,
            cache: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Existing document for `page_id`, or an empty unsaved one
    ///
    /// Reading is allowed for soft-deleted pages; nothing is persisted until
    /// the first mutation.
    pub async fn get_or_init(&self, page_id: &str) -> Result<ContentDocument, SiteError> {
        if !self.tree.read().await.contains(page_id) {
            return Err(SiteError::page_not_found(page_id));
        }
        if let Some(doc) = self.cache.read().await.get(page_id) {
            return Ok(doc.clone());
        }
        let doc = self.fetch(page_id).await?;
        self.cache
            .write()
            .await
            .insert(page_id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn fetch(&self, page_id: &str) -> Result<ContentDocument, SiteError> {
        let stored = self
            .store
            .get_content_document(page_id)
            .await
            .map_err(SiteError::backing_store)?;
        Ok(stored.unwrap_or_else(|| ContentDocument::empty(page_id)))
    }

    /// Append a block
    ///
    /// Rejects a block whose id, or any nested child id, is already used in
    /// the document, and children on non-container block types.
    pub async fn add_block(
        &self,
        page_id: &str,
        block: ContentBlock,
    ) -> Result<ContentDocument, SiteError> {
        if !block.children.is_empty() && !block.block_type.is_container() {
            return Err(SiteError::invalid_operation(format!(
                "{} blocks cannot have children",
                block.block_type
            )));
        }
        self.mutate(page_id, |doc| {
            let mut incoming = Vec::new();
            block.collect_ids(&mut incoming);
            let mut seen = HashSet::new();
            if let Some(dup) = incoming
                .iter()
                .find(|id| doc.contains_block(id) || !seen.insert(**id))
            {
                return Err(SiteError::invalid_operation(format!(
                    "Block id {} already used on page {}",
                    dup, page_id
                )));
            }
            doc.blocks.push(block);
            Ok(())
        })
        .await
    }

    /// Remove a block (searched at every nesting depth)
    pub async fn remove_block(
        &self,
        page_id: &str,
        block_id: &str,
    ) -> Result<ContentDocument, SiteError> {
        self.mutate(page_id, |doc| {
            doc.remove_block(block_id)
                .map(|_| ())
                .ok_or_else(|| SiteError::block_not_found(page_id, block_id))
        })
        .await
    }

    /// Move the top-level block at `from_index` to `to_index`
    ///
    /// Every other block keeps its relative order.
    pub async fn reorder_blocks(
        &self,
        page_id: &str,
        from_index: usize,
        to_index: usize,
    ) -> Result<ContentDocument, SiteError> {
        self.mutate(page_id, |doc| {
            let len = doc.blocks.len();
            if from_index >= len || to_index >= len {
                return Err(SiteError::invalid_operation(format!(
                    "Cannot move block {} to {} in a document of {} blocks",
                    from_index, to_index, len
                )));
            }
            let block = doc.blocks.remove(from_index);
            doc.blocks.insert(to_index, block);
            Ok(())
        })
        .await
    }

    /// Shallow-merge `partial` into a block's property bag
    pub async fn update_block_props(
        &self,
        page_id: &str,
        block_id: &str,
        partial: &Map<String, Value>,
    ) -> Result<ContentDocument, SiteError> {
        self.mutate(page_id, |doc| {
            let block = doc
                .find_block_mut(block_id)
                .ok_or_else(|| SiteError::block_not_found(page_id, block_id))?;
            block.merge_props(partial);
            Ok(())
        })
        .await
    }

    pub async fn set_custom_code(
        &self,
        page_id: &str,
        kind: CodeKind,
        text: impl Into<String>,
    ) -> Result<ContentDocument, SiteError> {
        let text = text.into();
        self.mutate(page_id, |doc| {
            doc.custom_code.set(kind, text);
            Ok(())
        })
        .await
    }

    /// Give `target_page_id` its own copy of the source page's document
    ///
    /// Returns `None` when the source has never been saved.
    pub async fn clone_document(
        &self,
        source_page_id: &str,
        target_page_id: &str,
    ) -> Result<Option<ContentDocument>, SiteError> {
        let cached = self.cache.read().await.get(source_page_id).cloned();
        let source = match cached {
            Some(doc) => doc,
            None => self.fetch(source_page_id).await?,
        };
        if source.version == 0 {
            return Ok(None);
        }

        let mut copy = source.clone_for(target_page_id);
        copy.updated_at = Some(Utc::now());
        match self
            .store
            .upsert_content_document(copy.clone(), 0)
            .await
            .map_err(SiteError::backing_store)?
        {
            DocumentWrite::Written { version } => copy.version = version,
            DocumentWrite::Conflict { actual_version } => {
                return Err(SiteError::version_conflict(target_page_id, 0, actual_version))
            }
        }
        self.cache
            .write()
            .await
            .insert(target_page_id.to_string(), copy.clone());
        let _ = self.event_tx.send(SiteEvent::DocumentSaved {
            page_id: target_page_id.to_string(),
            version: copy.version,
        });
        Ok(Some(copy))
    }

    /// Permanently delete a page's document
    pub async fn remove_document(&self, page_id: &str) -> Result<(), SiteError> {
        self.store
            .delete_content_document(page_id)
            .await
            .map_err(SiteError::backing_store)?;
        self.cache.write().await.remove(page_id);
        Ok(())
    }

    /// Forget every cached document
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    async fn ensure_editable(&self, page_id: &str) -> Result<(), SiteError> {
        match self.tree.read().await.get(page_id) {
            None => Err(SiteError::page_not_found(page_id)),
            Some(page) if page.is_deleted => Err(SiteError::page_deleted(page_id)),
            Some(_) => Ok(()),
        }
    }

    async fn mutate<F>(&self, page_id: &str, edit: F) -> Result<ContentDocument, SiteError>
    where
        F: FnOnce(&mut ContentDocument) -> Result<(), SiteError>,
    {
        self.ensure_editable(page_id).await?;

        // Held across the write so edits from this session apply in order
        let mut cache = self.cache.write().await;
        let mut doc = match cache.get(page_id) {
            Some(doc) => doc.clone(),
            None => self.fetch(page_id).await?,
        };
        edit(&mut doc)?;

        let expected_version = doc.version;
        doc.updated_at = Some(Utc::now());
        let outcome = self
            .store
            .upsert_content_document(doc.clone(), expected_version)
            .await
            .map_err(SiteError::backing_store)?;
        match outcome {
            DocumentWrite::Written { version } => doc.version = version,
            DocumentWrite::Conflict { actual_version } => {
                cache.remove(page_id);
                tracing::warn!(
                    "Stale write to page {} rejected (expected v{}, store has v{})",
                    page_id,
                    expected_version,
                    actual_version
                );
                return Err(SiteError::version_conflict(
                    page_id,
                    expected_version,
                    actual_version,
                ));
            }
        }
        cache.insert(page_id.to_string(), doc.clone());
        drop(cache);

        tracing::debug!("Saved content for page {} at v{}", page_id, doc.version);
        self.stamp_last_modified(page_id).await;
        let _ = self.event_tx.send(SiteEvent::DocumentSaved {
            page_id: page_id.to_string(),
            version: doc.version,
        });
        Ok(doc)
    }

    // The document write already succeeded, so a failed stamp is only logged
    async fn stamp_last_modified(&self, page_id: &str) {
        let now = Utc::now();
        let update = PageUpdate {
            last_modified: Some(now),
            ..PageUpdate::default()
        };
        if let Err(e) = self.store.update_page(page_id, update).await {
            tracing::warn!("Failed to stamp last_modified on page {}: {:#}", page_id, e);
        }
        if let Some(page) = self.tree.write().await.get_mut(page_id) {
            page.last_modified = now;
        }
    }
}

#[cfg(test)]
#[path = "content_service_test.rs"]
mod content_service_test;
