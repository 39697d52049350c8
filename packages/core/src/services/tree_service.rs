//! Tree Service - Structural Page Operations
//!
//! This module owns every structural change to the sitemap:
//!
//! - add, move, copy, soft/hard delete, restore, rename
//! - status and lock transitions, sibling reordering, page data edits
//! - editor selection and collapsed-node preferences
//!
//! # Write Model
//!
//! Each operation validates against the in-memory tree while holding its
//! write lock, issues the remote writes, then applies the change locally.
//! Validation failures (`PathCollision`, `Cycle`, ...) happen before any
//! write. If a remote write fails part-way through a multi-write operation
//! the tree is refetched from the store before the error is returned, so the
//! cache never claims a change the store does not have.
//!
//! With `reload_after_write` set, every successful structural operation is
//! followed by a full reload from the store.
//!
//! # Paths
//!
//! Paths are stored. Moving or re-pathing a page re-paths its whole subtree,
//! and every changed path gets a redirect.

use crate::config::SiteConfig;
use crate::db::{FractionalOrderCalculator, SiteStore};
use crate::models::{PageNode, PageRecord, PageStatus, PageUpdate};
use crate::paths::{is_descendant_path, leaf_of, normalize_path, rebase_path, slugify_title, unique_copy_leaf, ROOT_PATH};
use crate::services::content_service::ContentService;
use crate::services::error::SiteError;
use crate::services::events::SiteEvent;
use crate::services::page_tree::{PageTree, SharedTree, TreeStats};
use crate::services::preferences::TreePreferences;
use crate::services::redirect_ledger::RedirectLedger;
use crate::services::template_registry::TemplateRegistry;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Parameters for adding a page
///
/// The leaf segment defaults to the slugified title. An empty leaf at the
/// top level produces the root path `/`.
#[derive(Debug, Clone, Default)]
pub struct NewPage {
    pub title: String,
    pub slug: Option<String>,
    pub template_id: Option<String>,
    pub status: PageStatus,
}

impl NewPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn with_status(mut self, status: PageStatus) -> Self {
        self.status = status;
        self
    }
}

/// Sparse rename request; unspecified fields are left alone
///
/// `path` may be a full path or a bare leaf segment. Either way the page
/// stays under its current parent; changing parents is a move.
#[derive(Debug, Clone, Default)]
pub struct RenamePage {
    pub title: Option<String>,
    pub path: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

impl RenamePage {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_seo_title(mut self, title: impl Into<String>) -> Self {
        self.seo_title = Some(title.into());
        self
    }

    pub fn with_seo_description(mut self, description: impl Into<String>) -> Self {
        self.seo_description = Some(description.into());
        self
    }
}

/// What a delete request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The page was flagged deleted and kept in place
    SoftDeleted,
    /// The page and its subtree were removed, parent first
    Removed { ids: Vec<String> },
}

#[derive(Debug, Clone)]
struct PathChange {
    id: String,
    old_path: String,
    new_path: String,
    active: bool,
}

impl PathChange {
    fn changed(&self) -> bool {
        self.old_path != self.new_path
    }
}

/// Structural operations over the shared page tree
#[derive(Clone)]
pub struct TreeService {
    store: Arc<dyn SiteStore>,
    tree: SharedTree,
    content: ContentService,
    redirects: RedirectLedger,
    templates: TemplateRegistry,
    config: SiteConfig,
    event_tx: broadcast::Sender<SiteEvent>,
    active_page: Arc<RwLock<Option<String>>>,
    preferences: Arc<RwLock<TreePreferences>>,
}

impl TreeService {
    pub fn new(
        store: Arc<dyn SiteStore>,
        tree: SharedTree,
        content: ContentService,
        redirects: RedirectLedger,
        templates: TemplateRegistry,
        config: SiteConfig,
        event_tx: broadcast::Sender<SiteEvent>,
    ) -> Self {
        Self {
            store,
            tree,
            content,
            redirects,
            templates,
            config,
            event_tx,
            active_page: Arc::new(RwLock::new(None)),
            preferences: Arc::new(RwLock::new(TreePreferences::default())),
        }
    }

    fn emit(&self, event: SiteEvent) {
        let _ = self.event_tx.send(event);
    }

    //
    // LOADING
    //

    async fn fetch_tree(&self) -> Result<PageTree, SiteError> {
        let records = self
            .store
            .list_pages()
            .await
            .map_err(SiteError::backing_store)?;
        Ok(PageTree::from_records(records))
    }

    /// Rebuild the tree from the store's flat page list
    ///
    /// Clears the selection and collapsed entries for pages that vanished.
    pub async fn reload(&self) -> Result<usize, SiteError> {
        let fresh = self.fetch_tree().await?;
        let count = fresh.len();
        {
            let mut active = self.active_page.write().await;
            if active.as_deref().is_some_and(|id| !fresh.contains(id)) {
                *active = None;
            }
        }
        self.preferences
            .write()
            .await
            .retain_known(|id| fresh.contains(id));
        *self.tree.write().await = fresh;
        tracing::debug!("Reloaded page tree ({} pages)", count);
        Ok(count)
    }

    async fn after_write(&self) {
        if self.config.reload_after_write {
            if let Err(e) = self.reload().await {
                tracing::warn!("Reload after write failed: {}", e);
            }
        }
    }

    // Refetch into the held tree after a partial failure, then hand back the error
    async fn resync(&self, tree: &mut PageTree, err: SiteError) -> SiteError {
        tracing::warn!("Remote write failed, resyncing tree: {}", err);
        match self.fetch_tree().await {
            Ok(fresh) => *tree = fresh,
            Err(e) => tracing::warn!("Resync failed, tree may be stale: {}", e),
        }
        err
    }

    //
    // QUERIES
    //

    pub async fn get_page(&self, id: &str) -> Result<PageRecord, SiteError> {
        self.tree
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::page_not_found(id))
    }

    /// Active page at `path` (the path is normalized first)
    pub async fn find_by_path(&self, path: &str) -> Option<PageRecord> {
        let path = normalize_path(path)?;
        self.tree.read().await.find_active_by_path(&path).cloned()
    }

    /// Nested view of the whole site
    pub async fn nested(&self) -> Vec<PageNode> {
        self.tree.read().await.to_nested()
    }

    /// Pages in tree order
    pub async fn pages(&self) -> Vec<PageRecord> {
        self.tree.read().await.iter().cloned().collect()
    }

    pub async fn stats(&self) -> TreeStats {
        self.tree.read().await.stats()
    }

    //
    // STRUCTURAL OPERATIONS
    //

    /// Append a new draft page under `parent_id` (a new root for `None`)
    pub async fn add_page(
        &self,
        parent_id: Option<&str>,
        new_page: NewPage,
    ) -> Result<PageRecord, SiteError> {
        let mut tree = self.tree.write().await;
        if let Some(parent_id) = parent_id {
            Self::require_active(&tree, parent_id)?;
        }

        let leaf = match &new_page.slug {
            Some(slug) => slug.trim().trim_matches('/').to_string(),
            None => slugify_title(&new_page.title),
        };
        if leaf.contains('/') {
            return Err(SiteError::invalid_path(leaf));
        }
        if leaf.is_empty() && parent_id.is_some() {
            return Err(SiteError::invalid_path(format!(
                "empty path segment for '{}'",
                new_page.title
            )));
        }
        let path = tree.path_under(parent_id, &leaf);
        if tree.path_in_use(&path, &[]) {
            return Err(SiteError::path_collision(path));
        }

        let page_data = match &new_page.template_id {
            Some(template_id) => self.templates.default_page_data(template_id).await?,
            None => Map::new(),
        };

        let mut record = PageRecord::new(new_page.title, path, parent_id.map(str::to_string));
        record.status = new_page.status;
        record.template_id = new_page.template_id;
        record.page_data = page_data;
        record.sort_order =
            FractionalOrderCalculator::calculate_order(tree.last_child_order(parent_id), None);

        self.store
            .insert_page(record.clone())
            .await
            .map_err(SiteError::backing_store)?;
        tree.insert(record.clone());
        drop(tree);

        tracing::info!("Added page {} at {}", record.id, record.path);
        self.emit(SiteEvent::PageCreated(record.clone()));
        self.after_write().await;
        Ok(record)
    }

    /// Move a page (and its subtree) to the end of `new_parent_id`'s children
    pub async fn move_page(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<PageRecord, SiteError> {
        let mut tree = self.tree.write().await;
        let page = tree
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::page_not_found(id))?;
        if page.path == ROOT_PATH {
            return Err(SiteError::invalid_operation("The root page cannot be moved"));
        }
        if let Some(target) = new_parent_id {
            if target == id || tree.is_in_subtree(target, id) {
                return Err(SiteError::cycle(id, target));
            }
            Self::require_active(&tree, target)?;
        }

        let new_path = tree.path_under(new_parent_id, leaf_of(&page.path));
        let changes = Self::plan_repath(&tree, id, &new_path);
        Self::check_collisions(&tree, id, &changes)?;

        let now = Utc::now();
        let sort_order = FractionalOrderCalculator::calculate_order(
            tree.last_child_order(new_parent_id),
            None,
        );
        let root_update = PageUpdate {
            parent_id: Some(new_parent_id.map(str::to_string)),
            path: Some(new_path.clone()),
            sort_order: Some(sort_order),
            last_modified: Some(now),
            ..PageUpdate::default()
        };

        if let Err(err) = self.persist_repath(id, root_update.clone(), &changes).await {
            return Err(self.resync(&mut tree, err).await);
        }

        tree.reparent(id, new_parent_id);
        Self::apply_repath(&mut tree, id, &root_update, &changes);
        let moved = tree
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::page_not_found(id))?;
        drop(tree);

        tracing::info!("Moved page {} from {} to {}", id, page.path, new_path);
        self.emit(SiteEvent::PageMoved {
            id: id.to_string(),
            old_path: page.path,
            new_path,
        });
        self.after_write().await;
        Ok(moved)
    }

    /// Copy a single page under `destination_parent_id`
    ///
    /// The copy gets the title suffixed " (Copy)", a `-copy-<random>` leaf,
    /// its own clone of the content document, and the source's status, lock
    /// flag, template, page data and SEO metadata.
    pub async fn copy_page(
        &self,
        id: &str,
        destination_parent_id: Option<&str>,
    ) -> Result<PageRecord, SiteError> {
        let mut tree = self.tree.write().await;
        let source = Self::require_active(&tree, id)?.clone();
        if let Some(destination) = destination_parent_id {
            Self::require_active(&tree, destination)?;
        }

        let leaf = leaf_of(&source.path);
        let path = (0..self.config.copy_path_attempts)
            .map(|_| tree.path_under(destination_parent_id, &unique_copy_leaf(leaf, self.config.copy_suffix_len)))
            .find(|candidate| !tree.path_in_use(candidate, &[]))
            .ok_or_else(|| SiteError::copy_path_exhausted(leaf, self.config.copy_path_attempts))?;

        let mut record = PageRecord::new(
            format!("{} (Copy)", source.title),
            path,
            destination_parent_id.map(str::to_string),
        );
        record.status = source.status;
        record.locked = source.locked;
        record.template_id = source.template_id.clone();
        record.page_data = source.page_data.clone();
        record.seo_metadata = source.seo_metadata.clone();
        record.sort_order = FractionalOrderCalculator::calculate_order(
            tree.last_child_order(destination_parent_id),
            None,
        );

        self.store
            .insert_page(record.clone())
            .await
            .map_err(SiteError::backing_store)?;
        tree.insert(record.clone());

        if let Err(err) = self.content.clone_document(&source.id, &record.id).await {
            return Err(self.resync(&mut tree, err).await);
        }
        drop(tree);

        tracing::info!("Copied page {} to {} at {}", source.id, record.id, record.path);
        self.emit(SiteEvent::PageCreated(record.clone()));
        self.after_write().await;
        Ok(record)
    }

    /// Soft-delete an active page; hard-delete an already deleted one
    ///
    /// A hard delete removes the page's whole subtree together with every
    /// removed page's content document and SEO report.
    pub async fn delete_page(&self, id: &str) -> Result<DeleteOutcome, SiteError> {
        let mut tree = self.tree.write().await;
        let page = tree
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::page_not_found(id))?;

        if !page.is_deleted {
            let now = Utc::now();
            let update = PageUpdate {
                is_deleted: Some(true),
                last_modified: Some(now),
                ..PageUpdate::default()
            };
            self.store
                .update_page(id, update.clone())
                .await
                .map_err(SiteError::backing_store)?;
            if let Some(record) = tree.get_mut(id) {
                record.apply(&update);
            }
            drop(tree);

            tracing::info!("Soft-deleted page {} ({})", id, page.path);
            self.emit(SiteEvent::PageSoftDeleted { id: id.to_string() });
            self.after_write().await;
            return Ok(DeleteOutcome::SoftDeleted);
        }

        let ids = tree.subtree_ids(id);
        if let Err(err) = self.purge(&ids).await {
            return Err(self.resync(&mut tree, err).await);
        }
        tree.remove_subtree(id);
        drop(tree);

        {
            let mut active = self.active_page.write().await;
            if active.as_ref().is_some_and(|a| ids.contains(a)) {
                *active = None;
            }
        }
        self.preferences
            .write()
            .await
            .retain_known(|known| !ids.iter().any(|removed| removed == known));

        tracing::info!("Permanently deleted page {} and {} descendants", id, ids.len() - 1);
        self.emit(SiteEvent::PageDeleted { ids: ids.clone() });
        self.after_write().await;
        Ok(DeleteOutcome::Removed { ids })
    }

    // Children first, so a failure never leaves a child without its parent
    async fn purge(&self, ids: &[String]) -> Result<(), SiteError> {
        for id in ids.iter().rev() {
            self.content.remove_document(id).await?;
            self.store
                .delete_seo_report(id)
                .await
                .map_err(SiteError::backing_store)?;
            self.store
                .delete_page(id)
                .await
                .map_err(SiteError::backing_store)?;
        }
        Ok(())
    }

    /// Clear a page's deleted flag
    ///
    /// Fails if another active page took the path in the meantime. Restoring
    /// an active page changes nothing.
    pub async fn restore_page(&self, id: &str) -> Result<PageRecord, SiteError> {
        let mut tree = self.tree.write().await;
        let page = tree
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::page_not_found(id))?;
        if !page.is_deleted {
            return Ok(page);
        }
        if tree.path_in_use(&page.path, &[page.id.clone()]) {
            return Err(SiteError::path_collision(page.path));
        }

        let update = PageUpdate {
            is_deleted: Some(false),
            last_modified: Some(Utc::now()),
            ..PageUpdate::default()
        };
        self.store
            .update_page(id, update.clone())
            .await
            .map_err(SiteError::backing_store)?;
        let restored = match tree.get_mut(id) {
            Some(record) => {
                record.apply(&update);
                record.clone()
            }
            None => return Err(SiteError::page_not_found(id)),
        };
        drop(tree);

        tracing::info!("Restored page {} ({})", id, restored.path);
        self.emit(SiteEvent::PageRestored { id: id.to_string() });
        self.after_write().await;
        Ok(restored)
    }

    /// Change title, path and/or SEO title and description
    ///
    /// SEO fields not named in the request keep their values. A path change
    /// re-paths the subtree and records one redirect per changed path.
    pub async fn rename_page(
        &self,
        id: &str,
        rename: RenamePage,
    ) -> Result<PageRecord, SiteError> {
        let mut tree = self.tree.write().await;
        let page = Self::require_active(&tree, id)?.clone();

        let new_path = match rename.path.as_deref() {
            Some(raw) => Some(Self::resolve_rename_path(&tree, &page, raw)?),
            None => None,
        };
        let changes = match &new_path {
            Some(path) if *path != page.path => {
                let changes = Self::plan_repath(&tree, id, path);
                Self::check_collisions(&tree, id, &changes)?;
                changes
            }
            _ => Vec::new(),
        };

        let mut seo = page.seo_metadata.clone();
        if let Some(title) = rename.seo_title {
            seo.title = Some(title);
        }
        if let Some(description) = rename.seo_description {
            seo.description = Some(description);
        }

        let root_update = PageUpdate {
            title: rename.title,
            path: new_path.clone(),
            seo_metadata: Some(seo),
            last_modified: Some(Utc::now()),
            ..PageUpdate::default()
        };

        if let Err(err) = self.persist_repath(id, root_update.clone(), &changes).await {
            return Err(self.resync(&mut tree, err).await);
        }
        Self::apply_repath(&mut tree, id, &root_update, &changes);
        let renamed = tree
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::page_not_found(id))?;
        drop(tree);

        tracing::info!("Renamed page {} ({})", id, renamed.path);
        self.emit(SiteEvent::PageUpdated(renamed.clone()));
        self.after_write().await;
        Ok(renamed)
    }

    fn resolve_rename_path(
        tree: &PageTree,
        page: &PageRecord,
        raw: &str,
    ) -> Result<String, SiteError> {
        let parent_id = page.parent_id.as_deref();
        let trimmed = raw.trim();
        let candidate = if trimmed.starts_with('/') {
            normalize_path(trimmed).ok_or_else(|| SiteError::invalid_path(raw))?
        } else {
            let leaf = trimmed.trim_end_matches('/');
            if leaf.is_empty() || leaf.contains('/') {
                return Err(SiteError::invalid_path(raw));
            }
            tree.path_under(parent_id, leaf)
        };

        let expected = tree.path_under(parent_id, leaf_of(&candidate));
        if candidate != expected {
            return Err(SiteError::invalid_path(format!(
                "{} is not directly under the page's parent; move the page instead",
                candidate
            )));
        }
        Ok(candidate)
    }

    pub async fn set_status(&self, id: &str, status: PageStatus) -> Result<PageRecord, SiteError> {
        self.update_fields(
            id,
            PageUpdate {
                status: Some(status),
                ..PageUpdate::default()
            },
        )
        .await
    }

    /// Lock or unlock a page (advisory; nothing is enforced)
    pub async fn set_locked(&self, id: &str, locked: bool) -> Result<PageRecord, SiteError> {
        self.update_fields(
            id,
            PageUpdate {
                locked: Some(locked),
                ..PageUpdate::default()
            },
        )
        .await
    }

    /// Shallow-merge template field values into a page's data
    ///
    /// The merge base is read under the same write lock as the update, so
    /// concurrent patches with different keys all land.
    pub async fn update_page_data(
        &self,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<PageRecord, SiteError> {
        self.update_with(id, |tree| {
            let mut data = Self::require_active(tree, id)?.page_data.clone();
            for (key, value) in patch {
                data.insert(key.clone(), value.clone());
            }
            Ok(PageUpdate {
                page_data: Some(data),
                ..PageUpdate::default()
            })
        })
        .await
    }

    async fn update_fields(&self, id: &str, update: PageUpdate) -> Result<PageRecord, SiteError> {
        self.update_with(id, |_| Ok(update)).await
    }

    async fn update_with<F>(&self, id: &str, build: F) -> Result<PageRecord, SiteError>
    where
        F: FnOnce(&PageTree) -> Result<PageUpdate, SiteError>,
    {
        let mut tree = self.tree.write().await;
        if !tree.contains(id) {
            return Err(SiteError::page_not_found(id));
        }
        let mut update = build(&tree)?;
        update.last_modified = Some(Utc::now());
        let stored = self
            .store
            .update_page(id, update.clone())
            .await
            .map_err(SiteError::backing_store)?;
        if let Some(record) = tree.get_mut(id) {
            record.apply(&update);
        }
        drop(tree);

        tracing::debug!("Updated page {}", id);
        self.emit(SiteEvent::PageUpdated(stored.clone()));
        self.after_write().await;
        Ok(stored)
    }

    /// Place `id` directly after `after_id` among its siblings (first for `None`)
    pub async fn reorder_sibling(
        &self,
        id: &str,
        after_id: Option<&str>,
    ) -> Result<PageRecord, SiteError> {
        let mut tree = self.tree.write().await;
        let page = tree
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::page_not_found(id))?;
        let parent_id = page.parent_id.clone();
        let parent = parent_id.as_deref().filter(|p| tree.contains(p));

        let mut siblings: Vec<String> = tree
            .children_of(parent)
            .iter()
            .filter(|s| s.as_str() != id)
            .cloned()
            .collect();
        let insert_at = match after_id {
            None => 0,
            Some(after) => {
                siblings.iter().position(|s| s == after).ok_or_else(|| {
                    SiteError::invalid_operation(format!("{} is not a sibling of {}", after, id))
                })? + 1
            }
        };

        let order_of = |sid: &String| tree.get(sid).map(|p| p.sort_order).unwrap_or_default();
        let prev = insert_at.checked_sub(1).map(|i| order_of(&siblings[i]));
        let next = siblings.get(insert_at).map(order_of);
        let new_order = FractionalOrderCalculator::calculate_order(prev, next);

        siblings.insert(insert_at, id.to_string());
        let orders: Vec<f64> = siblings
            .iter()
            .map(|s| if s == id { new_order } else { order_of(s) })
            .collect();
        let assignments: Vec<(String, f64)> = if FractionalOrderCalculator::needs_rebalancing(&orders) {
            tracing::debug!("Rebalancing {} siblings of {}", siblings.len(), id);
            siblings
                .iter()
                .cloned()
                .zip(FractionalOrderCalculator::rebalance(siblings.len()))
                .collect()
        } else {
            vec![(id.to_string(), new_order)]
        };

        let now = Utc::now();
        for (sid, order) in &assignments {
            let update = PageUpdate {
                sort_order: Some(*order),
                last_modified: (sid == id).then_some(now),
                ..PageUpdate::default()
            };
            if let Err(e) = self.store.update_page(sid, update).await {
                let err = SiteError::backing_store(e);
                return Err(self.resync(&mut tree, err).await);
            }
        }
        for (sid, order) in &assignments {
            if let Some(record) = tree.get_mut(sid) {
                record.sort_order = *order;
                if sid == id {
                    record.last_modified = now;
                }
            }
        }
        tree.resort_siblings(parent);
        let reordered = tree
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::page_not_found(id))?;
        drop(tree);

        self.emit(SiteEvent::PageUpdated(reordered.clone()));
        self.after_write().await;
        Ok(reordered)
    }

    //
    // SELECTION AND PREFERENCES
    //

    /// Select a page in the editor (`None` clears the selection)
    pub async fn set_active_page(&self, id: Option<&str>) -> Result<(), SiteError> {
        if let Some(id) = id {
            if !self.tree.read().await.contains(id) {
                return Err(SiteError::page_not_found(id));
            }
        }
        *self.active_page.write().await = id.map(str::to_string);
        Ok(())
    }

    pub async fn active_page(&self) -> Option<PageRecord> {
        let active = self.active_page.read().await.clone()?;
        self.tree.read().await.get(&active).cloned()
    }

    /// Flip a page's collapsed state in the sitemap, returning the new state
    pub async fn toggle_collapsed(&self, id: &str) -> Result<bool, SiteError> {
        if !self.tree.read().await.contains(id) {
            return Err(SiteError::page_not_found(id));
        }
        Ok(self.preferences.write().await.toggle_collapsed(id))
    }

    pub async fn preferences(&self) -> TreePreferences {
        self.preferences.read().await.clone()
    }

    pub async fn load_preferences(&self, path: &Path) -> anyhow::Result<()> {
        let mut loaded = TreePreferences::load_from(path).await?;
        {
            let tree = self.tree.read().await;
            loaded.retain_known(|id| tree.contains(id));
        }
        *self.preferences.write().await = loaded;
        Ok(())
    }

    pub async fn save_preferences(&self, path: &Path) -> anyhow::Result<()> {
        self.preferences.read().await.save_to(path).await
    }

    //
    // HELPERS
    //

    fn require_active<'a>(tree: &'a PageTree, id: &str) -> Result<&'a PageRecord, SiteError> {
        match tree.get(id) {
            None => Err(SiteError::page_not_found(id)),
            Some(page) if page.is_deleted => Err(SiteError::page_deleted(id)),
            Some(page) => Ok(page),
        }
    }

    // New paths for `root_id` and its subtree when the root moves to `new_root_path`
    fn plan_repath(tree: &PageTree, root_id: &str, new_root_path: &str) -> Vec<PathChange> {
        let old_root_path = match tree.get(root_id) {
            Some(page) => page.path.clone(),
            None => return Vec::new(),
        };
        tree.subtree_ids(root_id)
            .into_iter()
            .filter_map(|sid| {
                let page = tree.get(&sid)?;
                let new_path = if sid == root_id {
                    new_root_path.to_string()
                } else if is_descendant_path(&page.path, &old_root_path) {
                    rebase_path(&page.path, &old_root_path, new_root_path)
                } else {
                    tree.path_under(page.parent_id.as_deref(), leaf_of(&page.path))
                };
                Some(PathChange {
                    old_path: page.path.clone(),
                    new_path,
                    active: page.is_active(),
                    id: sid,
                })
            })
            .collect()
    }

    fn check_collisions(
        tree: &PageTree,
        root_id: &str,
        changes: &[PathChange],
    ) -> Result<(), SiteError> {
        let subtree = tree.subtree_ids(root_id);
        let mut claimed = HashSet::new();
        for change in changes.iter().filter(|c| c.active) {
            if !claimed.insert(change.new_path.as_str())
                || (change.changed() && tree.path_in_use(&change.new_path, &subtree))
            {
                return Err(SiteError::path_collision(change.new_path.clone()));
            }
        }
        Ok(())
    }

    async fn persist_repath(
        &self,
        root_id: &str,
        root_update: PageUpdate,
        changes: &[PathChange],
    ) -> Result<(), SiteError> {
        self.store
            .update_page(root_id, root_update)
            .await
            .map_err(SiteError::backing_store)?;
        for change in changes.iter().filter(|c| c.id != root_id && c.changed()) {
            let update = PageUpdate {
                path: Some(change.new_path.clone()),
                ..PageUpdate::default()
            };
            self.store
                .update_page(&change.id, update)
                .await
                .map_err(SiteError::backing_store)?;
        }
        for change in changes.iter().filter(|c| c.changed()) {
            self.redirects
                .record(&change.old_path, &change.new_path)
                .await?;
        }
        Ok(())
    }

    fn apply_repath(
        tree: &mut PageTree,
        root_id: &str,
        root_update: &PageUpdate,
        changes: &[PathChange],
    ) {
        if let Some(record) = tree.get_mut(root_id) {
            record.apply(root_update);
        }
        for change in changes.iter().filter(|c| c.id != root_id) {
            if let Some(record) = tree.get_mut(&change.id) {
                record.path = change.new_path.clone();
            }
        }
        if root_update.sort_order.is_some() {
            let parent = tree.get(root_id).and_then(|p| p.parent_id.clone());
            tree.resort_siblings(parent.as_deref());
        }
    }
}

#[cfg(test)]
#[path = "tree_service_test.rs"]
mod tree_service_test;
