//! Site Session
//!
//! `Site` is built once per session and hands out the services that share
//! its page tree, store and event channel. Consumers receive it by
//! reference instead of reaching for a global.
//!
//! # Example
//!
//! ```no_run
//! # use pagetree_core::db::MemoryStore;
//! # use pagetree_core::services::{NewPage, Site};
//! # use pagetree_core::config::SiteConfig;
//! # use std::sync::Arc;
//! # async fn example() -> anyhow::Result<()> {
//! let site = Site::new(Arc::new(MemoryStore::new()), SiteConfig::default());
//! site.load().await?;
//!
//! let home = site.tree().add_page(None, NewPage::new("Home").with_slug("")).await?;
//! site.tree().add_page(Some(&home.id), NewPage::new("About Us")).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::SiteConfig;
use crate::db::SiteStore;
use crate::models::PageRecord;
use crate::paths::normalize_path;
use crate::services::content_service::ContentService;
use crate::services::error::SiteError;
use crate::services::events::SiteEvent;
use crate::services::page_tree::{PageTree, SharedTree};
use crate::services::redirect_ledger::RedirectLedger;
use crate::services::seo_audit::SeoAuditService;
use crate::services::template_registry::TemplateRegistry;
use crate::services::tree_service::TreeService;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// What a request path maps to
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An active page owns the path
    Page(PageRecord),
    /// The path was retired; the value is its direct replacement
    Redirect(String),
    NotFound,
}

/// One editing session over a backing store
#[derive(Clone)]
pub struct Site {
    config: SiteConfig,
    tree: TreeService,
    content: ContentService,
    redirects: RedirectLedger,
    templates: TemplateRegistry,
    audits: SeoAuditService,
    event_tx: broadcast::Sender<SiteEvent>,
}

impl Site {
    /// Wire every service to `store`; nothing is read until [`Site::load`]
    pub fn new(store: Arc<dyn SiteStore>, config: SiteConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let shared: SharedTree = Arc::new(RwLock::new(PageTree::new()));

        let content = ContentService::new(store.clone(), shared.clone(), event_tx.clone());
        let redirects = RedirectLedger::new(store.clone(), event_tx.clone());
        let templates = TemplateRegistry::new(store.clone());
        let audits = SeoAuditService::new(
            store.clone(),
            shared.clone(),
            content.clone(),
            config.words_per_minute,
            event_tx.clone(),
        );
        let tree = TreeService::new(
            store,
            shared,
            content.clone(),
            redirects.clone(),
            templates.clone(),
            config.clone(),
            event_tx.clone(),
        );

        Self {
            config,
            tree,
            content,
            redirects,
            templates,
            audits,
            event_tx,
        }
    }

    /// Fetch pages, redirects and templates from the store
    pub async fn load(&self) -> Result<(), SiteError> {
        let pages = self.tree.reload().await?;
        let redirects = self.redirects.load().await?;
        let templates = self.templates.load().await?;
        self.content.clear_cache().await;
        tracing::info!(
            "Site loaded: {} pages, {} redirects, {} templates",
            pages,
            redirects,
            templates
        );
        Ok(())
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn tree(&self) -> &TreeService {
        &self.tree
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    pub fn redirects(&self) -> &RedirectLedger {
        &self.redirects
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn audits(&self) -> &SeoAuditService {
        &self.audits
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SiteEvent> {
        self.event_tx.subscribe()
    }

    /// Map a requested path to a page, a redirect, or nothing
    ///
    /// An active page always wins over a redirect recorded for the same
    /// path. Redirect chains are returned one hop at a time.
    pub async fn resolve_request(&self, path: &str) -> Result<Resolution, SiteError> {
        let Some(path) = normalize_path(path) else {
            return Ok(Resolution::NotFound);
        };
        if let Some(page) = self.tree.find_by_path(&path).await {
            return Ok(Resolution::Page(page));
        }
        Ok(match self.redirects.resolve(&path).await? {
            Some(target) => Resolution::Redirect(target),
            None => Resolution::NotFound,
        })
    }
}
