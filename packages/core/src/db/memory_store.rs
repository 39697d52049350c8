//! In-Process SiteStore
//!
//! `MemoryStore` keeps every table in memory behind a tokio `RwLock`. It is
//! the store used by tests and by embedders that persist elsewhere. Setting
//! it offline makes every call fail, which is how callers exercise
//! backing-store error paths.

use crate::db::site_store::{DocumentWrite, SiteStore};
use crate::models::{ContentDocument, PageRecord, PageUpdate, RedirectRecord, SeoReport, Template};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    // Insertion order is kept so listings are deterministic
    pages: Vec<PageRecord>,
    documents: HashMap<String, ContentDocument>,
    redirects: HashMap<String, RedirectRecord>,
    reports: HashMap<String, SeoReport>,
    templates: Vec<Template>,
}

/// SiteStore backed by in-memory tables
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with page records (test fixtures, imports)
    pub async fn with_pages(pages: Vec<PageRecord>) -> Self {
        let store = Self::new();
        store.tables.write().await.pages = pages;
        store
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("memory store is offline");
        }
        Ok(())
    }
}

#[async_trait]
impl SiteStore for MemoryStore {
    async fn list_pages(&self) -> Result<Vec<PageRecord>> {
        self.check_online()?;
        Ok(self.tables.read().await.pages.clone())
    }

    async fn insert_page(&self, page: PageRecord) -> Result<()> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if tables.pages.iter().any(|p| p.id == page.id) {
            bail!("page '{}' already exists", page.id);
        }
        tables.pages.push(page);
        Ok(())
    }

    async fn update_page(&self, id: &str, update: PageUpdate) -> Result<PageRecord> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        let page = tables
            .pages
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| anyhow!("page '{}' not found", id))?;
        page.apply(&update);
        Ok(page.clone())
    }

    async fn delete_page(&self, id: &str) -> Result<()> {
        self.check_online()?;
        self.tables.write().await.pages.retain(|p| p.id != id);
        Ok(())
    }

    async fn get_content_document(&self, page_id: &str) -> Result<Option<ContentDocument>> {
        self.check_online()?;
        Ok(self.tables.read().await.documents.get(page_id).cloned())
    }

    async fn upsert_content_document(
        &self,
        mut document: ContentDocument,
        expected_version: i64,
    ) -> Result<DocumentWrite> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        let actual_version = tables
            .documents
            .get(&document.page_id)
            .map(|d| d.version)
            .unwrap_or(0);
        if actual_version != expected_version {
            return Ok(DocumentWrite::Conflict { actual_version });
        }

        let version = expected_version + 1;
        document.version = version;
        document.updated_at = Some(Utc::now());
        tables.documents.insert(document.page_id.clone(), document);
        Ok(DocumentWrite::Written { version })
    }

    async fn delete_content_document(&self, page_id: &str) -> Result<()> {
        self.check_online()?;
        self.tables.write().await.documents.remove(page_id);
        Ok(())
    }

    async fn upsert_redirect(&self, record: RedirectRecord) -> Result<()> {
        self.check_online()?;
        self.tables
            .write()
            .await
            .redirects
            .insert(record.old_path.clone(), record);
        Ok(())
    }

    async fn get_redirect(&self, old_path: &str) -> Result<Option<RedirectRecord>> {
        self.check_online()?;
        Ok(self.tables.read().await.redirects.get(old_path).cloned())
    }

    async fn list_redirects(&self) -> Result<Vec<RedirectRecord>> {
        self.check_online()?;
        let mut redirects: Vec<RedirectRecord> =
            self.tables.read().await.redirects.values().cloned().collect();
        redirects.sort_by(|a, b| a.old_path.cmp(&b.old_path));
        Ok(redirects)
    }

    async fn upsert_seo_report(&self, report: SeoReport) -> Result<()> {
        self.check_online()?;
        self.tables
            .write()
            .await
            .reports
            .insert(report.page_id.clone(), report);
        Ok(())
    }

    async fn list_seo_reports(&self) -> Result<Vec<SeoReport>> {
        self.check_online()?;
        let mut reports: Vec<SeoReport> =
            self.tables.read().await.reports.values().cloned().collect();
        reports.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(reports)
    }

    async fn delete_seo_report(&self, page_id: &str) -> Result<()> {
        self.check_online()?;
        self.tables.write().await.reports.remove(page_id);
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<Template>> {
        self.check_online()?;
        Ok(self.tables.read().await.templates.clone())
    }

    async fn upsert_template(&self, template: Template) -> Result<()> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        match tables.templates.iter_mut().find(|t| t.id == template.id) {
            Some(existing) => *existing = template,
            None => tables.templates.push(template),
        }
        Ok(())
    }
}
