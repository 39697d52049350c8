//! SiteStore Trait - Persistence Abstraction Layer
//!
//! This module defines the `SiteStore` trait: the contract the content tree
//! services need from the remote relational store. The store is treated as an
//! asynchronous document API (read-by-id, read-all, insert, update, delete,
//! upsert); schema enforcement and transactions are its own business.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: every method is async so embedded (libsql) and
//!    networked backends are interchangeable
//! 2. **Ownership Semantics**: methods take ownership of records to avoid
//!    needless cloning
//! 3. **Error Handling**: `anyhow::Result` for flexible backend context; the
//!    service layer maps failures to `SiteError::BackingStore`
//! 4. **Versioned documents**: content writes carry the version the caller
//!    last saw, and stale writes are reported instead of applied
//!
//! # Examples
//!
//! ```rust
//! use pagetree_core::db::{MemoryStore, SiteStore};
//! use pagetree_core::models::PageRecord;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let store: Arc<dyn SiteStore> = Arc::new(MemoryStore::new());
//! store.insert_page(PageRecord::new_with_id("home", "Home", "/", None)).await?;
//! assert_eq!(store.list_pages().await?.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::models::{ContentDocument, PageRecord, PageUpdate, RedirectRecord, SeoReport, Template};
use anyhow::Result;
use async_trait::async_trait;

/// Outcome of a versioned content document write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentWrite {
    /// The write was applied; the document now carries `version`
    Written { version: i64 },

    /// The stored version did not match the expected one; nothing was written
    Conflict { actual_version: i64 },
}

/// Abstraction layer for site persistence operations
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so services can share them behind
/// an `Arc` across tasks.
///
/// # Method Categories
///
/// - **Pages**: list, insert, update, delete (hard)
/// - **Content documents**: get, versioned upsert, delete
/// - **Redirects**: upsert keyed by old path, get, list
/// - **SEO reports**: upsert keyed by page, list, delete
/// - **Templates**: list, upsert
#[async_trait]
pub trait SiteStore: Send + Sync {
    //
    // PAGES
    //

    /// Every page record, soft-deleted ones included, in no particular order
    async fn list_pages(&self) -> Result<Vec<PageRecord>>;

    /// Insert a new page record
    ///
    /// # Errors
    ///
    /// Returns error if a page with the same id already exists.
    async fn insert_page(&self, page: PageRecord) -> Result<()>;

    /// Apply a sparse update to a page and return the stored result
    ///
    /// # Errors
    ///
    /// Returns error if the page does not exist.
    async fn update_page(&self, id: &str, update: PageUpdate) -> Result<PageRecord>;

    /// Permanently remove a page record
    ///
    /// Deleting a missing page succeeds silently (idempotent delete). Child
    /// records and content are NOT touched; callers delete those explicitly.
    async fn delete_page(&self, id: &str) -> Result<()>;

    //
    // CONTENT DOCUMENTS
    //

    /// Stored document for a page, `None` when the page has never been edited
    async fn get_content_document(&self, page_id: &str) -> Result<Option<ContentDocument>>;

    /// Replace a page's document if the stored version equals `expected_version`
    ///
    /// A missing document has version 0. On success the stored document
    /// carries `expected_version + 1`.
    async fn upsert_content_document(
        &self,
        document: ContentDocument,
        expected_version: i64,
    ) -> Result<DocumentWrite>;

    /// Remove a page's document (idempotent)
    async fn delete_content_document(&self, page_id: &str) -> Result<()>;

    //
    // REDIRECTS
    //

    /// Insert or replace the redirect keyed by `record.old_path`
    async fn upsert_redirect(&self, record: RedirectRecord) -> Result<()>;

    /// Redirect registered for `old_path`, if any
    async fn get_redirect(&self, old_path: &str) -> Result<Option<RedirectRecord>>;

    async fn list_redirects(&self) -> Result<Vec<RedirectRecord>>;

    //
    // SEO REPORTS
    //

    /// Insert or fully replace the report for `report.page_id`
    async fn upsert_seo_report(&self, report: SeoReport) -> Result<()>;

    async fn list_seo_reports(&self) -> Result<Vec<SeoReport>>;

    /// Remove a page's report (idempotent)
    async fn delete_seo_report(&self, page_id: &str) -> Result<()>;

    //
    // TEMPLATES
    //

    async fn list_templates(&self) -> Result<Vec<Template>>;

    async fn upsert_template(&self, template: Template) -> Result<()>;
}
