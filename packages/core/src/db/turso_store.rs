//! TursoStore - libsql implementation of SiteStore
//!
//! Persists the site in an embedded SQLite-compatible database. Page rows
//! keep their structured parts (`page_data`, `seo_metadata`) as JSON text;
//! content documents, reports and templates are stored as whole JSON
//! documents keyed by id, matching the full-replace write model.
//!
//! # Database Connection Patterns
//!
//! Every operation opens a fresh connection with a 5-second busy timeout so
//! concurrent writers wait instead of failing with `SQLITE_BUSY`, and so no
//! connection is held across tasks.

use crate::db::error::DatabaseError;
use crate::db::site_store::{DocumentWrite, SiteStore};
use crate::models::{
    ContentDocument, PageRecord, PageStatus, PageUpdate, RedirectRecord, SeoMetadata, SeoReport,
    Template,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, Row};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

const PAGE_COLUMNS: &str = "id, parent_id, title, path, status, locked, is_deleted, \
                            last_modified, template_id, page_data, seo_metadata, sort_order";

/// SiteStore backed by a local libsql database file
#[derive(Debug, Clone)]
pub struct TursoStore {
    db: Arc<Database>,
    db_path: PathBuf,
}

impl TursoStore {
    /// Open (or create) the database at `db_path` and ensure the schema exists
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            db: Arc::new(db),
            db_path,
        };
        store.initialize_schema().await?;
        tracing::debug!("Opened site database at {}", store.db_path.display());
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self.db.connect()?;
        Self::execute_pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        Ok(conn)
    }

    async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        conn.query(pragma, ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        Self::execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;

        let statements = [
            "CREATE TABLE IF NOT EXISTS pages (
                id TEXT PRIMARY KEY,
                parent_id TEXT,
                title TEXT NOT NULL,
                path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                locked INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                last_modified TEXT NOT NULL,
                template_id TEXT,
                page_data TEXT NOT NULL DEFAULT '{}',
                seo_metadata TEXT NOT NULL DEFAULT '{}',
                sort_order REAL NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_pages_path ON pages(path)",
            "CREATE TABLE IF NOT EXISTS page_content (
                page_id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                version INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS redirects (
                old_path TEXT PRIMARY KEY,
                new_path TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS seo_reports (
                page_id TEXT PRIMARY KEY,
                report TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                template TEXT NOT NULL
            )",
        ];

        for sql in statements {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("{}: {}", first_line(sql), e))
            })?;
        }
        Ok(())
    }

    async fn get_page(&self, conn: &Connection, id: &str) -> Result<Option<PageRecord>> {
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS),
                [id],
            )
            .await
            .context("Failed to query page")?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_page(&row)?)),
            None => Ok(None),
        }
    }
}

fn first_line(sql: &str) -> &str {
    sql.lines().next().unwrap_or(sql).trim()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp '{}'", value))?
        .with_timezone(&Utc))
}

fn row_to_page(row: &Row) -> Result<PageRecord> {
    let id: String = row.get(0).context("Failed to get id")?;
    let parent_id: Option<String> = row.get(1).context("Failed to get parent_id")?;
    let title: String = row.get(2).context("Failed to get title")?;
    let path: String = row.get(3).context("Failed to get path")?;
    let status_str: String = row.get(4).context("Failed to get status")?;
    let locked: i64 = row.get(5).context("Failed to get locked")?;
    let is_deleted: i64 = row.get(6).context("Failed to get is_deleted")?;
    let last_modified_str: String = row.get(7).context("Failed to get last_modified")?;
    let template_id: Option<String> = row.get(8).context("Failed to get template_id")?;
    let page_data_json: String = row.get(9).context("Failed to get page_data")?;
    let seo_json: String = row.get(10).context("Failed to get seo_metadata")?;
    let sort_order: f64 = row.get(11).context("Failed to get sort_order")?;

    let status: PageStatus = status_str
        .parse()
        .map_err(|e| DatabaseError::corrupt_row("pages", id.clone(), e))?;
    let page_data: Map<String, Value> = serde_json::from_str(&page_data_json)
        .map_err(|e| DatabaseError::corrupt_row("pages", id.clone(), e))?;
    let seo_metadata: SeoMetadata = serde_json::from_str(&seo_json)
        .map_err(|e| DatabaseError::corrupt_row("pages", id.clone(), e))?;

    Ok(PageRecord {
        last_modified: parse_timestamp(&last_modified_str)?,
        id,
        parent_id,
        title,
        path,
        status,
        locked: locked != 0,
        is_deleted: is_deleted != 0,
        template_id,
        page_data,
        seo_metadata,
        sort_order,
    })
}

#[async_trait]
impl SiteStore for TursoStore {
    async fn list_pages(&self) -> Result<Vec<PageRecord>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM pages ORDER BY sort_order, rowid", PAGE_COLUMNS),
                (),
            )
            .await
            .context("Failed to list pages")?;

        let mut pages = Vec::new();
        while let Some(row) = rows.next().await? {
            pages.push(row_to_page(&row)?);
        }
        Ok(pages)
    }

    async fn insert_page(&self, page: PageRecord) -> Result<()> {
        let conn = self.connect().await?;
        conn.execute(
            &format!(
                "INSERT INTO pages ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                PAGE_COLUMNS
            ),
            (
                page.id.as_str(),
                page.parent_id.as_deref(),
                page.title.as_str(),
                page.path.as_str(),
                page.status.as_str(),
                page.locked as i64,
                page.is_deleted as i64,
                page.last_modified.to_rfc3339(),
                page.template_id.as_deref(),
                serde_json::to_string(&page.page_data)?,
                serde_json::to_string(&page.seo_metadata)?,
                page.sort_order,
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert page: {}", e)))?;
        Ok(())
    }

    async fn update_page(&self, id: &str, update: PageUpdate) -> Result<PageRecord> {
        let conn = self.connect().await?;
        let mut page = self
            .get_page(&conn, id)
            .await?
            .ok_or_else(|| anyhow!("page '{}' not found", id))?;
        page.apply(&update);

        conn.execute(
            "UPDATE pages SET parent_id = ?, title = ?, path = ?, status = ?, locked = ?,
                    is_deleted = ?, last_modified = ?, template_id = ?, page_data = ?,
                    seo_metadata = ?, sort_order = ?
             WHERE id = ?",
            (
                page.parent_id.as_deref(),
                page.title.as_str(),
                page.path.as_str(),
                page.status.as_str(),
                page.locked as i64,
                page.is_deleted as i64,
                page.last_modified.to_rfc3339(),
                page.template_id.as_deref(),
                serde_json::to_string(&page.page_data)?,
                serde_json::to_string(&page.seo_metadata)?,
                page.sort_order,
                id,
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to update page: {}", e)))?;
        Ok(page)
    }

    async fn delete_page(&self, id: &str) -> Result<()> {
        let conn = self.connect().await?;
        conn.execute("DELETE FROM pages WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete page: {}", e)))?;
        Ok(())
    }

    async fn get_content_document(&self, page_id: &str) -> Result<Option<ContentDocument>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT document, version FROM page_content WHERE page_id = ?",
                [page_id],
            )
            .await
            .context("Failed to query content document")?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let json: String = row.get(0).context("Failed to get document")?;
        let version: i64 = row.get(1).context("Failed to get version")?;
        let mut document: ContentDocument = serde_json::from_str(&json)
            .map_err(|e| DatabaseError::corrupt_row("page_content", page_id, e))?;
        document.version = version;
        Ok(Some(document))
    }

    async fn upsert_content_document(
        &self,
        mut document: ContentDocument,
        expected_version: i64,
    ) -> Result<DocumentWrite> {
        let conn = self.connect().await?;
        let version = expected_version + 1;
        document.version = version;
        document.updated_at = Some(Utc::now());
        let json = serde_json::to_string(&document)?;

        // Compare-and-swap on the version column; zero affected rows means stale
        let result = if expected_version == 0 {
            conn.execute(
                "INSERT INTO page_content (page_id, document, version) VALUES (?, ?, ?)
                 ON CONFLICT(page_id) DO NOTHING",
                (document.page_id.as_str(), json.as_str(), version),
            )
            .await
        } else {
            conn.execute(
                "UPDATE page_content SET document = ?, version = ? WHERE page_id = ? AND version = ?",
                (json.as_str(), version, document.page_id.as_str(), expected_version),
            )
            .await
        };
        let affected = result.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to write content document: {}", e))
        })?;

        if affected == 1 {
            return Ok(DocumentWrite::Written { version });
        }

        let actual_version = self
            .get_content_document(&document.page_id)
            .await?
            .map(|d| d.version)
            .unwrap_or(0);
        Ok(DocumentWrite::Conflict { actual_version })
    }

    async fn delete_content_document(&self, page_id: &str) -> Result<()> {
        let conn = self.connect().await?;
        conn.execute("DELETE FROM page_content WHERE page_id = ?", [page_id])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to delete content document: {}", e))
            })?;
        Ok(())
    }

    async fn upsert_redirect(&self, record: RedirectRecord) -> Result<()> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO redirects (old_path, new_path, created_at) VALUES (?, ?, ?)
             ON CONFLICT(old_path) DO UPDATE SET new_path = excluded.new_path,
                                                 created_at = excluded.created_at",
            (
                record.old_path.as_str(),
                record.new_path.as_str(),
                record.created_at.to_rfc3339(),
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to upsert redirect: {}", e)))?;
        Ok(())
    }

    async fn get_redirect(&self, old_path: &str) -> Result<Option<RedirectRecord>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT old_path, new_path, created_at FROM redirects WHERE old_path = ?",
                [old_path],
            )
            .await
            .context("Failed to query redirect")?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_redirect(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_redirects(&self) -> Result<Vec<RedirectRecord>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT old_path, new_path, created_at FROM redirects ORDER BY old_path",
                (),
            )
            .await
            .context("Failed to list redirects")?;
        let mut redirects = Vec::new();
        while let Some(row) = rows.next().await? {
            redirects.push(row_to_redirect(&row)?);
        }
        Ok(redirects)
    }

    async fn upsert_seo_report(&self, report: SeoReport) -> Result<()> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO seo_reports (page_id, report) VALUES (?, ?)
             ON CONFLICT(page_id) DO UPDATE SET report = excluded.report",
            (report.page_id.as_str(), serde_json::to_string(&report)?),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to upsert SEO report: {}", e)))?;
        Ok(())
    }

    async fn list_seo_reports(&self) -> Result<Vec<SeoReport>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query("SELECT page_id, report FROM seo_reports ORDER BY page_id", ())
            .await
            .context("Failed to list SEO reports")?;
        let mut reports = Vec::new();
        while let Some(row) = rows.next().await? {
            let page_id: String = row.get(0).context("Failed to get page_id")?;
            let json: String = row.get(1).context("Failed to get report")?;
            let report: SeoReport = serde_json::from_str(&json)
                .map_err(|e| DatabaseError::corrupt_row("seo_reports", page_id, e))?;
            reports.push(report);
        }
        reports.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(reports)
    }

    async fn delete_seo_report(&self, page_id: &str) -> Result<()> {
        let conn = self.connect().await?;
        conn.execute("DELETE FROM seo_reports WHERE page_id = ?", [page_id])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to delete SEO report: {}", e))
            })?;
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<Template>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query("SELECT id, template FROM templates ORDER BY rowid", ())
            .await
            .context("Failed to list templates")?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0).context("Failed to get id")?;
            let json: String = row.get(1).context("Failed to get template")?;
            let template: Template = serde_json::from_str(&json)
                .map_err(|e| DatabaseError::corrupt_row("templates", id, e))?;
            templates.push(template);
        }
        Ok(templates)
    }

    async fn upsert_template(&self, template: Template) -> Result<()> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO templates (id, template) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET template = excluded.template",
            (template.id.as_str(), serde_json::to_string(&template)?),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to upsert template: {}", e)))?;
        Ok(())
    }
}

fn row_to_redirect(row: &Row) -> Result<RedirectRecord> {
    let old_path: String = row.get(0).context("Failed to get old_path")?;
    let new_path: String = row.get(1).context("Failed to get new_path")?;
    let created_at: String = row.get(2).context("Failed to get created_at")?;
    Ok(RedirectRecord {
        old_path,
        new_path,
        created_at: parse_timestamp(&created_at)?,
    })
}
