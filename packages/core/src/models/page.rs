//! Page Data Structures
//!
//! This module defines the sitemap page records and their nested view.
//!
//! # Architecture
//!
//! - **Flat record**: `PageRecord` is what the backing store persists, one row per
//!   page with a `parent_id` reference and a fractional `sort_order` among siblings
//! - **Nested view**: `PageNode` is derived on demand from the in-memory arena and
//!   owns its children exclusively
//! - **Template data**: `page_data` holds template field values keyed by field id
//!
//! # Examples
//!
//! ```rust
//! use pagetree_core::models::{PageRecord, PageStatus};
//!
//! let page = PageRecord::new("About", "/about", None);
//! assert_eq!(page.status, PageStatus::Draft);
//! assert!(!page.is_deleted);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for model values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid page status: {0}")]
    InvalidStatus(String),

    #[error("Invalid block type: {0}")]
    InvalidBlockType(String),

    #[error("Invalid field type: {0}")]
    InvalidFieldType(String),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

/// Publication status of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Draft => "draft",
            PageStatus::Published => "published",
            PageStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PageStatus::Draft),
            "published" => Ok(PageStatus::Published),
            "archived" => Ok(PageStatus::Archived),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

/// Search-engine metadata attached to a page
///
/// A text field counts as absent when it is `None` or blank after trimming.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,

    #[serde(default)]
    pub no_index: bool,
}

impl SeoMetadata {
    pub fn has_title(&self) -> bool {
        is_present(&self.title)
    }

    pub fn has_description(&self) -> bool {
        is_present(&self.description)
    }

    pub fn has_og_image(&self) -> bool {
        is_present(&self.og_image)
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// A sitemap page as persisted by the backing store.
///
/// # Fields
///
/// - `id`: Opaque unique token (UUID v4 for pages created here)
/// - `parent_id`: Parent page, `None` for roots
/// - `path`: Slash-separated address, unique among non-deleted pages
/// - `is_deleted`: Soft-delete flag; the page keeps its tree position
/// - `sort_order`: Fractional position among siblings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub id: String,

    #[serde(default)]
    pub parent_id: Option<String>,

    pub title: String,

    pub path: String,

    #[serde(default)]
    pub status: PageStatus,

    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub is_deleted: bool,

    pub last_modified: DateTime<Utc>,

    #[serde(default)]
    pub template_id: Option<String>,

    #[serde(default)]
    pub page_data: Map<String, Value>,

    #[serde(default)]
    pub seo_metadata: SeoMetadata,

    #[serde(default)]
    pub sort_order: f64,
}

impl PageRecord {
    /// Create a draft page with a fresh UUID
    pub fn new(title: impl Into<String>, path: impl Into<String>, parent_id: Option<String>) -> Self {
        Self::new_with_id(Uuid::new_v4().to_string(), title, path, parent_id)
    }

    /// Create a draft page with an explicit id
    pub fn new_with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        path: impl Into<String>,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id,
            title: title.into(),
            path: path.into(),
            status: PageStatus::Draft,
            locked: false,
            is_deleted: false,
            last_modified: Utc::now(),
            template_id: None,
            page_data: Map::new(),
            seo_metadata: SeoMetadata::default(),
            sort_order: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    /// Apply a sparse update in place
    ///
    /// `seo_metadata` in the update replaces the whole block; callers that want a
    /// field-level merge build the merged value first.
    pub fn apply(&mut self, update: &PageUpdate) {
        if let Some(parent_id) = &update.parent_id {
            self.parent_id = parent_id.clone();
        }
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(path) = &update.path {
            self.path = path.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(locked) = update.locked {
            self.locked = locked;
        }
        if let Some(is_deleted) = update.is_deleted {
            self.is_deleted = is_deleted;
        }
        if let Some(last_modified) = update.last_modified {
            self.last_modified = last_modified;
        }
        if let Some(template_id) = &update.template_id {
            self.template_id = template_id.clone();
        }
        if let Some(page_data) = &update.page_data {
            self.page_data = page_data.clone();
        }
        if let Some(seo) = &update.seo_metadata {
            self.seo_metadata = seo.clone();
        }
        if let Some(sort_order) = update.sort_order {
            self.sort_order = sort_order;
        }
    }
}

/// Sparse update for a page record (only provided fields change)
///
/// Double options distinguish "leave unchanged" (`None`) from "clear"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_metadata: Option<SeoMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<f64>,
}

impl PageUpdate {
    pub fn is_empty(&self) -> bool {
        *self == PageUpdate::default()
    }
}

/// Nested page view with exclusively owned children
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNode {
    #[serde(flatten)]
    pub record: PageRecord,
    pub children: Vec<PageNode>,
}

impl PageNode {
    /// Depth-first search for a node by id within this subtree
    pub fn find(&self, id: &str) -> Option<&PageNode> {
        if self.record.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Number of nodes in this subtree, including self
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(PageNode::subtree_size).sum::<usize>()
    }
}
