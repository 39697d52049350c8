//! Service Layer Error Types
//!
//! This module defines the error type returned by every site service
//! operation. Structural violations (`PathCollision`, `Cycle`) are detected
//! before any write is issued; `BackingStore` means the remote write itself
//! failed and local state may be ahead of the store until the next reload.

use crate::models::ValidationError;
use thiserror::Error;

/// Site service errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SiteError {
    /// Path already used by another active page
    #[error("Path already in use: {path}")]
    PathCollision { path: String },

    /// Move destination lies inside the moved page's own subtree
    #[error("Cannot move page {page_id} under {target_parent_id}: destination is inside its own subtree")]
    Cycle {
        page_id: String,
        target_parent_id: String,
    },

    /// Page not found by ID
    #[error("Page not found: {id}")]
    PageNotFound { id: String },

    /// Block not found in a page's content document
    #[error("Block {block_id} not found on page {page_id}")]
    BlockNotFound { page_id: String, block_id: String },

    /// Template not found by ID
    #[error("Template not found: {id}")]
    TemplateNotFound { id: String },

    /// Operation targets a soft-deleted page
    #[error("Page is deleted: {id}")]
    PageDeleted { id: String },

    /// Version conflict (optimistic concurrency control)
    #[error("Version conflict for page {page_id}: expected version {expected_version}, found {actual_version}")]
    VersionConflict {
        page_id: String,
        expected_version: i64,
        actual_version: i64,
    },

    /// Path could not be normalized
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Operation is not legal for the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Every generated copy path collided
    #[error("Could not find a free copy path for '{leaf}' after {attempts} attempts")]
    CopyPathExhausted { leaf: String, attempts: u32 },

    /// The backing store call failed
    #[error("Backing store error: {0}")]
    BackingStore(String),

    /// Model validation failed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl SiteError {
    /// Create a path collision error
    pub fn path_collision(path: impl Into<String>) -> Self {
        Self::PathCollision { path: path.into() }
    }

    /// Create a cycle error
    pub fn cycle(page_id: impl Into<String>, target_parent_id: impl Into<String>) -> Self {
        Self::Cycle {
            page_id: page_id.into(),
            target_parent_id: target_parent_id.into(),
        }
    }

    /// Create a page not found error
    pub fn page_not_found(id: impl Into<String>) -> Self {
        Self::PageNotFound { id: id.into() }
    }

    /// Create a block not found error
    pub fn block_not_found(page_id: impl Into<String>, block_id: impl Into<String>) -> Self {
        Self::BlockNotFound {
            page_id: page_id.into(),
            block_id: block_id.into(),
        }
    }

    /// Create a template not found error
    pub fn template_not_found(id: impl Into<String>) -> Self {
        Self::TemplateNotFound { id: id.into() }
    }

    /// Create a page deleted error
    pub fn page_deleted(id: impl Into<String>) -> Self {
        Self::PageDeleted { id: id.into() }
    }

    /// Create a version conflict error
    pub fn version_conflict(
        page_id: impl Into<String>,
        expected_version: i64,
        actual_version: i64,
    ) -> Self {
        Self::VersionConflict {
            page_id: page_id.into(),
            expected_version,
            actual_version,
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create a copy path exhausted error
    pub fn copy_path_exhausted(leaf: impl Into<String>, attempts: u32) -> Self {
        Self::CopyPathExhausted {
            leaf: leaf.into(),
            attempts,
        }
    }

    /// Wrap a backing store failure, keeping the full context chain
    ///
    /// Used as `map_err(SiteError::backing_store)` on `SiteStore` calls.
    pub fn backing_store(err: anyhow::Error) -> Self {
        Self::BackingStore(format!("{:#}", err))
    }
}
