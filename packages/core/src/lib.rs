//! PageTree Core
//!
//! This crate provides the content tree, content document store, redirect
//! ledger and SEO audit engine behind the PageTree site editor.
//!
//! # Architecture
//!
//! - **Flat arena**: pages are stored as a flat list with parent references
//!   and rebuilt into an id-indexed tree; nested views are derived on demand
//! - **Stored paths**: every page stores its full path, unique among active
//!   pages; moves and renames re-path whole subtrees and record redirects
//! - **Versioned documents**: each page's block list and custom code are
//!   written as one document guarded by an expected version
//! - **libsql/Turso**: embedded SQLite-compatible backing store, with an
//!   in-process store for tests and tooling
//!
//! # Modules
//!
//! - [`models`] - Data structures (PageRecord, ContentDocument, SeoReport, etc.)
//! - [`paths`] - Path and slug helpers
//! - [`services`] - Tree, content, redirect, audit and template services
//! - [`db`] - Persistence contract and its implementations
//! - [`config`] - Session configuration

pub mod config;
pub mod db;
pub mod models;
pub mod paths;
pub mod services;

// Re-export commonly used types
pub use config::SiteConfig;
pub use models::*;
pub use services::*;
