//! Site Services
//!
//! This module contains the services that keep the site consistent:
//!
//! - `TreeService` - Structural page operations over the shared `PageTree`
//! - `ContentService` - Versioned per-page content documents
//! - `RedirectLedger` - Retired path -> replacement mapping
//! - `SeoAuditService` - Search-engine health audits
//! - `TemplateRegistry` - Template reference data and page data defaults
//! - `Site` - Session facade wiring the services to one store
//!
//! Services share one `SharedTree` and one broadcast channel of `SiteEvent`s
//! and report failures as `SiteError`.

pub mod content_service;
pub mod error;
pub mod events;
pub mod page_tree;
pub mod preferences;
pub mod redirect_ledger;
pub mod seo_audit;
pub mod site;
pub mod template_registry;
pub mod tree_service;

pub use content_service::ContentService;
pub use error::SiteError;
pub use events::{SiteEvent, SITE_EVENT_CHANNEL_CAPACITY};
pub use page_tree::{PageTree, SharedTree, TreeStats};
pub use preferences::TreePreferences;
pub use redirect_ledger::RedirectLedger;
pub use seo_audit::{audit_page, score_report, SeoAuditService};
pub use site::{Resolution, Site};
pub use template_registry::TemplateRegistry;
pub use tree_service::{DeleteOutcome, NewPage, RenamePage, TreeService};
