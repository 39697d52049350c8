//! Site Events
//!
//! Events emitted by the site services after a remote write succeeds. They
//! are delivered on a tokio broadcast channel so cache revalidation and UI
//! refresh can subscribe without coupling to the services.
//!
//! # Event Flow
//!
//! 1. A service validates and persists a change
//! 2. The matching `SiteEvent` is sent on the shared channel
//! 3. Every subscriber receives it; a missing subscriber is not an error

use crate::models::{PageRecord, RedirectRecord, SeoScore};

/// Broadcast capacity used when no configuration overrides it
pub const SITE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Changes to the site observable by subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SiteEvent {
    /// A page was added or copied
    PageCreated(PageRecord),

    /// Title, path, status, lock, SEO or page data changed
    PageUpdated(PageRecord),

    /// A page moved to a new parent; `old_path` may equal `new_path` for root-level moves
    PageMoved {
        id: String,
        old_path: String,
        new_path: String,
    },

    PageSoftDeleted { id: String },

    PageRestored { id: String },

    /// Pages permanently removed, parent before children
    PageDeleted { ids: Vec<String> },

    /// A content document write was accepted at `version`
    DocumentSaved { page_id: String, version: i64 },

    RedirectRecorded(RedirectRecord),

    AuditCompleted { page_id: String, score: SeoScore },
}

impl SiteEvent {
    /// Stable string tag for logging and external consumers
    pub fn event_type(&self) -> &'static str {
        match self {
            SiteEvent::PageCreated(_) => "page:created",
            SiteEvent::PageUpdated(_) => "page:updated",
            SiteEvent::PageMoved { .. } => "page:moved",
            SiteEvent::PageSoftDeleted { .. } => "page:soft-deleted",
            SiteEvent::PageRestored { .. } => "page:restored",
            SiteEvent::PageDeleted { .. } => "page:deleted",
            SiteEvent::DocumentSaved { .. } => "document:saved",
            SiteEvent::RedirectRecorded(_) => "redirect:recorded",
            SiteEvent::AuditCompleted { .. } => "audit:completed",
        }
    }
}
