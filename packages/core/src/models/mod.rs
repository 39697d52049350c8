//! Data Models
//!
//! This module contains the data structures shared by every PageTree service:
//!
//! - `PageRecord` / `PageNode` - Sitemap pages, flat and nested
//! - `ContentDocument` - Ordered block list and custom code per page
//! - `Template` - Reference data describing structured page fields
//! - `RedirectRecord` / `SeoReport` - Redirect ledger entries and audit results

mod content;
mod page;
mod seo;
mod template;

pub use content::{BlockType, CodeKind, ContentBlock, ContentDocument, CustomCode};
pub use page::{PageNode, PageRecord, PageStatus, PageUpdate, SeoMetadata, ValidationError};
pub use seo::{RedirectRecord, SeoReport, SeoScore};
pub use template::{FieldType, SelectOption, Template, TemplateField};
