//! Database Layer
//!
//! This module defines the persistence contract used by the PageTree
//! services and its implementations:
//!
//! - `SiteStore` - async trait over pages, content documents, redirects,
//!   SEO reports and templates
//! - `MemoryStore` - in-process implementation (tests, embedding)
//! - `TursoStore` - libsql/Turso embedded database implementation
//!
//! Any backend satisfying `SiteStore` is substitutable; services only ever
//! hold an `Arc<dyn SiteStore>`.

mod error;
pub mod fractional_ordering;
mod memory_store;
mod site_store;
mod turso_store;

pub use error::DatabaseError;
pub use fractional_ordering::FractionalOrderCalculator;
pub use memory_store::MemoryStore;
pub use site_store::{DocumentWrite, SiteStore};
pub use turso_store::TursoStore;
