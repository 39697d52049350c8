//! Site Audit Binary
//!
//! Opens a PageTree database, loads the site and runs the SEO audit over
//! every active page, then prints one line per page.
//!
//! # Usage
//!
//! ```bash
//! # Audit the default database (./pagetree.db)
//! cargo run --bin site-audit
//!
//! # Audit another database with a config file
//! SITE_DB_PATH=/tmp/site.db SITE_CONFIG_PATH=site.json cargo run --bin site-audit
//! ```
//!
//! # Environment Variables
//!
//! - `SITE_DB_PATH`: Database file (default: `./pagetree.db`)
//! - `SITE_CONFIG_PATH`: Optional `SiteConfig` JSON file
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use pagetree_core::db::TursoStore;
use pagetree_core::{SeoScore, Site, SiteConfig};

const DEFAULT_DB_PATH: &str = "pagetree.db";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let db_path: PathBuf = env::var("SITE_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));
    let config = match env::var("SITE_CONFIG_PATH") {
        Ok(path) => SiteConfig::load(&PathBuf::from(path)).await?,
        Err(_) => SiteConfig::default(),
    }
    .apply_env_overrides();

    tracing::info!("Database: {}", db_path.display());
    let store = Arc::new(TursoStore::new(db_path).await?);
    let site = Site::new(store, config);
    site.load().await?;

    let stats = site.tree().stats().await;
    tracing::info!(
        "Auditing {} active pages ({} soft-deleted skipped)",
        stats.active,
        stats.soft_deleted
    );

    let reports = site.audits().run_global_audit().await?;

    println!(
        "{:<9} {:>6} {:>5} {:>8} {:>6}  {:<32} MISSING",
        "SCORE", "BROKEN", "ALT", "SECURITY", "WORDS", "PATH"
    );
    for report in &reports {
        println!(
            "{:<9} {:>6} {:>5} {:>8} {:>6}  {:<32} {}",
            report.score,
            report.broken_links,
            report.missing_alt_count,
            report.security_issues,
            report.word_count,
            report.path,
            report.missing_tags.join(", ")
        );
    }

    let count = |score: SeoScore| reports.iter().filter(|r| r.score == score).count();
    println!(
        "\n{} pages: {} good, {} warning, {} critical",
        reports.len(),
        count(SeoScore::Good),
        count(SeoScore::Warning),
        count(SeoScore::Critical)
    );

    Ok(())
}
