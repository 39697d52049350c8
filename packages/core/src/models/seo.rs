//! Redirect and SEO report records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mapping from a retired path to its replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRecord {
    pub old_path: String,
    pub new_path: String,
    pub created_at: DateTime<Utc>,
}

impl RedirectRecord {
    pub fn new(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            old_path: old_path.into(),
            new_path: new_path.into(),
            created_at: Utc::now(),
        }
    }
}

/// Three-level search-engine health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeoScore {
    Good,
    Warning,
    Critical,
}

impl fmt::Display for SeoScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SeoScore::Good => "good",
            SeoScore::Warning => "warning",
            SeoScore::Critical => "critical",
        })
    }
}

/// Result of one audit run for a page, always written as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoReport {
    pub page_id: String,
    pub path: String,
    pub score: SeoScore,
    pub missing_tags: Vec<String>,
    pub broken_links: u32,
    pub missing_alt_count: u32,
    pub security_issues: u32,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub reading_time_minutes: u32,
    #[serde(default)]
    pub keyword_density: BTreeMap<String, f64>,
    pub last_run: DateTime<Utc>,
}

impl SeoReport {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.missing_tags.iter().any(|t| t == tag)
    }
}
