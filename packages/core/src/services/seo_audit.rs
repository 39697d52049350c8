//! SEO Audit Engine
//!
//! Scores a page's search-engine health from its metadata and content
//! document. The scan itself ([`audit_page`]) is pure; [`SeoAuditService`]
//! wires it to the shared tree, the content service and the store.
//!
//! # Defects
//!
//! - Metadata: missing title, description or og:image
//! - `h1-unique`: the page does not have exactly one top-level heading
//! - Images without alt text (block props, Markdown and raw `<img>`)
//! - External links opened in a new context without `noopener`
//! - Site-relative links to paths no active page owns
//!
//! # Scoring
//!
//! ```text
//! good     -> default
//! warning  -> more than one missing tag, or any link/alt/security defect
//! critical -> title missing, or more than two broken links
//! ```
//!
//! The critical gate is evaluated last and overrides the warning gate.

use crate::db::SiteStore;
use crate::models::{BlockType, ContentBlock, ContentDocument, PageRecord, SeoReport, SeoScore};
use crate::paths::{normalize_path, ROOT_PATH};
use crate::services::content_service::ContentService;
use crate::services::error::SiteError;
use crate::services::events::SiteEvent;
use crate::services::page_tree::SharedTree;
use chrono::Utc;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

pub const TAG_TITLE: &str = "title";
pub const TAG_DESCRIPTION: &str = "description";
pub const TAG_OG_IMAGE: &str = "og:image";
pub const TAG_H1_UNIQUE: &str = "h1-unique";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "avif"];
const TEXT_PROP_KEYS: &[&str] = &[
    "title",
    "heading",
    "subtitle",
    "text",
    "body",
    "description",
    "caption",
];
const TOP_TERMS: usize = 5;
const MIN_TERM_LEN: usize = 4;

static HTML_H1_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_ANCHOR_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_IMG_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_HREF_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_BLANK_TARGET_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_NOOPENER_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_ALT_REGEX: OnceLock<Regex> = OnceLock::new();

fn html_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

/// Apply the two scoring gates in order
pub fn score_report(
    missing_tags: &[String],
    broken_links: u32,
    missing_alt_count: u32,
    security_issues: u32,
) -> SeoScore {
    let mut score = SeoScore::Good;
    if missing_tags.len() > 1 || broken_links > 0 || security_issues > 0 || missing_alt_count > 0 {
        score = SeoScore::Warning;
    }
    if missing_tags.iter().any(|t| t == TAG_TITLE) || broken_links > 2 {
        score = SeoScore::Critical;
    }
    score
}

/// Audit one page against the set of active paths
///
/// `words_per_minute` drives the reading-time estimate only.
pub fn audit_page(
    page: &PageRecord,
    document: &ContentDocument,
    active_paths: &HashSet<String>,
    words_per_minute: u32,
) -> SeoReport {
    let mut missing_tags = Vec::new();
    let seo = &page.seo_metadata;
    if !seo.has_title() {
        missing_tags.push(TAG_TITLE.to_string());
    }
    if !seo.has_description() {
        missing_tags.push(TAG_DESCRIPTION.to_string());
    }
    if !seo.has_og_image() {
        missing_tags.push(TAG_OG_IMAGE.to_string());
    }

    let mut scan = BlockScan::new(active_paths);
    for block in &document.blocks {
        scan.visit(block);
    }
    if scan.h1_count != 1 {
        missing_tags.push(TAG_H1_UNIQUE.to_string());
    }

    let terms = terms_of(&scan.text);
    let word_count = terms.len() as u32;
    let score = score_report(
        &missing_tags,
        scan.broken_links,
        scan.missing_alt,
        scan.security_issues,
    );

    SeoReport {
        page_id: page.id.clone(),
        path: page.path.clone(),
        score,
        missing_tags,
        broken_links: scan.broken_links,
        missing_alt_count: scan.missing_alt,
        security_issues: scan.security_issues,
        word_count,
        reading_time_minutes: reading_time(word_count, words_per_minute),
        keyword_density: keyword_density(&terms, &seo.keywords),
        last_run: Utc::now(),
    }
}

/// Whole minutes needed to read `words`, rounded up
pub fn reading_time(words: u32, words_per_minute: u32) -> u32 {
    if words == 0 {
        return 0;
    }
    words.div_ceil(words_per_minute.max(1))
}

//
// BLOCK SCAN
//

struct BlockScan<'a> {
    active_paths: &'a HashSet<String>,
    h1_count: u32,
    broken_links: u32,
    missing_alt: u32,
    security_issues: u32,
    text: String,
}

enum LinkTarget {
    External,
    Internal(String),
    Ignored,
}

impl<'a> BlockScan<'a> {
    fn new(active_paths: &'a HashSet<String>) -> Self {
        Self {
            active_paths,
            h1_count: 0,
            broken_links: 0,
            missing_alt: 0,
            security_issues: 0,
            text: String::new(),
        }
    }

    // Depth-first, children after their container
    fn visit(&mut self, block: &ContentBlock) {
        let props = &block.props;

        if block.block_type == BlockType::HeroCover || declares_h1(props) {
            self.h1_count += 1;
        }

        let mut strings = Vec::new();
        for (key, value) in props {
            collect_strings(key, value, &mut strings);
        }

        if !has_text(props, "alt") && strings.iter().any(|(_, s)| looks_like_image(s)) {
            self.missing_alt += 1;
        }

        let new_context = opens_new_context(props);
        let safe = has_noopener(props);
        for (key, value) in &strings {
            if !is_link_key(key) {
                continue;
            }
            match classify_link(value) {
                LinkTarget::External if new_context && !safe => self.security_issues += 1,
                LinkTarget::Internal(path) if !looks_like_image(value) => self.check_internal(&path),
                _ => {}
            }
        }

        for (key, value) in &strings {
            if block.block_type == BlockType::RichText && key == "content" {
                self.scan_markdown(value);
            } else if TEXT_PROP_KEYS.contains(&key.as_str()) {
                self.push_text(value);
            }
        }

        for child in &block.children {
            self.visit(child);
        }
    }

    fn check_internal(&mut self, path: &str) {
        if !self.active_paths.contains(path) {
            self.broken_links += 1;
        }
    }

    fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
        self.text.push(' ');
    }

    fn scan_markdown(&mut self, source: &str) {
        let mut image_alt: Option<String> = None;
        for event in Parser::new(source) {
            match event {
                Event::Start(Tag::Heading {
                    level: HeadingLevel::H1,
                    ..
                }) => self.h1_count += 1,
                Event::Start(Tag::Image { .. }) => image_alt = Some(String::new()),
                Event::End(TagEnd::Image) => {
                    if image_alt.take().is_some_and(|alt| alt.trim().is_empty()) {
                        self.missing_alt += 1;
                    }
                }
                Event::Start(Tag::Link { dest_url, .. }) => {
                    if let LinkTarget::Internal(path) = classify_link(&dest_url) {
                        self.check_internal(&path);
                    }
                }
                // Text may arrive in pieces; words end at breaks and block ends
                Event::Text(text) | Event::Code(text) => match image_alt.as_mut() {
                    Some(alt) => alt.push_str(&text),
                    None => self.text.push_str(&text),
                },
                Event::SoftBreak | Event::HardBreak | Event::End(_) => self.text.push(' '),
                Event::Html(html) | Event::InlineHtml(html) => self.scan_html(&html),
                _ => {}
            }
        }
    }

    fn scan_html(&mut self, html: &str) {
        let h1 = html_regex(&HTML_H1_REGEX, r"(?i)<h1[\s>]");
        self.h1_count += h1.find_iter(html).count() as u32;

        let alt = html_regex(&HTML_ALT_REGEX, r#"(?i)\balt\s*=\s*["']\s*[^"'\s]"#);
        let img = html_regex(&HTML_IMG_REGEX, r"(?i)<img\b[^>]*>");
        for tag in img.find_iter(html) {
            if !alt.is_match(tag.as_str()) {
                self.missing_alt += 1;
            }
        }

        let anchor = html_regex(&HTML_ANCHOR_REGEX, r"(?i)<a\s[^>]*>");
        let href = html_regex(&HTML_HREF_REGEX, r#"(?i)\bhref\s*=\s*["']([^"']*)["']"#);
        let blank = html_regex(&HTML_BLANK_TARGET_REGEX, r#"(?i)\btarget\s*=\s*["']?_blank"#);
        let noopener = html_regex(
            &HTML_NOOPENER_REGEX,
            r#"(?i)\brel\s*=\s*["'][^"']*\b(noopener|noreferrer)\b"#,
        );
        for tag in anchor.find_iter(html) {
            let tag = tag.as_str();
            let Some(target) = href.captures(tag).and_then(|c| c.get(1)) else {
                continue;
            };
            match classify_link(target.as_str()) {
                LinkTarget::External if blank.is_match(tag) && !noopener.is_match(tag) => {
                    self.security_issues += 1
                }
                LinkTarget::Internal(path) => self.check_internal(&path),
                _ => {}
            }
        }
    }
}

// Flatten nested objects and arrays, keeping the innermost key
fn collect_strings<'v>(key: &'v str, value: &'v Value, out: &mut Vec<(String, &'v str)>) {
    match value {
        Value::String(s) => out.push((key.to_string(), s.as_str())),
        Value::Array(items) => {
            for item in items {
                collect_strings(key, item, out);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                collect_strings(k, v, out);
            }
        }
        _ => {}
    }
}

fn declares_h1(props: &Map<String, Value>) -> bool {
    match props.get("headingLevel") {
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        Some(Value::String(s)) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("h1")
        }
        _ => false,
    }
}

fn has_text(props: &Map<String, Value>, key: &str) -> bool {
    props
        .get(key)
        .and_then(Value::as_str)
        .is_some_and(|v| !v.trim().is_empty())
}

fn opens_new_context(props: &Map<String, Value>) -> bool {
    let blank_target = props
        .get("target")
        .and_then(Value::as_str)
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("_blank"));
    let flagged = ["openInNewTab", "newTab"]
        .iter()
        .any(|k| props.get(*k).and_then(Value::as_bool) == Some(true));
    blank_target || flagged
}

fn has_noopener(props: &Map<String, Value>) -> bool {
    let rel = props
        .get("rel")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .is_some_and(|rel| rel.contains("noopener") || rel.contains("noreferrer"));
    rel || props.get("noopener").and_then(Value::as_bool) == Some(true)
}

fn is_link_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key == "url" || key.ends_with("href") || key.ends_with("link")
}

fn strip_query(value: &str) -> &str {
    value
        .split(['?', '#'])
        .next()
        .unwrap_or(value)
}

fn looks_like_image(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.contains(char::is_whitespace) {
        return false;
    }
    let path = strip_query(value).to_ascii_lowercase();
    match path.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && IMAGE_EXTENSIONS.contains(&ext),
        None => false,
    }
}

fn classify_link(value: &str) -> LinkTarget {
    let value = value.trim();
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || value.starts_with("//") {
        return LinkTarget::External;
    }
    if !value.starts_with('/') {
        return LinkTarget::Ignored;
    }
    match normalize_path(strip_query(value)) {
        Some(path) if path != ROOT_PATH => LinkTarget::Internal(path),
        _ => LinkTarget::Ignored,
    }
}

//
// TEXT METRICS
//

fn terms_of(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn percent(part: usize, total: usize) -> f64 {
    let raw = part as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Share of the page's words taken by each keyword, as a percentage
///
/// Declared keywords are measured as phrases. Without declared keywords the
/// most frequent longer terms are reported instead.
fn keyword_density(terms: &[String], declared: &[String]) -> BTreeMap<String, f64> {
    let mut density = BTreeMap::new();
    if terms.is_empty() {
        return density;
    }

    let declared: Vec<Vec<String>> = declared
        .iter()
        .map(|k| terms_of(k))
        .filter(|phrase| !phrase.is_empty())
        .collect();

    if !declared.is_empty() {
        for phrase in declared {
            let hits = terms
                .windows(phrase.len())
                .filter(|window| *window == phrase.as_slice())
                .count();
            density.insert(phrase.join(" "), percent(hits * phrase.len(), terms.len()));
        }
        return density;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for term in terms.iter().filter(|t| t.chars().count() >= MIN_TERM_LEN) {
        *counts.entry(term.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (term, hits) in ranked.into_iter().take(TOP_TERMS) {
        density.insert(term.to_string(), percent(hits, terms.len()));
    }
    density
}

//
// SERVICE
//

/// Runs audits against live site state and persists the reports
#[derive(Clone)]
pub struct SeoAuditService {
    store: Arc<dyn SiteStore>,
    tree: SharedTree,
    content: ContentService,
    words_per_minute: u32,
    event_tx: broadcast::Sender<SiteEvent>,
}

impl SeoAuditService {
    pub fn new(
        store: Arc<dyn SiteStore>,
        tree: SharedTree,
        content: ContentService,
        words_per_minute: u32,
        event_tx: broadcast::Sender<SiteEvent>,
    ) -> Self {
        Self {
            store,
            tree,
            content,
            words_per_minute,
            event_tx,
        }
    }

    /// Audit one active page and replace its stored report
    ///
    /// Any read failure aborts the run before anything is written, so a
    /// previous report stays in place.
    pub async fn run_audit(&self, page_id: &str) -> Result<SeoReport, SiteError> {
        let (page, active_paths) = {
            let tree = self.tree.read().await;
            let page = tree
                .get(page_id)
                .cloned()
                .ok_or_else(|| SiteError::page_not_found(page_id))?;
            if page.is_deleted {
                return Err(SiteError::page_deleted(page_id));
            }
            (page, tree.active_paths())
        };
        let document = self.content.get_or_init(page_id).await?;

        let report = audit_page(&page, &document, &active_paths, self.words_per_minute);
        self.store
            .upsert_seo_report(report.clone())
            .await
            .map_err(SiteError::backing_store)?;

        tracing::info!(
            "Audited {} ({}): {} with tags {:?}",
            report.path,
            page_id,
            report.score,
            report.missing_tags
        );
        let _ = self.event_tx.send(SiteEvent::AuditCompleted {
            page_id: page_id.to_string(),
            score: report.score,
        });
        Ok(report)
    }

    /// Audit every active page, skipping pages whose audit fails
    pub async fn run_global_audit(&self) -> Result<Vec<SeoReport>, SiteError> {
        let ids: Vec<String> = {
            let tree = self.tree.read().await;
            tree.all_ids_preorder()
                .into_iter()
                .filter(|id| tree.get(id).is_some_and(PageRecord::is_active))
                .collect()
        };

        let mut reports = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.run_audit(id).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!("Skipping audit of page {}: {}", id, e),
            }
        }
        tracing::info!("Global audit finished: {}/{} pages", reports.len(), ids.len());
        Ok(reports)
    }

    pub async fn list_reports(&self) -> Result<Vec<SeoReport>, SiteError> {
        self.store
            .list_seo_reports()
            .await
            .map_err(SiteError::backing_store)
    }
}

#[cfg(test)]
#[path = "seo_audit_test.rs"]
mod seo_audit_test;
