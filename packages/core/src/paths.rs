//! Path and Slug Resolution
//!
//! Pure functions for computing page paths from an ancestor chain and a
//! leaf segment. The root page owns the single-segment path `/`; every other
//! page's path is `parent_path + "/" + leaf`.
//!
//! Collision checks against the live path set are the caller's job; this
//! module never sees the tree.

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Path of the site root page
pub const ROOT_PATH: &str = "/";

const COPY_MARKER: &str = "-copy-";

/// Final segment of a path (`""` for the root path)
///
/// ```
/// # use pagetree_core::paths::leaf_of;
/// assert_eq!(leaf_of("/about/team"), "team");
/// assert_eq!(leaf_of("/"), "");
/// ```
pub fn leaf_of(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Path of a child page with the given leaf under `parent_path`
///
/// Duplicate separators are collapsed.
///
/// ```
/// # use pagetree_core::paths::child_path;
/// assert_eq!(child_path("/", "about"), "/about");
/// assert_eq!(child_path("/about", "team"), "/about/team");
/// assert_eq!(child_path("/about/", "/team"), "/about/team");
/// ```
pub fn child_path(parent_path: &str, leaf: &str) -> String {
    let joined = if parent_path == ROOT_PATH {
        format!("/{}", leaf)
    } else {
        format!("{}/{}", parent_path, leaf)
    };
    collapse_separators(&joined)
}

/// Leaf segment for a copied page: `leaf-copy-<suffix>`
///
/// The suffix is random, so a collision is unlikely but possible; callers
/// re-check the live path set and draw again on collision.
pub fn unique_copy_leaf(original_leaf: &str, suffix_len: usize) -> String {
    let base = if original_leaf.is_empty() {
        "home"
    } else {
        original_leaf
    };
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(suffix_len.clamp(1, 32))
        .collect();
    format!("{}{}{}", base, COPY_MARKER, suffix)
}

/// Normalize a user-supplied path
///
/// Enforces a leading `/`, collapses duplicate separators and drops a
/// trailing `/`. Returns `None` for empty input.
///
/// ```
/// # use pagetree_core::paths::normalize_path;
/// assert_eq!(normalize_path("about//team/").as_deref(), Some("/about/team"));
/// assert_eq!(normalize_path("/").as_deref(), Some("/"));
/// assert_eq!(normalize_path("   "), None);
/// ```
pub fn normalize_path(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(collapse_separators(&format!("/{}", trimmed)))
}

/// Whether `path` lies strictly below `ancestor`
pub fn is_descendant_path(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT_PATH {
        return path != ROOT_PATH && path.starts_with('/');
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Replace the `old_prefix` of `path` with `new_prefix`
///
/// Used when a subtree moves: `/a/b/c` re-rooted from `/a/b` to `/x/b`
/// becomes `/x/b/c`.
pub fn rebase_path(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    if path == old_prefix {
        return new_prefix.to_string();
    }
    match path.strip_prefix(old_prefix) {
        Some(rest) => child_path(new_prefix, rest.trim_start_matches('/')),
        None => path.to_string(),
    }
}

/// URL slug derived from a page title
///
/// Lower-cases, turns whitespace runs into `-`, drops everything outside
/// `[a-z0-9-]` and collapses repeated dashes.
///
/// ```
/// # use pagetree_core::paths::slugify_title;
/// assert_eq!(slugify_title("Our  Team & Friends!"), "our-team-friends");
/// ```
pub fn slugify_title(title: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    static DASHES: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-z0-9\s-]").expect("static regex"));
    let dashes = DASHES.get_or_init(|| Regex::new(r"[\s-]+").expect("static regex"));

    let lowered = title.trim().to_lowercase();
    let cleaned = invalid.replace_all(&lowered, "");
    dashes
        .replace_all(cleaned.trim(), "-")
        .trim_matches('-')
        .to_string()
}

fn collapse_separators(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}
