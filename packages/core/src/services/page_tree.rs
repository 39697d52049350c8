//! In-Memory Page Tree
//!
//! Flat arena of page records keyed by id. Each page stores its parent id in
//! the record and the arena keeps an ordered child-id list per parent, so
//! structural queries never clone subtrees. The nested `PageNode` view is
//! derived on demand.
//!
//! Rebuilding from a flat record list is the only way the tree is loaded:
//!
//! - Children are ordered by `sort_order`; ties keep store order
//! - A page whose parent is unknown becomes a root with its `parent_id`
//!   cleared
//! - A page caught in a stored parent cycle is promoted to a root and its
//!   subtree re-pathed under it, so the arena is always a forest and the
//!   records agree with it. The repair is local until the page is written.

use crate::models::{PageNode, PageRecord, PageStatus};
use crate::paths::{child_path, leaf_of, ROOT_PATH};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tree shared between the services of one site session
pub type SharedTree = Arc<RwLock<PageTree>>;

/// Forest of pages indexed by id
#[derive(Debug, Clone, Default)]
pub struct PageTree {
    pages: HashMap<String, PageRecord>,
    children: HashMap<String, Vec<String>>,
    roots: Vec<String>,
}

/// Page counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub total: usize,
    pub active: usize,
    pub soft_deleted: usize,
    pub draft: usize,
    pub published: usize,
    pub archived: usize,
    pub locked: usize,
}

impl PageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the arena from the store's flat record list
    pub fn from_records(records: Vec<PageRecord>) -> Self {
        let mut tree = Self::new();
        let mut order: Vec<String> = Vec::with_capacity(records.len());
        for record in records {
            order.push(record.id.clone());
            tree.pages.insert(record.id.clone(), record);
        }

        for id in &order {
            let parent = tree.pages[id]
                .parent_id
                .clone()
                .filter(|parent_id| tree.pages.contains_key(parent_id) && parent_id != id);
            match parent {
                Some(parent_id) => tree.children.entry(parent_id).or_default().push(id.clone()),
                None => {
                    if let Some(record) = tree.pages.get_mut(id) {
                        record.parent_id = None;
                    }
                    tree.roots.push(id.clone());
                }
            }
        }

        tree.break_stored_cycles(&order);
        tree.sort_all_siblings();
        tree
    }

    // Pages unreachable from any root sit on a parent cycle; detach one page
    // per cycle and make it a root.
    fn break_stored_cycles(&mut self, order: &[String]) {
        loop {
            let reachable: HashSet<String> = self.all_ids_preorder().into_iter().collect();
            let Some(stray) = order.iter().find(|id| !reachable.contains(*id)).cloned() else {
                break;
            };
            tracing::warn!("Page {} is part of a parent cycle; promoting it to a root", stray);
            self.detach(&stray);
            if let Some(record) = self.pages.get_mut(&stray) {
                record.parent_id = None;
                record.path = child_path(ROOT_PATH, leaf_of(&record.path));
            }
            self.repath_descendants(&stray);
            self.roots.push(stray);
        }
    }

    fn repath_descendants(&mut self, id: &str) {
        let Some(parent_path) = self.pages.get(id).map(|p| p.path.clone()) else {
            return;
        };
        let children = self.children.get(id).cloned().unwrap_or_default();
        for child in children {
            if let Some(record) = self.pages.get_mut(&child) {
                record.path = child_path(&parent_path, leaf_of(&record.path));
            }
            self.repath_descendants(&child);
        }
    }

    fn sort_all_siblings(&mut self) {
        let pages = &self.pages;
        let by_order = |a: &String, b: &String| pages[a].sort_order.total_cmp(&pages[b].sort_order);
        self.roots.sort_by(by_order);
        for siblings in self.children.values_mut() {
            siblings.sort_by(by_order);
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pages.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PageRecord> {
        self.pages.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut PageRecord> {
        self.pages.get_mut(id)
    }

    /// Ordered child ids of `parent_id` (roots for `None`)
    pub fn children_of(&self, parent_id: Option<&str>) -> &[String] {
        match parent_id {
            Some(id) => self.children.get(id).map(Vec::as_slice).unwrap_or(&[]),
            None => &self.roots,
        }
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Whether `candidate` is `ancestor_id` or lies anywhere below it
    pub fn is_in_subtree(&self, candidate: &str, ancestor_id: &str) -> bool {
        let mut current = Some(candidate.to_string());
        let mut seen = HashSet::new();
        while let Some(id) = current {
            if id == ancestor_id {
                return true;
            }
            if !seen.insert(id.clone()) {
                return false;
            }
            current = self.pages.get(&id).and_then(|p| p.parent_id.clone());
        }
        false
    }

    /// Ids of `id` and all of its descendants, parent before children
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if self.pages.contains_key(id) {
            self.collect_preorder(id, &mut out);
        }
        out
    }

    fn collect_preorder(&self, id: &str, out: &mut Vec<String>) {
        out.push(id.to_string());
        if let Some(children) = self.children.get(id) {
            for child in children {
                self.collect_preorder(child, out);
            }
        }
    }

    /// Every page id in tree order
    pub fn all_ids_preorder(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.pages.len());
        for root in &self.roots {
            self.collect_preorder(root, &mut out);
        }
        out
    }

    /// Pages in tree order
    pub fn iter(&self) -> impl Iterator<Item = &PageRecord> {
        self.all_ids_preorder()
            .into_iter()
            .filter_map(move |id| self.pages.get(&id))
    }

    /// Active page currently owning `path`
    pub fn find_active_by_path(&self, path: &str) -> Option<&PageRecord> {
        self.pages.values().find(|p| p.is_active() && p.path == path)
    }

    /// Whether an active page other than those in `excluding` owns `path`
    pub fn path_in_use(&self, path: &str, excluding: &[String]) -> bool {
        self.pages
            .values()
            .any(|p| p.is_active() && p.path == path && !excluding.contains(&p.id))
    }

    /// Paths of every active page
    pub fn active_paths(&self) -> HashSet<String> {
        self.pages
            .values()
            .filter(|p| p.is_active())
            .map(|p| p.path.clone())
            .collect()
    }

    /// Path a page placed under `parent_id` with `leaf` would get
    pub fn path_under(&self, parent_id: Option<&str>, leaf: &str) -> String {
        let parent_path = parent_id
            .and_then(|id| self.pages.get(id))
            .map(|p| p.path.as_str())
            .unwrap_or(ROOT_PATH);
        child_path(parent_path, leaf)
    }

    /// `sort_order` of the last child under `parent_id`
    pub fn last_child_order(&self, parent_id: Option<&str>) -> Option<f64> {
        self.children_of(parent_id)
            .last()
            .and_then(|id| self.pages.get(id))
            .map(|p| p.sort_order)
    }

    /// Insert a page as the last child of its parent
    pub(crate) fn insert(&mut self, record: PageRecord) {
        let id = record.id.clone();
        match record.parent_id.as_deref().filter(|p| self.pages.contains_key(*p)) {
            Some(parent_id) => self
                .children
                .entry(parent_id.to_string())
                .or_default()
                .push(id.clone()),
            None => self.roots.push(id.clone()),
        }
        self.pages.insert(id, record);
    }

    /// Move an existing page to the end of `new_parent_id`'s children
    pub(crate) fn reparent(&mut self, id: &str, new_parent_id: Option<&str>) {
        self.detach(id);
        match new_parent_id {
            Some(parent_id) => self
                .children
                .entry(parent_id.to_string())
                .or_default()
                .push(id.to_string()),
            None => self.roots.push(id.to_string()),
        }
        if let Some(page) = self.pages.get_mut(id) {
            page.parent_id = new_parent_id.map(str::to_string);
        }
    }

    /// Re-sort one sibling list after a `sort_order` change
    pub(crate) fn resort_siblings(&mut self, parent_id: Option<&str>) {
        let pages = &self.pages;
        let siblings = match parent_id {
            Some(id) => match self.children.get_mut(id) {
                Some(list) => list,
                None => return,
            },
            None => &mut self.roots,
        };
        siblings.sort_by(|a, b| pages[a].sort_order.total_cmp(&pages[b].sort_order));
    }

    /// Remove a page and its whole subtree, returning the removed records
    pub(crate) fn remove_subtree(&mut self, id: &str) -> Vec<PageRecord> {
        let ids = self.subtree_ids(id);
        self.detach(id);
        ids.iter()
            .filter_map(|removed| {
                self.children.remove(removed);
                self.pages.remove(removed)
            })
            .collect()
    }

    fn detach(&mut self, id: &str) {
        self.roots.retain(|r| r != id);
        for siblings in self.children.values_mut() {
            siblings.retain(|c| c != id);
        }
    }

    /// Nested view of the whole forest
    pub fn to_nested(&self) -> Vec<PageNode> {
        self.roots.iter().filter_map(|id| self.nested(id)).collect()
    }

    /// Nested view of one subtree
    pub fn nested(&self, id: &str) -> Option<PageNode> {
        let record = self.pages.get(id)?.clone();
        let children = self
            .children
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.nested(c)).collect())
            .unwrap_or_default();
        Some(PageNode { record, children })
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            total: self.pages.len(),
            ..TreeStats::default()
        };
        for page in self.pages.values() {
            if page.is_deleted {
                stats.soft_deleted += 1;
            } else {
                stats.active += 1;
            }
            match page.status {
                PageStatus::Draft => stats.draft += 1,
                PageStatus::Published => stats.published += 1,
                PageStatus::Archived => stats.archived += 1,
            }
            if page.locked {
                stats.locked += 1;
            }
        }
        stats
    }

    /// Check the structural invariants, returning every violation found
    ///
    /// - every page is reachable from exactly one root (forest, no cycles)
    /// - active paths are unique
    /// - a child's path is its parent's path plus its own leaf
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let preorder = self.all_ids_preorder();
        let unique: HashSet<&String> = preorder.iter().collect();
        if unique.len() != preorder.len() || preorder.len() != self.pages.len() {
            problems.push(format!(
                "tree reaches {} pages ({} distinct) but holds {}",
                preorder.len(),
                unique.len(),
                self.pages.len()
            ));
        }

        let mut seen_paths: HashMap<&str, &str> = HashMap::new();
        for page in self.pages.values().filter(|p| p.is_active()) {
            if let Some(other) = seen_paths.insert(page.path.as_str(), page.id.as_str()) {
                problems.push(format!(
                    "path {} shared by {} and {}",
                    page.path, other, page.id
                ));
            }
        }

        for page in self.pages.values() {
            if let Some(parent) = page.parent_id.as_deref().and_then(|p| self.pages.get(p)) {
                let expected = child_path(&parent.path, leaf_of(&page.path));
                if page.path != expected {
                    problems.push(format!(
                        "page {} has path {} but parent path implies {}",
                        page.id, page.path, expected
                    ));
                }
            }
        }

        problems
    }
}
