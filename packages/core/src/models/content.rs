//! Content Document Structures
//!
//! Every page owns one `ContentDocument`: an ordered list of renderable
//! `ContentBlock`s plus a `CustomCode` pair. Documents are persisted as a
//! single atomic replace, guarded by a monotonically increasing `version`.

use super::page::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of renderable block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    HeroCover,
    RichText,
    GridSystem,
    ProductShowcase,
    ExperienceFragment,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::HeroCover => "HeroCover",
            BlockType::RichText => "RichText",
            BlockType::GridSystem => "GridSystem",
            BlockType::ProductShowcase => "ProductShowcase",
            BlockType::ExperienceFragment => "ExperienceFragment",
        }
    }

    /// Container blocks may carry nested children
    pub fn is_container(&self) -> bool {
        matches!(self, BlockType::GridSystem | BlockType::ExperienceFragment)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HeroCover" => Ok(BlockType::HeroCover),
            "RichText" => Ok(BlockType::RichText),
            "GridSystem" => Ok(BlockType::GridSystem),
            "ProductShowcase" => Ok(BlockType::ProductShowcase),
            "ExperienceFragment" => Ok(BlockType::ExperienceFragment),
            other => Err(ValidationError::InvalidBlockType(other.to_string())),
        }
    }
}

/// One renderable unit of page content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,

    #[serde(rename = "type")]
    pub block_type: BlockType,

    #[serde(default)]
    pub props: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentBlock>,
}

impl ContentBlock {
    /// Create a block with a fresh UUID and the given property bag
    pub fn new(block_type: BlockType, props: Value) -> Self {
        let props = match props {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: Uuid::new_v4().to_string(),
            block_type,
            props,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_children(mut self, children: Vec<ContentBlock>) -> Self {
        self.children = children;
        self
    }

    /// Shallow-merge `partial` into the property bag
    pub fn merge_props(&mut self, partial: &Map<String, Value>) {
        for (key, value) in partial {
            self.props.insert(key.clone(), value.clone());
        }
    }

    /// Ids of this block and every nested child, depth-first
    pub fn collect_ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        out.push(&self.id);
        for child in &self.children {
            child.collect_ids(out);
        }
    }
}

/// Which half of the custom code pair to edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Css,
    Js,
}

/// Page-level custom CSS and JavaScript, stored as opaque text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomCode {
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
}

impl CustomCode {
    pub fn set(&mut self, kind: CodeKind, text: impl Into<String>) {
        match kind {
            CodeKind::Css => self.css = text.into(),
            CodeKind::Js => self.js = text.into(),
        }
    }

    pub fn get(&self, kind: CodeKind) -> &str {
        match kind {
            CodeKind::Css => &self.css,
            CodeKind::Js => &self.js,
        }
    }
}

/// Ordered block list and custom code for a single page
///
/// `version` is 0 for a document that has never been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDocument {
    pub page_id: String,

    #[serde(default)]
    pub blocks: Vec<ContentBlock>,

    #[serde(default)]
    pub custom_code: CustomCode,

    #[serde(default)]
    pub version: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContentDocument {
    /// Empty, never-persisted document for a page
    pub fn empty(page_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            blocks: Vec::new(),
            custom_code: CustomCode::default(),
            version: 0,
            updated_at: None,
        }
    }

    /// Whether `id` is used by any block at any nesting depth
    pub fn contains_block(&self, id: &str) -> bool {
        self.block_ids().contains(&id)
    }

    /// Every block id in depth-first order
    pub fn block_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        for block in &self.blocks {
            block.collect_ids(&mut ids);
        }
        ids
    }

    /// True when no block id appears twice
    pub fn has_unique_block_ids(&self) -> bool {
        let ids = self.block_ids();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        unique.len() == ids.len()
    }

    /// Find a block anywhere in the tree
    pub fn find_block_mut(&mut self, id: &str) -> Option<&mut ContentBlock> {
        find_in_mut(&mut self.blocks, id)
    }

    /// Remove a block anywhere in the tree, returning it
    pub fn remove_block(&mut self, id: &str) -> Option<ContentBlock> {
        remove_in(&mut self.blocks, id)
    }

    /// Copy of this document owned by another page, ready for a first write
    pub fn clone_for(&self, page_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            blocks: self.blocks.clone(),
            custom_code: self.custom_code.clone(),
            version: 0,
            updated_at: None,
        }
    }
}

fn find_in_mut<'a>(blocks: &'a mut [ContentBlock], id: &str) -> Option<&'a mut ContentBlock> {
    for block in blocks.iter_mut() {
        if block.id == id {
            return Some(block);
        }
        if let Some(found) = find_in_mut(&mut block.children, id) {
            return Some(found);
        }
    }
    None
}

fn remove_in(blocks: &mut Vec<ContentBlock>, id: &str) -> Option<ContentBlock> {
    if let Some(pos) = blocks.iter().position(|b| b.id == id) {
        return Some(blocks.remove(pos));
    }
    blocks
        .iter_mut()
        .find_map(|block| remove_in(&mut block.children, id))
}
