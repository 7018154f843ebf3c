//! Core data models used throughout Memory Harness.
//!
//! These types are what the components hand to each other and what the HTTP
//! layer serializes. Field names on the wire are camelCase.

use serde::{Deserialize, Serialize};

/// Version token for a document: its last-modified time in milliseconds
/// since the Unix epoch.
pub type Version = i64;

/// A document as read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub content: String,
    pub version: Version,
    pub size: u64,
}

/// A node of the document tree returned by `GET /api/documents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

// ============ Search results ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineMatch {
    /// 1-based line number.
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiteralHit {
    pub path: String,
    pub matches: Vec<LineMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedHit {
    pub path: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemanticHit {
    pub path: String,
    /// Cosine similarity mapped onto 0–100.
    pub score: u8,
    pub snippet: String,
}

/// Search results tagged with the mode that produced them, so callers
/// switch on `mode` instead of guessing from field shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "results", rename_all = "lowercase")]
pub enum SearchResults {
    Literal(Vec<LiteralHit>),
    Ranked(Vec<RankedHit>),
    Semantic(Vec<SemanticHit>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Literal(r) => r.len(),
            SearchResults::Ranked(r) => r.len(),
            SearchResults::Semantic(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============ Tags and links ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedFile {
    pub path: String,
    pub title: String,
    pub preview: String,
    pub tags: Vec<String>,
}

/// A reference from `path` (at `line`) to the queried document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backlink {
    pub path: String,
    pub line: usize,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikilinkResolution {
    pub found: bool,
    pub path: Option<String>,
}

// ============ Change notifications ============

/// Kind of a filesystem change, named the way clients receive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl ChangeKind {
    /// Folds a newer event into a pending one for the same path.
    pub fn merge(self, newer: ChangeKind) -> ChangeKind {
        match (self, newer) {
            (ChangeKind::Add, ChangeKind::Change) => ChangeKind::Add,
            (ChangeKind::Unlink, ChangeKind::Add) => ChangeKind::Change,
            (_, newer) => newer,
        }
    }
}

/// Frame pushed to every connected client after a coalesced change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub event: ChangeKind,
    pub path: String,
}

impl ChangeFrame {
    pub fn file_change(event: ChangeKind, path: impl Into<String>) -> Self {
        Self {
            frame_type: "file-change".to_string(),
            event,
            path: path.into(),
        }
    }
}
