//! Shared typed models used across indexing, storage, and query layers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Schema constants
// ---------------------------------------------------------------------------

/// Layout version of [`crate::store::RepositoryIndex`] snapshots.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Node id prefix for file nodes in the dependency graph.
pub const FILE_NODE_PREFIX: &str = "file:";

pub fn file_node_id(relative_path: &str) -> String {
    format!("{FILE_NODE_PREFIX}{relative_path}")
}

/// Stable element id derived from (file path, name, start line).
pub fn element_id(file_path: &str, name: &str, start_line: u32) -> String {
    format!("{file_path}#{name}@{start_line}")
}

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Java,
    Go,
    Rust,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Code elements
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Function,
    Class,
    Method,
    Property,
    Variable,
    Interface,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Function => "function",
            ElementKind::Class => "class",
            ElementKind::Method => "method",
            ElementKind::Property => "property",
            ElementKind::Variable => "variable",
            ElementKind::Interface => "interface",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, ElementKind::Function | ElementKind::Method)
    }

    pub fn is_type(&self) -> bool {
        matches!(self, ElementKind::Class | ElementKind::Interface)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Definition,
    Reference,
    Call,
    Inheritance,
    Import,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsageSite {
    pub file_path: String,
    pub line: u32,
    pub kind: UsageKind,
}

/// One named syntactic unit. Owned by the index; referenced elsewhere by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeElement {
    pub id: String,
    pub kind: ElementKind,
    pub name: String,
    /// Repository-relative path of the defining file (the file index key).
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    pub dependencies: Vec<String>,
    pub usage_sites: Vec<UsageSite>,
    pub complexity_score: u32,
    pub semantic_tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// The indexed record for one source file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file_path: PathBuf,
    pub relative_path: String,
    pub language: Language,
    pub size_bytes: u64,
    pub line_count: usize,
    pub last_modified: DateTime<Utc>,
    pub content_hash: String,
    pub element_ids: BTreeSet<String>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub complexity_score: u32,
}

/// A name referenced from inside an element, resolved to element edges
/// once the candidate files are known.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementReference {
    /// Id of the innermost element containing the reference.
    pub from: String,
    pub name: String,
    pub line: u32,
    pub kind: EdgeKind,
}

/// A file entry together with the elements and references it owns.
/// Created, replaced and removed as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct FileAnalysis {
    pub entry: FileEntry,
    pub elements: Vec<CodeElement>,
    pub references: Vec<ElementReference>,
}

// ---------------------------------------------------------------------------
// Dependency graph
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Import,
    Call,
    Inheritance,
    Composition,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub to: String,
    pub kind: EdgeKind,
    pub weight: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Element,
}

/// Metadata snapshotted from a file entry or code element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub node_type: NodeType,
    pub element_kind: Option<ElementKind>,
    pub file_path: String,
    pub size: u64,
    pub complexity: u32,
    pub last_modified: Option<DateTime<Utc>>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

/// Adjacency list keyed by stable string ids.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: BTreeMap<String, Vec<GraphEdge>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleSeverity {
    Low,
    Medium,
    High,
}

impl CycleSeverity {
    pub fn for_length(length: usize) -> Self {
        match length {
            0..=3 => CycleSeverity::Low,
            4..=5 => CycleSeverity::Medium,
            _ => CycleSeverity::High,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DependencyCycle {
    /// Node ids along the cycle; the origin is not repeated at the end.
    pub nodes: Vec<String>,
    pub severity: CycleSeverity,
}

// ---------------------------------------------------------------------------
// Semantic index, patterns, conventions
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchitecturalPattern {
    pub name: String,
    pub confidence: f32,
    pub description: String,
    pub evidence: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticIndex {
    pub elements: BTreeMap<String, CodeElement>,
    pub relationships: BTreeMap<String, Vec<String>>,
    pub embeddings: BTreeMap<String, Vec<f32>>,
    pub patterns: IndexMap<String, ArchitecturalPattern>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingConvention {
    CamelCase,
    PascalCase,
    SnakeCase,
    KebabCase,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamingConventions {
    pub camel_case: usize,
    pub pascal_case: usize,
    pub snake_case: usize,
    pub kebab_case: usize,
    pub classifications: BTreeMap<String, NamingConvention>,
}

impl NamingConventions {
    pub fn total(&self) -> usize {
        self.camel_case + self.pascal_case + self.snake_case + self.kebab_case
    }

    /// The most used convention, if any name was classified.
    pub fn dominant(&self) -> Option<NamingConvention> {
        [
            (NamingConvention::CamelCase, self.camel_case),
            (NamingConvention::PascalCase, self.pascal_case),
            (NamingConvention::SnakeCase, self.snake_case),
            (NamingConvention::KebabCase, self.kebab_case),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(convention, _)| convention)
    }
}

// ---------------------------------------------------------------------------
// Query results
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub total_files: usize,
    pub total_lines: usize,
    pub total_elements: usize,
    pub language_histogram: BTreeMap<String, usize>,
    pub avg_complexity: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Idle,
    Discovering,
    Analyzing,
    Linking,
    Embedding,
    Complete,
    Cancelled,
}

/// Progress of a full build, published after every analyzed file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProgress {
    pub phase: BuildPhase,
    pub processed: usize,
    pub total: usize,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self {
            phase: BuildPhase::Idle,
            processed: 0,
            total: 0,
        }
    }
}
