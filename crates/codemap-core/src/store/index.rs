//! The repository index aggregate.
//!
//! `RepositoryIndex` owns every file entry, code element, graph node and
//! embedding. All mutation goes through [`RepositoryIndex::apply_changes`],
//! which replaces a file's entry and elements as one unit and then patches
//! the derived views (graph, relationships, conventions, patterns).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::indexer::embedding::embed_elements;
use crate::indexer::graph::{build_graph, element_relationships, patch_graph, GraphInputs};
use crate::indexer::imports::ImportResolver;
use crate::indexer::patterns::{detect_patterns, naming_conventions};
use crate::models::{
    file_node_id, ArchitecturalPattern, CodeElement, DependencyGraph, ElementReference,
    FileAnalysis, FileEntry, NamingConventions, NodeType, RepositoryStats, SemanticIndex,
    INDEX_SCHEMA_VERSION,
};

/// What one call to [`RepositoryIndex::apply_changes`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Files whose outgoing graph edges were recomputed.
    pub relinked: Vec<String>,
}

impl ApplySummary {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RepositoryIndex {
    pub version: u32,
    /// Bumped on every applied mutation.
    pub revision: u64,
    pub built_at: DateTime<Utc>,
    pub root_path: PathBuf,
    pub file_index: BTreeMap<String, FileEntry>,
    pub semantic_index: SemanticIndex,
    pub dependency_graph: DependencyGraph,
    pub naming_conventions: NamingConventions,
    pub architectural_patterns: Vec<ArchitecturalPattern>,
    /// Unresolved references per file, kept so element edges can be
    /// relinked without re-reading sources.
    #[serde(skip)]
    references: BTreeMap<String, Vec<ElementReference>>,
    #[serde(skip)]
    resolver: ImportResolver,
    #[serde(skip)]
    embedding_dimensions: usize,
}

impl RepositoryIndex {
    pub fn empty(root: &Path, embedding_dimensions: usize) -> Self {
        Self {
            version: INDEX_SCHEMA_VERSION,
            revision: 0,
            built_at: Utc::now(),
            root_path: root.to_path_buf(),
            file_index: BTreeMap::new(),
            semantic_index: SemanticIndex::default(),
            dependency_graph: DependencyGraph::default(),
            naming_conventions: NamingConventions::default(),
            architectural_patterns: Vec::new(),
            references: BTreeMap::new(),
            resolver: ImportResolver::new(root, std::iter::empty()),
            embedding_dimensions,
        }
    }

    /// Assemble a complete index from freshly analyzed files plus files
    /// carried over unchanged from `previous`.
    pub fn build(
        root: &Path,
        fresh: Vec<FileAnalysis>,
        reused: &[String],
        previous: Option<&RepositoryIndex>,
        embedding_dimensions: usize,
    ) -> Self {
        let mut index = Self::empty(root, embedding_dimensions);
        let mut to_embed: Vec<String> = Vec::new();

        for analysis in fresh {
            to_embed.extend(analysis.elements.iter().map(|e| e.id.clone()));
            index.insert_analysis(analysis);
        }
        if let Some(previous) = previous {
            for path in reused {
                let Some(analysis) = previous.analysis_of(path) else {
                    continue;
                };
                for element in &analysis.elements {
                    match previous.semantic_index.embeddings.get(&element.id) {
                        Some(v) if v.len() == embedding_dimensions => {
                            index.semantic_index.embeddings.insert(element.id.clone(), v.clone());
                        }
                        _ => to_embed.push(element.id.clone()),
                    }
                }
                index.insert_analysis(analysis);
            }
        }

        index.resolver = ImportResolver::new(root, index.file_index.keys());
        index.dependency_graph = build_graph(&GraphInputs {
            files: &index.file_index,
            elements: &index.semantic_index.elements,
            references: &index.references,
            resolver: &index.resolver,
        });
        index.embed(&to_embed);
        index.refresh_derived();
        info!(
            "assembled index: {} files, {} elements, {} reused",
            index.file_index.len(),
            index.semantic_index.elements.len(),
            reused.len()
        );
        index
    }

    fn insert_analysis(&mut self, analysis: FileAnalysis) {
        let path = analysis.entry.relative_path.clone();
        for element in analysis.elements {
            self.semantic_index.elements.insert(element.id.clone(), element);
        }
        if !analysis.references.is_empty() {
            self.references.insert(path.clone(), analysis.references);
        }
        self.file_index.insert(path, analysis.entry);
    }

    /// Remove one file's entry, elements, references and embeddings.
    fn take_file(&mut self, path: &str) -> Option<FileEntry> {
        let entry = self.file_index.remove(path)?;
        for id in &entry.element_ids {
            self.semantic_index.elements.remove(id);
            self.semantic_index.embeddings.remove(id);
        }
        self.references.remove(path);
        Some(entry)
    }

    fn embed(&mut self, ids: &[String]) {
        let elements = ids.iter().filter_map(|id| self.semantic_index.elements.get(id));
        let vectors = embed_elements(elements, self.embedding_dimensions);
        self.semantic_index.embeddings.extend(vectors);
    }

    /// Recompute every view that is a pure function of the current maps.
    fn refresh_derived(&mut self) {
        self.semantic_index.relationships = element_relationships(&self.dependency_graph);
        self.naming_conventions = naming_conventions(
            self.file_index.values(),
            self.semantic_index.elements.values(),
        );
        self.architectural_patterns = detect_patterns(&self.file_index);
        self.semantic_index.patterns = self
            .architectural_patterns
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect();
    }

    /// Replace the entries of `updates` and drop `removals`, then patch the
    /// graph and derived views. Each file's old elements leave the index in
    /// the same step that inserts its new ones.
    pub fn apply_changes(&mut self, updates: Vec<FileAnalysis>, removals: &[String]) -> ApplySummary {
        let mut summary = ApplySummary::default();
        let mut changed: BTreeSet<String> = BTreeSet::new();
        let mut to_embed: Vec<String> = Vec::new();

        for path in removals {
            if self.take_file(path).is_some() {
                self.resolver.remove(path);
                changed.insert(path.clone());
                summary.removed.push(path.clone());
            }
        }
        for analysis in updates {
            let path = analysis.entry.relative_path.clone();
            self.take_file(&path);
            to_embed.extend(analysis.elements.iter().map(|e| e.id.clone()));
            self.insert_analysis(analysis);
            self.resolver.insert(&path);
            changed.insert(path.clone());
            summary.updated.push(path);
        }
        if changed.is_empty() {
            return summary;
        }

        let relinked = patch_graph(
            &mut self.dependency_graph,
            &GraphInputs {
                files: &self.file_index,
                elements: &self.semantic_index.elements,
                references: &self.references,
                resolver: &self.resolver,
            },
            &changed,
        );
        summary.relinked = relinked.into_iter().collect();
        self.embed(&to_embed);
        self.refresh_derived();
        self.revision += 1;
        debug!(
            "applied revision {}: {} updated, {} removed, {} relinked",
            self.revision,
            summary.updated.len(),
            summary.removed.len(),
            summary.relinked.len()
        );
        summary
    }

    /// A file together with the elements and references it owns.
    pub fn analysis_of(&self, path: &str) -> Option<FileAnalysis> {
        let entry = self.file_index.get(path)?;
        let elements = entry
            .element_ids
            .iter()
            .filter_map(|id| self.semantic_index.elements.get(id))
            .cloned()
            .collect();
        Some(FileAnalysis {
            entry: entry.clone(),
            elements,
            references: self.references.get(path).cloned().unwrap_or_default(),
        })
    }

    pub fn content_hashes(&self) -> BTreeMap<String, String> {
        self.file_index
            .iter()
            .map(|(path, entry)| (path.clone(), entry.content_hash.clone()))
            .collect()
    }

    pub fn element(&self, id: &str) -> Option<&CodeElement> {
        self.semantic_index.elements.get(id)
    }

    pub fn elements_in(&self, path: &str) -> Vec<&CodeElement> {
        self.file_index
            .get(path)
            .map(|entry| {
                entry
                    .element_ids
                    .iter()
                    .filter_map(|id| self.semantic_index.elements.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RepositoryStats {
        let mut language_histogram = BTreeMap::new();
        let mut total_lines = 0;
        let mut complexity = 0u64;
        for entry in self.file_index.values() {
            *language_histogram
                .entry(entry.language.as_str().to_string())
                .or_insert(0) += 1;
            total_lines += entry.line_count;
            complexity += u64::from(entry.complexity_score);
        }
        let total_files = self.file_index.len();
        RepositoryStats {
            total_files,
            total_lines,
            total_elements: self.semantic_index.elements.len(),
            language_histogram,
            avg_complexity: if total_files == 0 {
                0.0
            } else {
                complexity as f64 / total_files as f64
            },
        }
    }

    /// Check the cross-reference invariants: every file's element set
    /// matches the elements that name it, every element has an embedding,
    /// and every graph edge joins two existing nodes.
    pub fn verify(&self) -> Result<(), String> {
        let mut owned: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (id, element) in &self.semantic_index.elements {
            if *id != element.id {
                return Err(format!("element keyed {id} carries id {}", element.id));
            }
            if !self.file_index.contains_key(&element.file_path) {
                return Err(format!("element {id} has no owning file {}", element.file_path));
            }
            owned.entry(element.file_path.as_str()).or_default().insert(id.as_str());
            let embedded = matches!(
                self.semantic_index.embeddings.get(id),
                Some(v) if v.len() == self.embedding_dimensions
            );
            if !embedded {
                return Err(format!("element {id} has no embedding"));
            }
        }
        for (path, entry) in &self.file_index {
            let expected = owned.remove(path.as_str()).unwrap_or_default();
            let actual: BTreeSet<&str> = entry.element_ids.iter().map(String::as_str).collect();
            if expected != actual {
                return Err(format!("element ids of {path} disagree with the element map"));
            }
            if !self.dependency_graph.nodes.contains_key(&file_node_id(path)) {
                return Err(format!("missing graph node for {path}"));
            }
        }
        if self.semantic_index.embeddings.len() != self.semantic_index.elements.len() {
            return Err("embeddings for removed elements remain".to_string());
        }
        for node in self.dependency_graph.nodes.values() {
            let exists = match node.node_type {
                NodeType::File => self.file_index.contains_key(&node.file_path),
                NodeType::Element => self.semantic_index.elements.contains_key(&node.id),
            };
            if !exists {
                return Err(format!("graph node {} outlived its source", node.id));
            }
        }
        for (from, edges) in &self.dependency_graph.edges {
            if !self.dependency_graph.nodes.contains_key(from) {
                return Err(format!("edge source {from} is not a node"));
            }
            if let Some(edge) = edges
                .iter()
                .find(|e| !self.dependency_graph.nodes.contains_key(&e.to))
            {
                return Err(format!("edge {from} -> {} dangles", edge.to));
            }
        }
        Ok(())
    }
}
