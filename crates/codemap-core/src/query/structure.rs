//! Structural queries over the dependency graph and the file index.

use std::collections::BTreeMap;

use crate::indexer::graph::{dependents_of, find_cycles};
use crate::models::{file_node_id, DependencyCycle, NodeType};
use crate::query::guards::MAX_OUTLINE_LINES;
use crate::store::RepositoryIndex;

/// Raw import strings of a file as written in source. Unknown paths have
/// none.
pub fn file_dependencies(index: &RepositoryIndex, path: &str) -> Vec<String> {
    index
        .file_index
        .get(path)
        .map(|entry| entry.imports.clone())
        .unwrap_or_default()
}

/// Indexed files whose imports resolve to `path`.
pub fn file_dependents(index: &RepositoryIndex, path: &str) -> Vec<String> {
    let graph = &index.dependency_graph;
    dependents_of(graph, &file_node_id(path))
        .into_iter()
        .filter_map(|id| {
            graph
                .nodes
                .get(&id)
                .filter(|node| node.node_type == NodeType::File)
                .map(|node| node.file_path.clone())
        })
        .collect()
}

pub fn import_cycles(index: &RepositoryIndex) -> Vec<DependencyCycle> {
    find_cycles(&index.dependency_graph)
}

pub fn element_relationships(index: &RepositoryIndex, element_id: &str) -> Vec<String> {
    index
        .semantic_index
        .relationships
        .get(element_id)
        .cloned()
        .unwrap_or_default()
}

/// Indented outline of files below `prefix` and the elements they define,
/// capped at `max_lines`.
pub fn repository_outline(
    index: &RepositoryIndex,
    prefix: &str,
    include_signatures: bool,
    max_lines: usize,
) -> String {
    let prefix = prefix.trim_start_matches("./").trim_end_matches('/');
    let max_lines = max_lines.clamp(1, MAX_OUTLINE_LINES);
    let mut lines: Vec<String> = Vec::new();
    for path in index.file_index.keys() {
        let in_scope = prefix.is_empty()
            || prefix == "."
            || path == prefix
            || path.starts_with(&format!("{prefix}/"));
        if !in_scope {
            continue;
        }
        lines.push(path.clone());
        let mut elements: BTreeMap<(u32, &str), String> = BTreeMap::new();
        for element in index.elements_in(path) {
            let detail = if include_signatures && !element.signature.is_empty() {
                element.signature.clone()
            } else {
                format!("{} {}", element.kind.as_str(), element.name)
            };
            elements.insert((element.start_line, element.id.as_str()), detail);
        }
        for ((line, _), detail) in elements {
            lines.push(format!("  {detail}  [L{line}]"));
        }
        if lines.len() >= max_lines {
            break;
        }
    }
    lines.truncate(max_lines);
    lines.join("\n")
}
