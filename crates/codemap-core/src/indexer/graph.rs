//! Dependency graph construction, incremental patching and traversal.
//!
//! File nodes carry import edges; element nodes carry call, inheritance and
//! composition edges resolved against the defining file and the files it
//! imports. A patch recomputes outgoing edges only for the affected files, so
//! the result is identical to a full rebuild over the same file index.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::indexer::analyzer::edge_accepts;
use crate::indexer::imports::ImportResolver;
use crate::models::{
    file_node_id, CodeElement, CycleSeverity, DependencyCycle, DependencyGraph, EdgeKind,
    ElementReference, FileEntry, GraphEdge, GraphNode, NodeType,
};

/// Read-only view of the index state the graph is derived from.
pub struct GraphInputs<'a> {
    pub files: &'a BTreeMap<String, FileEntry>,
    pub elements: &'a BTreeMap<String, CodeElement>,
    pub references: &'a BTreeMap<String, Vec<ElementReference>>,
    pub resolver: &'a ImportResolver,
}

pub fn file_node(entry: &FileEntry) -> GraphNode {
    GraphNode {
        id: file_node_id(&entry.relative_path),
        node_type: NodeType::File,
        element_kind: None,
        file_path: entry.relative_path.clone(),
        size: entry.size_bytes,
        complexity: entry.complexity_score,
        last_modified: Some(entry.last_modified),
        imports: entry.imports.clone(),
        exports: entry.exports.clone(),
    }
}

pub fn element_node(element: &CodeElement) -> GraphNode {
    GraphNode {
        id: element.id.clone(),
        node_type: NodeType::Element,
        element_kind: Some(element.kind),
        file_path: element.file_path.clone(),
        size: u64::from(element.end_line - element.start_line + 1),
        complexity: element.complexity_score,
        last_modified: None,
        imports: Vec::new(),
        exports: Vec::new(),
    }
}

/// Import edges of one file, one per distinct resolved target.
fn import_edges(inputs: &GraphInputs<'_>, entry: &FileEntry) -> Vec<GraphEdge> {
    inputs
        .resolver
        .resolve_all(entry)
        .into_iter()
        .map(|target| GraphEdge {
            to: file_node_id(&target),
            kind: EdgeKind::Import,
            weight: 1.0,
        })
        .collect()
}

/// Element edges originating in one file, keyed by source element id.
/// Same-file definitions shadow imported ones; repeated references add
/// weight.
fn element_edges(inputs: &GraphInputs<'_>, entry: &FileEntry) -> BTreeMap<String, Vec<GraphEdge>> {
    let Some(references) = inputs.references.get(&entry.relative_path) else {
        return BTreeMap::new();
    };
    let imported: Vec<String> = inputs.resolver.resolve_all(entry);

    let mut local: BTreeMap<&str, Vec<&CodeElement>> = BTreeMap::new();
    let mut external: BTreeMap<&str, Vec<&CodeElement>> = BTreeMap::new();
    collect_names(inputs, &entry.relative_path, &mut local);
    for path in &imported {
        collect_names(inputs, path, &mut external);
    }

    let mut weights: BTreeMap<(String, String, EdgeKind), f32> = BTreeMap::new();
    for reference in references {
        if !inputs.elements.contains_key(&reference.from) {
            continue;
        }
        let name = reference.name.as_str();
        let candidates = match local.get(name) {
            Some(found) if found.iter().any(|e| e.id != reference.from) => found,
            _ => match external.get(name) {
                Some(found) => found,
                None => continue,
            },
        };
        for target in candidates {
            if target.id == reference.from || !edge_accepts(reference.kind, target.kind) {
                continue;
            }
            *weights
                .entry((reference.from.clone(), target.id.clone(), reference.kind))
                .or_insert(0.0) += 1.0;
        }
    }

    let mut edges: BTreeMap<String, Vec<GraphEdge>> = BTreeMap::new();
    for ((from, to, kind), weight) in weights {
        edges.entry(from).or_default().push(GraphEdge { to, kind, weight });
    }
    edges
}

fn collect_names<'a>(
    inputs: &GraphInputs<'a>,
    path: &str,
    into: &mut BTreeMap<&'a str, Vec<&'a CodeElement>>,
) {
    let Some(entry) = inputs.files.get(path) else {
        return;
    };
    for id in &entry.element_ids {
        if let Some(element) = inputs.elements.get(id) {
            into.entry(element.name.as_str()).or_default().push(element);
        }
    }
}

fn sort_edges(edges: &mut [GraphEdge]) {
    edges.sort_by(|a, b| a.to.cmp(&b.to).then(a.kind.cmp(&b.kind)));
}

/// Insert the nodes of one file and its elements.
fn insert_file_nodes(graph: &mut DependencyGraph, inputs: &GraphInputs<'_>, entry: &FileEntry) {
    graph
        .nodes
        .insert(file_node_id(&entry.relative_path), file_node(entry));
    for id in &entry.element_ids {
        if let Some(element) = inputs.elements.get(id) {
            graph.nodes.insert(id.clone(), element_node(element));
        }
    }
}

/// Replace every outgoing edge owned by one file.
fn relink_file(graph: &mut DependencyGraph, inputs: &GraphInputs<'_>, entry: &FileEntry) {
    let file_id = file_node_id(&entry.relative_path);
    graph.edges.remove(&file_id);
    for id in &entry.element_ids {
        graph.edges.remove(id);
    }

    let mut imports = import_edges(inputs, entry);
    if !imports.is_empty() {
        sort_edges(&mut imports);
        graph.edges.insert(file_id, imports);
    }
    for (from, mut edges) in element_edges(inputs, entry) {
        sort_edges(&mut edges);
        graph.edges.insert(from, edges);
    }
}

/// Build the whole graph from the file index.
pub fn build_graph(inputs: &GraphInputs<'_>) -> DependencyGraph {
    let mut graph = DependencyGraph::default();
    for entry in inputs.files.values() {
        insert_file_nodes(&mut graph, inputs, entry);
    }
    for entry in inputs.files.values() {
        relink_file(&mut graph, inputs, entry);
    }
    drop_dangling_edges(&mut graph);
    debug!(
        "built dependency graph: {} nodes, {} edge lists",
        graph.nodes.len(),
        graph.edges.len()
    );
    graph
}

/// Files whose outgoing edges may change when `changed` paths change.
fn affected_files(graph: &DependencyGraph, inputs: &GraphInputs<'_>, changed: &BTreeSet<String>) -> BTreeSet<String> {
    let mut affected: BTreeSet<String> = changed.clone();

    // Old edges into nodes of changed files.
    for (from, edges) in &graph.edges {
        let points_into_changed = edges.iter().any(|edge| {
            graph
                .nodes
                .get(&edge.to)
                .is_some_and(|node| changed.contains(&node.file_path))
        });
        if points_into_changed {
            if let Some(node) = graph.nodes.get(from) {
                affected.insert(node.file_path.clone());
            }
        }
    }

    // Importers that now resolve to a changed path.
    for entry in inputs.files.values() {
        if affected.contains(&entry.relative_path) {
            continue;
        }
        let resolves_to_changed = entry.imports.iter().any(|module| {
            inputs
                .resolver
                .resolve(&entry.relative_path, entry.language, module)
                .is_some_and(|target| changed.contains(&target))
        });
        if resolves_to_changed {
            affected.insert(entry.relative_path.clone());
        }
    }
    affected
}

/// Patch the graph after `changed` paths were created, modified or removed
/// in `inputs`. Returns the set of files whose edges were recomputed.
pub fn patch_graph(graph: &mut DependencyGraph, inputs: &GraphInputs<'_>, changed: &BTreeSet<String>) -> BTreeSet<String> {
    let affected = affected_files(graph, inputs, changed);

    // Drop every node (and its outgoing edges) belonging to a changed file.
    let stale: Vec<String> = graph
        .nodes
        .iter()
        .filter(|(_, node)| changed.contains(&node.file_path))
        .map(|(id, _)| id.clone())
        .collect();
    for id in &stale {
        graph.nodes.remove(id);
        graph.edges.remove(id);
    }

    for path in changed {
        if let Some(entry) = inputs.files.get(path) {
            insert_file_nodes(graph, inputs, entry);
        }
    }
    for path in &affected {
        if let Some(entry) = inputs.files.get(path) {
            relink_file(graph, inputs, entry);
        }
    }
    drop_dangling_edges(graph);
    debug!(
        "patched dependency graph: {} changed, {} relinked",
        changed.len(),
        affected.len()
    );
    affected
}

/// Remove edges whose source or target node no longer exists.
pub fn drop_dangling_edges(graph: &mut DependencyGraph) {
    let nodes = &graph.nodes;
    graph.edges.retain(|from, edges| {
        if !nodes.contains_key(from) {
            return false;
        }
        edges.retain(|edge| nodes.contains_key(&edge.to));
        !edges.is_empty()
    });
}

/// Symmetric element relationships derived from element edges.
pub fn element_relationships(graph: &DependencyGraph) -> BTreeMap<String, Vec<String>> {
    let mut related: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (from, edges) in &graph.edges {
        for edge in edges.iter().filter(|e| e.kind != EdgeKind::Import) {
            related.entry(from.clone()).or_default().insert(edge.to.clone());
            related.entry(edge.to.clone()).or_default().insert(from.clone());
        }
    }
    related
        .into_iter()
        .map(|(id, set)| (id, set.into_iter().collect()))
        .collect()
}

/// Direct outgoing targets of a node.
pub fn dependencies_of(graph: &DependencyGraph, node_id: &str) -> Vec<String> {
    let mut targets: Vec<String> = graph
        .edges
        .get(node_id)
        .map(|edges| edges.iter().map(|e| e.to.clone()).collect())
        .unwrap_or_default();
    targets.sort();
    targets.dedup();
    targets
}

/// Nodes with an edge into `node_id`.
pub fn dependents_of(graph: &DependencyGraph, node_id: &str) -> Vec<String> {
    graph
        .edges
        .iter()
        .filter(|(_, edges)| edges.iter().any(|e| e.to == node_id))
        .map(|(from, _)| from.clone())
        .collect()
}

/// Every elementary import cycle between files, each reported once
/// starting at its smallest node id.
///
/// Each node in id order roots a search for simple paths back to itself
/// that only pass through larger ids, restricted to nodes that can still
/// reach the root. Overlapping cycles sharing a node are all reported.
pub fn find_cycles(graph: &DependencyGraph) -> Vec<DependencyCycle> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = graph
        .nodes
        .values()
        .filter(|node| node.node_type == NodeType::File)
        .map(|node| (node.id.as_str(), Vec::new()))
        .collect();
    let files: BTreeSet<&str> = adjacency.keys().copied().collect();
    for (from, targets) in adjacency.iter_mut() {
        if let Some(edges) = graph.edges.get(*from) {
            targets.extend(
                edges
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Import && files.contains(e.to.as_str()))
                    .map(|e| e.to.as_str()),
            );
        }
        targets.sort_unstable();
        targets.dedup();
    }
    let mut reverse: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (&from, targets) in &adjacency {
        for &to in targets {
            reverse.entry(to).or_default().push(from);
        }
    }

    let mut found: BTreeSet<Vec<String>> = BTreeSet::new();
    for &start in adjacency.keys() {
        let reaches_start = reaching(&reverse, start);
        let mut path: Vec<&str> = vec![start];
        // Iterative DFS: (node, next child index).
        let mut frames: Vec<(&str, usize)> = vec![(start, 0)];
        while let Some((node, child)) = frames.last_mut() {
            let children = adjacency.get(*node).map(Vec::as_slice).unwrap_or_default();
            if *child < children.len() {
                let next = children[*child];
                *child += 1;
                if next == start {
                    found.insert(path.iter().map(|id| id.to_string()).collect());
                } else if reaches_start.contains(next) && !path.contains(&next) {
                    frames.push((next, 0));
                    path.push(next);
                }
            } else {
                frames.pop();
                path.pop();
            }
        }
    }
    debug!("found {} import cycles", found.len());

    found
        .into_iter()
        .map(|nodes| DependencyCycle {
            severity: CycleSeverity::for_length(nodes.len()),
            nodes,
        })
        .collect()
}

/// Nodes with ids above `start` that reach `start` through such nodes.
fn reaching<'a>(reverse: &BTreeMap<&'a str, Vec<&'a str>>, start: &'a str) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    let mut queue = vec![start];
    while let Some(node) = queue.pop() {
        for &prev in reverse.get(node).map(Vec::as_slice).unwrap_or_default() {
            if prev > start && seen.insert(prev) {
                queue.push(prev);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{element_id, ElementKind, Language};
    use chrono::Utc;
    use std::path::Path;

    struct Fixture {
        files: BTreeMap<String, FileEntry>,
        elements: BTreeMap<String, CodeElement>,
        references: BTreeMap<String, Vec<ElementReference>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                files: BTreeMap::new(),
                elements: BTreeMap::new(),
                references: BTreeMap::new(),
            }
        }

        fn file(&mut self, path: &str, imports: &[&str], elements: &[(&str, ElementKind, u32)]) {
            let mut entry = FileEntry {
                file_path: Path::new("/repo").join(path),
                relative_path: path.to_string(),
                language: Language::TypeScript,
                size_bytes: 10,
                line_count: 10,
                last_modified: Utc::now(),
                content_hash: String::new(),
                element_ids: BTreeSet::new(),
                imports: imports.iter().map(|s| s.to_string()).collect(),
                exports: Vec::new(),
                complexity_score: 1,
            };
            for (name, kind, line) in elements {
                let id = element_id(path, name, *line);
                entry.element_ids.insert(id.clone());
                self.elements.insert(
                    id.clone(),
                    CodeElement {
                        id,
                        kind: *kind,
                        name: name.to_string(),
                        file_path: path.to_string(),
                        start_line: *line,
                        end_line: *line + 1,
                        signature: String::new(),
                        dependencies: Vec::new(),
                        usage_sites: Vec::new(),
                        complexity_score: 1,
                        semantic_tags: Vec::new(),
                    },
                );
            }
            self.files.insert(path.to_string(), entry);
        }

        fn reference(&mut self, path: &str, from: &str, name: &str, kind: EdgeKind) {
            self.references.entry(path.to_string()).or_default().push(ElementReference {
                from: from.to_string(),
                name: name.to_string(),
                line: 1,
                kind,
            });
        }

        fn remove(&mut self, path: &str) {
            if let Some(entry) = self.files.remove(path) {
                for id in entry.element_ids {
                    self.elements.remove(&id);
                }
            }
            self.references.remove(path);
        }

        fn resolver(&self) -> ImportResolver {
            ImportResolver::new(Path::new("/nonexistent"), self.files.keys())
        }

        fn build(&self) -> DependencyGraph {
            let resolver = self.resolver();
            build_graph(&GraphInputs {
                files: &self.files,
                elements: &self.elements,
                references: &self.references,
                resolver: &resolver,
            })
        }

        fn patch(&self, graph: &mut DependencyGraph, changed: &[&str]) -> BTreeSet<String> {
            let resolver = self.resolver();
            let changed: BTreeSet<String> = changed.iter().map(|s| s.to_string()).collect();
            patch_graph(
                graph,
                &GraphInputs {
                    files: &self.files,
                    elements: &self.elements,
                    references: &self.references,
                    resolver: &resolver,
                },
                &changed,
            )
        }
    }

    fn two_file_fixture() -> Fixture {
        let mut fx = Fixture::new();
        fx.file("a.ts", &["./b"], &[("main", ElementKind::Function, 1)]);
        fx.file("b.ts", &[], &[("helper", ElementKind::Function, 1)]);
        fx.reference("a.ts", "a.ts#main@1", "helper", EdgeKind::Call);
        fx
    }

    #[test]
    fn test_build_graph_links_imports_and_calls() {
        let fx = two_file_fixture();
        let graph = fx.build();
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(dependencies_of(&graph, "file:a.ts"), vec!["file:b.ts".to_string()]);
        assert_eq!(dependencies_of(&graph, "a.ts#main@1"), vec!["b.ts#helper@1".to_string()]);
        assert_eq!(dependents_of(&graph, "file:b.ts"), vec!["file:a.ts".to_string()]);
    }

    #[test]
    fn test_unimported_names_do_not_link() {
        let mut fx = Fixture::new();
        fx.file("a.ts", &[], &[("main", ElementKind::Function, 1)]);
        fx.file("b.ts", &[], &[("helper", ElementKind::Function, 1)]);
        fx.reference("a.ts", "a.ts#main@1", "helper", EdgeKind::Call);
        let graph = fx.build();
        assert!(dependencies_of(&graph, "a.ts#main@1").is_empty());
    }

    #[test]
    fn test_repeated_references_add_weight() {
        let mut fx = two_file_fixture();
        fx.references.get_mut("a.ts").unwrap().push(ElementReference {
            from: "a.ts#main@1".into(),
            name: "helper".into(),
            line: 2,
            kind: EdgeKind::Call,
        });
        let graph = fx.build();
        assert_eq!(graph.edges["a.ts#main@1"][0].weight, 2.0);
    }

    #[test]
    fn test_inheritance_requires_type_target() {
        let mut fx = Fixture::new();
        fx.file(
            "a.ts",
            &[],
            &[("Base", ElementKind::Class, 1), ("Child", ElementKind::Class, 5), ("base", ElementKind::Function, 9)],
        );
        fx.reference("a.ts", "a.ts#Child@5", "Base", EdgeKind::Inheritance);
        fx.reference("a.ts", "a.ts#Child@5", "base", EdgeKind::Inheritance);
        let graph = fx.build();
        let edges = &graph.edges["a.ts#Child@5"];
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, "a.ts#Base@1");
        assert_eq!(edges[0].kind, EdgeKind::Inheritance);
    }

    #[test]
    fn test_patch_after_delete_matches_rebuild() {
        let mut fx = two_file_fixture();
        let mut graph = fx.build();
        fx.remove("b.ts");
        let affected = fx.patch(&mut graph, &["b.ts"]);
        assert!(affected.contains("a.ts"));
        assert_eq!(graph, fx.build());
        assert!(!graph.nodes.contains_key("file:b.ts"));
        assert!(dependencies_of(&graph, "file:a.ts").is_empty());
    }

    #[test]
    fn test_patch_after_create_links_waiting_importer() {
        let mut fx = Fixture::new();
        fx.file("a.ts", &["./b"], &[("main", ElementKind::Function, 1)]);
        fx.reference("a.ts", "a.ts#main@1", "helper", EdgeKind::Call);
        let mut graph = fx.build();
        assert!(dependencies_of(&graph, "file:a.ts").is_empty());

        fx.file("b.ts", &[], &[("helper", ElementKind::Function, 1)]);
        fx.patch(&mut graph, &["b.ts"]);
        assert_eq!(graph, fx.build());
        assert_eq!(dependencies_of(&graph, "a.ts#main@1"), vec!["b.ts#helper@1".to_string()]);
    }

    #[test]
    fn test_patch_leaves_unrelated_files_alone() {
        let mut fx = two_file_fixture();
        fx.file("c.ts", &[], &[("other", ElementKind::Function, 1)]);
        let mut graph = fx.build();
        fx.file("b.ts", &[], &[("helper", ElementKind::Function, 3)]);
        fx.elements.remove("b.ts#helper@1");
        let affected = fx.patch(&mut graph, &["b.ts"]);
        assert!(!affected.contains("c.ts"));
        assert_eq!(graph, fx.build());
    }

    #[test]
    fn test_element_relationships_are_symmetric() {
        let graph = two_file_fixture().build();
        let related = element_relationships(&graph);
        assert_eq!(related["a.ts#main@1"], vec!["b.ts#helper@1".to_string()]);
        assert_eq!(related["b.ts#helper@1"], vec!["a.ts#main@1".to_string()]);
        assert!(!related.contains_key("file:a.ts"));
    }

    #[test]
    fn test_find_cycles() {
        let mut fx = Fixture::new();
        fx.file("a.ts", &["./b"], &[]);
        fx.file("b.ts", &["./c"], &[]);
        fx.file("c.ts", &["./a"], &[]);
        fx.file("d.ts", &["./a"], &[]);
        let cycles = find_cycles(&fx.build());
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0].nodes,
            vec!["file:a.ts".to_string(), "file:b.ts".to_string(), "file:c.ts".to_string()]
        );
        assert_eq!(cycles[0].severity, CycleSeverity::Low);
    }

    #[test]
    fn test_overlapping_cycles_are_all_reported() {
        let mut fx = Fixture::new();
        fx.file("a.ts", &["./b", "./c"], &[]);
        fx.file("b.ts", &["./c"], &[]);
        fx.file("c.ts", &["./a"], &[]);
        let cycles: Vec<Vec<String>> = find_cycles(&fx.build()).into_iter().map(|c| c.nodes).collect();
        assert_eq!(
            cycles,
            vec![
                vec!["file:a.ts".to_string(), "file:b.ts".to_string(), "file:c.ts".to_string()],
                vec!["file:a.ts".to_string(), "file:c.ts".to_string()],
            ]
        );
    }

    #[test]
    fn test_cycles_not_through_smallest_node() {
        let mut fx = Fixture::new();
        fx.file("a.ts", &["./b"], &[]);
        fx.file("b.ts", &["./c"], &[]);
        fx.file("c.ts", &["./b", "./d"], &[]);
        fx.file("d.ts", &["./c"], &[]);
        let cycles: Vec<Vec<String>> = find_cycles(&fx.build()).into_iter().map(|c| c.nodes).collect();
        assert_eq!(
            cycles,
            vec![
                vec!["file:b.ts".to_string(), "file:c.ts".to_string()],
                vec!["file:c.ts".to_string(), "file:d.ts".to_string()],
            ]
        );
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let fx = two_file_fixture();
        assert!(find_cycles(&fx.build()).is_empty());
    }

    #[test]
    fn test_drop_dangling_edges() {
        let mut graph = two_file_fixture().build();
        graph.nodes.remove("b.ts#helper@1");
        drop_dangling_edges(&mut graph);
        assert!(!graph.edges.contains_key("a.ts#main@1"));
    }
}
