//! Per-file analysis: language, elements, imports, exports, complexity,
//! semantic tags and same-file references.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::warn;

use crate::errors::{IndexError, IndexResult};
use crate::indexer::callgraph::scan_references;
use crate::indexer::extract::{ExtractedElement, ExtractorRegistry};
use crate::indexer::filesystem::{compute_content_hash, detect_language, relative_path};
use crate::indexer::symbols::{complexity_score, extract_exports, extract_imports};
use crate::models::{
    element_id, CodeElement, EdgeKind, ElementKind, ElementReference, FileAnalysis, FileEntry,
    Language, UsageKind, UsageSite,
};

/// Raw file contents plus the metadata captured when they were read.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub text: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    pub content_hash: String,
}

impl SourceFile {
    pub fn from_bytes(root: &Path, path: &Path, bytes: &[u8], modified: DateTime<Utc>) -> IndexResult<Self> {
        let relative_path = relative_path(root, path).ok_or_else(|| {
            IndexError::Config(format!("{} is outside {}", path.display(), root.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            relative_path,
            text: String::from_utf8_lossy(bytes).into_owned(),
            size_bytes: bytes.len() as u64,
            modified,
            content_hash: compute_content_hash(bytes),
        })
    }
}

/// Read a file for analysis.
pub async fn read_source(root: &Path, path: &Path) -> IndexResult<SourceFile> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IndexError::file_access(path, e))?;
    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    SourceFile::from_bytes(root, path, &bytes, modified)
}

static SCRIPT_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script[^>]*>(.*?)</script>").unwrap());

/// The embedded `<script>` body of a templated file and the number of lines
/// preceding it.
fn script_block(text: &str) -> Option<(u32, &str)> {
    let caps = SCRIPT_BLOCK_RE.captures(text)?;
    let body = caps.get(1)?;
    let offset = text[..body.start()].matches('\n').count() as u32;
    Some((offset, body.as_str()))
}

fn is_templated(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| matches!(e.as_str(), "vue" | "svelte" | "html" | "htm"))
}

/// Analyze already-read source. Extraction failures degrade to a file entry
/// with no elements.
pub fn analyze_source(source: &SourceFile, registry: &ExtractorRegistry) -> FileAnalysis {
    let language = detect_language(&source.path, Some(&source.text));
    let (line_offset, code) = if is_templated(&source.path) {
        script_block(&source.text).unwrap_or((0, ""))
    } else {
        (0, source.text.as_str())
    };

    let imports = extract_imports(code, language);
    let exports = extract_exports(code, language);
    let extracted = match registry.extract(code, language) {
        Ok(extraction) => extraction.elements,
        Err(reason) => {
            if language != Language::Unknown {
                let err = IndexError::ParseDegradation {
                    path: source.relative_path.clone(),
                    reason,
                };
                warn!("{err}");
            }
            Vec::new()
        }
    };

    let code_lines: Vec<&str> = code.lines().collect();
    let mut elements = build_elements(
        &source.relative_path,
        language,
        &extracted,
        &code_lines,
        &exports,
        line_offset,
    );
    let references = link_same_file(&source.relative_path, language, code, line_offset, &mut elements);

    let entry = FileEntry {
        file_path: source.path.clone(),
        relative_path: source.relative_path.clone(),
        language,
        size_bytes: source.size_bytes,
        line_count: source.text.lines().count(),
        last_modified: source.modified,
        content_hash: source.content_hash.clone(),
        element_ids: elements.iter().map(|e| e.id.clone()).collect(),
        imports,
        exports,
        complexity_score: complexity_score(code_lines.iter().copied(), language),
    };
    FileAnalysis {
        entry,
        elements,
        references,
    }
}

fn build_elements(
    relative_path: &str,
    language: Language,
    extracted: &[ExtractedElement],
    lines: &[&str],
    exports: &[String],
    line_offset: u32,
) -> Vec<CodeElement> {
    let mut seen = BTreeSet::new();
    let mut elements = Vec::with_capacity(extracted.len());
    for raw in extracted {
        let start_line = raw.start_line + line_offset;
        let end_line = raw.end_line.max(raw.start_line) + line_offset;
        let id = element_id(relative_path, &raw.name, start_line);
        // Two declarations of one name on one line collapse to the first.
        if !seen.insert(id.clone()) {
            continue;
        }
        let body = lines
            .iter()
            .skip(raw.start_line.saturating_sub(1) as usize)
            .take((raw.end_line.max(raw.start_line) - raw.start_line + 1) as usize)
            .copied();
        elements.push(CodeElement {
            id,
            kind: raw.kind,
            name: raw.name.clone(),
            file_path: relative_path.to_string(),
            start_line,
            end_line,
            signature: raw.signature.clone(),
            dependencies: Vec::new(),
            usage_sites: vec![UsageSite {
                file_path: relative_path.to_string(),
                line: start_line,
                kind: UsageKind::Definition,
            }],
            complexity_score: complexity_score(body, language),
            semantic_tags: semantic_tags(raw, relative_path, language, exports),
        });
    }
    elements
}

fn is_pascal_case(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().any(|c| c.is_ascii_lowercase())
}

/// Derived descriptive labels.
pub fn semantic_tags(raw: &ExtractedElement, relative_path: &str, language: Language, exports: &[String]) -> Vec<String> {
    let mut tags = BTreeSet::new();
    tags.insert(raw.kind.as_str().to_string());

    let signature = raw.signature.as_str();
    let exported = exports.iter().any(|e| *e == raw.name)
        || signature.starts_with("export ")
        || signature.starts_with("pub ")
        || (language == Language::Go
            && raw.container.is_none()
            && raw.name.starts_with(|c: char| c.is_ascii_uppercase()));
    if exported {
        tags.insert("exported".to_string());
    }
    if raw.is_async {
        tags.insert("async".to_string());
    }

    let lower_path = relative_path.to_lowercase();
    let is_test_file = lower_path.contains("test") || lower_path.contains("spec");
    if raw.name.starts_with("test") || raw.name.starts_with("Test") || (is_test_file && raw.kind.is_callable()) {
        tags.insert("test".to_string());
    }
    if raw.name.starts_with('_') || raw.name.starts_with('#') || signature.contains("private ") {
        tags.insert("private".to_string());
    }
    let is_constructor = matches!(raw.name.as_str(), "constructor" | "__init__" | "new")
        || (raw.kind == ElementKind::Method && raw.container.as_deref() == Some(raw.name.as_str()));
    if is_constructor {
        tags.insert("constructor".to_string());
    }
    let ui_file = [".tsx", ".jsx", ".vue", ".svelte"]
        .iter()
        .any(|ext| lower_path.ends_with(ext));
    if (ui_file && is_pascal_case(&raw.name) && matches!(raw.kind, ElementKind::Function | ElementKind::Class))
        || signature.contains("extends Component")
        || signature.contains("extends React.Component")
    {
        tags.insert("component".to_string());
    }
    if raw.name.starts_with("use") && raw.name[3..].starts_with(|c: char| c.is_ascii_uppercase()) {
        tags.insert("hook".to_string());
    }
    tags.into_iter().collect()
}

/// Resolve references against elements of the same file: fills
/// `dependencies` on the referencing element and `usage_sites` on the target.
/// Returns every scanned reference for cross-file linking.
fn link_same_file(
    relative_path: &str,
    language: Language,
    code: &str,
    line_offset: u32,
    elements: &mut [CodeElement],
) -> Vec<ElementReference> {
    let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, element) in elements.iter().enumerate() {
        by_name.entry(element.name.as_str()).or_default().push(idx);
    }

    // Scan against unshifted lines, then map back.
    let local: Vec<CodeElement> = elements
        .iter()
        .map(|e| CodeElement {
            start_line: e.start_line - line_offset,
            end_line: e.end_line - line_offset,
            ..e.clone()
        })
        .collect();
    let mut references = scan_references(code, language, &local);
    for reference in &mut references {
        reference.line += line_offset;
    }

    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut usages: Vec<(usize, UsageSite)> = Vec::new();
    for reference in &references {
        let Some(candidates) = by_name.get(reference.name.as_str()) else {
            continue;
        };
        for &target in candidates {
            let target_element = &elements[target];
            if target_element.id == reference.from || !edge_accepts(reference.kind, target_element.kind) {
                continue;
            }
            dependencies
                .entry(reference.from.clone())
                .or_default()
                .insert(target_element.id.clone());
            usages.push((
                target,
                UsageSite {
                    file_path: relative_path.to_string(),
                    line: reference.line,
                    kind: usage_kind(reference.kind),
                },
            ));
        }
    }

    for (target, site) in usages {
        elements[target].usage_sites.push(site);
    }
    for element in elements.iter_mut() {
        element.usage_sites.sort();
        element.usage_sites.dedup();
        if let Some(deps) = dependencies.remove(&element.id) {
            element.dependencies = deps.into_iter().collect();
        }
    }
    references
}

/// Whether an edge of `kind` may point at an element of `target` kind.
pub fn edge_accepts(kind: EdgeKind, target: ElementKind) -> bool {
    match kind {
        EdgeKind::Call => target.is_callable() || target.is_type(),
        EdgeKind::Inheritance | EdgeKind::Composition => target.is_type(),
        EdgeKind::Import => false,
    }
}

fn usage_kind(kind: EdgeKind) -> UsageKind {
    match kind {
        EdgeKind::Call => UsageKind::Call,
        EdgeKind::Inheritance => UsageKind::Inheritance,
        EdgeKind::Composition => UsageKind::Reference,
        EdgeKind::Import => UsageKind::Import,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(rel: &str, text: &str) -> SourceFile {
        SourceFile::from_bytes(
            Path::new("/repo"),
            &Path::new("/repo").join(rel),
            text.as_bytes(),
            Utc::now(),
        )
        .unwrap()
    }

    fn analyze(rel: &str, text: &str) -> FileAnalysis {
        analyze_source(&source(rel, text), &ExtractorRegistry::default())
    }

    fn find<'a>(analysis: &'a FileAnalysis, name: &str) -> &'a CodeElement {
        analysis.elements.iter().find(|e| e.name == name).unwrap()
    }

    #[test]
    fn test_entry_metadata() {
        let analysis = analyze("src/a.ts", "import { b } from './b';\nexport function a() {\n  return b();\n}\n");
        let entry = &analysis.entry;
        assert_eq!(entry.relative_path, "src/a.ts");
        assert_eq!(entry.file_path, PathBuf::from("/repo/src/a.ts"));
        assert_eq!(entry.language, Language::TypeScript);
        assert_eq!(entry.line_count, 4);
        assert_eq!(entry.imports, vec!["./b".to_string()]);
        assert_eq!(entry.exports, vec!["a".to_string()]);
        assert_eq!(entry.element_ids.len(), 1);
        assert!(entry.element_ids.contains("src/a.ts#a@2"));
    }

    #[test]
    fn test_every_element_belongs_to_its_file() {
        let analysis = analyze(
            "lib/service.py",
            "class Service:\n    def run(self):\n        return helper()\n\ndef helper():\n    return 1\n",
        );
        assert_eq!(analysis.elements.len(), 3);
        for element in &analysis.elements {
            assert_eq!(element.file_path, "lib/service.py");
            assert!(analysis.entry.element_ids.contains(&element.id));
            assert!(element.start_line <= element.end_line);
        }
    }

    #[test]
    fn test_same_file_dependencies_and_usages() {
        let analysis = analyze(
            "a.ts",
            "function helper() {\n  return 1;\n}\nexport function main() {\n  return helper() + helper();\n}\n",
        );
        let main = find(&analysis, "main");
        let helper = find(&analysis, "helper");
        assert_eq!(main.dependencies, vec![helper.id.clone()]);
        assert!(helper.dependencies.is_empty());
        assert_eq!(analysis.references.len(), 1);
        assert_eq!(analysis.references[0].from, main.id);
        assert_eq!(
            helper.usage_sites,
            vec![
                UsageSite { file_path: "a.ts".into(), line: 1, kind: UsageKind::Definition },
                UsageSite { file_path: "a.ts".into(), line: 5, kind: UsageKind::Call },
            ]
        );
    }

    #[test]
    fn test_complexity_per_element_and_file() {
        let analysis = analyze(
            "a.ts",
            "function simple() {\n  return 1;\n}\nfunction branchy(x) {\n  if (x && x.y) {\n    return 1;\n  }\n  return x ? 2 : 3;\n}\n",
        );
        assert_eq!(find(&analysis, "simple").complexity_score, 1);
        assert_eq!(find(&analysis, "branchy").complexity_score, 4);
        assert_eq!(analysis.entry.complexity_score, 4);
    }

    #[test]
    fn test_semantic_tags() {
        let analysis = analyze(
            "src/App.tsx",
            "export async function loadData() {\n  return 1;\n}\nexport function App() {\n  return null;\n}\nfunction _private() {}\nexport function useCounter() {}\n",
        );
        let load = find(&analysis, "loadData");
        assert!(load.semantic_tags.contains(&"async".to_string()));
        assert!(load.semantic_tags.contains(&"exported".to_string()));
        assert!(load.semantic_tags.contains(&"function".to_string()));
        assert!(find(&analysis, "App").semantic_tags.contains(&"component".to_string()));
        assert!(find(&analysis, "_private").semantic_tags.contains(&"private".to_string()));
        assert!(find(&analysis, "useCounter").semantic_tags.contains(&"hook".to_string()));
    }

    #[test]
    fn test_unparseable_file_keeps_entry_without_elements() {
        let analysis = analyze("notes.txt", "just some words\n");
        assert_eq!(analysis.entry.language, Language::Unknown);
        assert!(analysis.elements.is_empty());
        assert_eq!(analysis.entry.line_count, 1);
    }

    #[test]
    fn test_vue_script_block_lines_are_offset() {
        let text = "<template>\n  <div/>\n</template>\n<script lang=\"ts\">\nexport function setup() {\n  return {};\n}\n</script>\n";
        let analysis = analyze("App.vue", text);
        assert_eq!(analysis.entry.language, Language::TypeScript);
        let setup = find(&analysis, "setup");
        assert_eq!((setup.start_line, setup.end_line), (5, 7));
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let raw = ExtractedElement {
            name: "dup".into(),
            kind: ElementKind::Function,
            start_line: 1,
            end_line: 1,
            signature: "function dup()".into(),
            container: None,
            is_async: false,
        };
        let second = ExtractedElement {
            kind: ElementKind::Variable,
            ..raw.clone()
        };
        let elements = build_elements("a.ts", Language::TypeScript, &[raw, second], &["function dup() {}"], &[], 0);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].kind, ElementKind::Function);
    }

    #[tokio::test]
    async fn test_read_then_analyze_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.go");
        std::fs::write(&path, "package m\n\nfunc Run() {}\n").unwrap();
        let source = read_source(dir.path(), &path).await.unwrap();
        let analysis = analyze_source(&source, &ExtractorRegistry::default());
        assert_eq!(analysis.entry.relative_path, "m.go");
        assert_eq!(analysis.elements[0].name, "Run");
        assert!(analysis.elements[0].semantic_tags.contains(&"exported".to_string()));
    }

    #[tokio::test]
    async fn test_missing_file_is_file_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_source(dir.path(), &dir.path().join("gone.ts"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::FileAccess { .. }));
    }
}
