//! Naming-convention statistics and architectural pattern heuristics.
//!
//! Both are pure functions of the current file and element maps and are
//! recomputed after every mutation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ArchitecturalPattern, CodeElement, FileEntry, NamingConvention, NamingConventions};

const MAX_EVIDENCE: usize = 5;

static CAMEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(?:[A-Z][a-z0-9]*)+$").unwrap());
static PASCAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)*$").unwrap());
static SNAKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(?:_[a-z0-9]+)+$").unwrap());
static KEBAB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)+$").unwrap());

/// Classify a single name. The categories are disjoint; single lowercase
/// words and mixed styles match none.
pub fn classify_name(name: &str) -> Option<NamingConvention> {
    if CAMEL_RE.is_match(name) {
        Some(NamingConvention::CamelCase)
    } else if PASCAL_RE.is_match(name) {
        Some(NamingConvention::PascalCase)
    } else if SNAKE_RE.is_match(name) {
        Some(NamingConvention::SnakeCase)
    } else if KEBAB_RE.is_match(name) {
        Some(NamingConvention::KebabCase)
    } else {
        None
    }
}

fn file_stem(relative_path: &str) -> Option<String> {
    let name = Path::new(relative_path).file_name()?.to_string_lossy().to_string();
    // `user-service.spec.ts` -> `user-service`
    name.split('.').next().map(str::to_string).filter(|s| !s.is_empty())
}

/// Count conventions over every distinct element name and file stem.
pub fn naming_conventions<'a>(
    files: impl IntoIterator<Item = &'a FileEntry>,
    elements: impl IntoIterator<Item = &'a CodeElement>,
) -> NamingConventions {
    let mut names: BTreeSet<String> = elements.into_iter().map(|e| e.name.clone()).collect();
    names.extend(files.into_iter().filter_map(|f| file_stem(&f.relative_path)));

    let mut conventions = NamingConventions::default();
    for name in names {
        let Some(convention) = classify_name(&name) else {
            continue;
        };
        match convention {
            NamingConvention::CamelCase => conventions.camel_case += 1,
            NamingConvention::PascalCase => conventions.pascal_case += 1,
            NamingConvention::SnakeCase => conventions.snake_case += 1,
            NamingConvention::KebabCase => conventions.kebab_case += 1,
        }
        conventions.classifications.insert(name, convention);
    }
    conventions
}

/// One declarative heuristic: a predicate over the indexed paths that yields
/// its evidence when the pattern holds.
struct Heuristic {
    name: &'static str,
    confidence: f32,
    description: &'static str,
    matches: fn(&[PathFacts]) -> Option<Vec<String>>,
}

struct PathFacts {
    path: String,
    basename: String,
    directories: Vec<String>,
}

impl PathFacts {
    fn new(relative_path: &str) -> Self {
        let lower = relative_path.to_lowercase();
        let mut parts: Vec<String> = lower.split('/').map(str::to_string).collect();
        let basename = parts.pop().unwrap_or_default();
        Self {
            path: relative_path.to_string(),
            basename,
            directories: parts,
        }
    }

    fn basename_has(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.basename.contains(n))
    }

    fn in_directory(&self, needles: &[&str]) -> bool {
        self.directories.iter().any(|d| needles.contains(&d.as_str()))
    }
}

fn evidence<'a>(facts: impl Iterator<Item = &'a PathFacts>) -> Vec<String> {
    facts.take(MAX_EVIDENCE).map(|f| f.path.clone()).collect()
}

fn mvc(facts: &[PathFacts]) -> Option<Vec<String>> {
    let groups: [&[&str]; 3] = [&["model"], &["view", "component"], &["controller", "service"]];
    let mut found = Vec::new();
    for needles in groups {
        let first = facts.iter().find(|f| f.basename_has(needles))?;
        found.push(first.path.clone());
    }
    Some(found)
}

fn repository(facts: &[PathFacts]) -> Option<Vec<String>> {
    let matching: Vec<&PathFacts> = facts
        .iter()
        .filter(|f| f.basename_has(&["repository", "repo."]) || f.in_directory(&["repositories"]))
        .collect();
    (!matching.is_empty()).then(|| evidence(matching.into_iter()))
}

fn component_based(facts: &[PathFacts]) -> Option<Vec<String>> {
    let matching: Vec<&PathFacts> = facts
        .iter()
        .filter(|f| f.basename_has(&["component"]) || f.in_directory(&["components"]))
        .collect();
    (matching.len() >= 2).then(|| evidence(matching.into_iter()))
}

fn service_layer(facts: &[PathFacts]) -> Option<Vec<String>> {
    let matching: Vec<&PathFacts> = facts
        .iter()
        .filter(|f| f.basename_has(&["service"]) || f.in_directory(&["services"]))
        .collect();
    (matching.len() >= 2).then(|| evidence(matching.into_iter()))
}

const HEURISTICS: &[Heuristic] = &[
    Heuristic {
        name: "MVC",
        confidence: 0.8,
        description: "Separate model, view and controller files",
        matches: mvc,
    },
    Heuristic {
        name: "Repository Pattern",
        confidence: 0.7,
        description: "Data access isolated behind repository modules",
        matches: repository,
    },
    Heuristic {
        name: "Component-Based",
        confidence: 0.75,
        description: "UI composed from reusable component modules",
        matches: component_based,
    },
    Heuristic {
        name: "Service Layer",
        confidence: 0.6,
        description: "Business logic grouped into service modules",
        matches: service_layer,
    },
];

/// Evaluate every heuristic against the indexed files.
pub fn detect_patterns(files: &BTreeMap<String, FileEntry>) -> Vec<ArchitecturalPattern> {
    let facts: Vec<PathFacts> = files.keys().map(|p| PathFacts::new(p)).collect();
    HEURISTICS
        .iter()
        .filter_map(|h| {
            (h.matches)(&facts).map(|evidence| ArchitecturalPattern {
                name: h.name.to_string(),
                confidence: h.confidence,
                description: h.description.to_string(),
                evidence,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ElementKind, Language};
    use chrono::Utc;

    fn entry(path: &str) -> FileEntry {
        FileEntry {
            file_path: Path::new("/repo").join(path),
            relative_path: path.to_string(),
            language: Language::TypeScript,
            size_bytes: 0,
            line_count: 0,
            last_modified: Utc::now(),
            content_hash: String::new(),
            element_ids: BTreeSet::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            complexity_score: 1,
        }
    }

    fn element(name: &str) -> CodeElement {
        CodeElement {
            id: format!("a.ts#{name}@1"),
            kind: ElementKind::Function,
            name: name.to_string(),
            file_path: "a.ts".to_string(),
            start_line: 1,
            end_line: 1,
            signature: String::new(),
            dependencies: Vec::new(),
            usage_sites: Vec::new(),
            complexity_score: 1,
            semantic_tags: Vec::new(),
        }
    }

    fn files(paths: &[&str]) -> BTreeMap<String, FileEntry> {
        paths.iter().map(|p| (p.to_string(), entry(p))).collect()
    }

    #[test]
    fn test_classify_name_categories_are_disjoint() {
        assert_eq!(classify_name("helperFunc"), Some(NamingConvention::CamelCase));
        assert_eq!(classify_name("HelperFunc"), Some(NamingConvention::PascalCase));
        assert_eq!(classify_name("helper_func"), Some(NamingConvention::SnakeCase));
        assert_eq!(classify_name("helper-func"), Some(NamingConvention::KebabCase));
        assert_eq!(classify_name("helper"), None);
        assert_eq!(classify_name("MAX_SIZE"), None);
        assert_eq!(classify_name("mixed_Style"), None);
    }

    #[test]
    fn test_naming_conventions_count_distinct_names() {
        let files = files(&["src/user-service.ts", "src/App.tsx"]);
        let elements = [element("helperFunc"), element("helperFunc"), element("load_all"), element("main")];
        let conventions = naming_conventions(files.values(), elements.iter());
        assert_eq!(conventions.camel_case, 1);
        assert_eq!(conventions.snake_case, 1);
        assert_eq!(conventions.kebab_case, 1);
        assert_eq!(conventions.pascal_case, 1);
        assert_eq!(conventions.total(), 4);
        assert_eq!(
            conventions.classifications.get("user-service"),
            Some(&NamingConvention::KebabCase)
        );
        assert!(!conventions.classifications.contains_key("main"));
    }

    #[test]
    fn test_rename_moves_bucket() {
        let before = naming_conventions(std::iter::empty(), [element("helperFunc")].iter());
        let after = naming_conventions(std::iter::empty(), [element("helper_func")].iter());
        assert_eq!((before.camel_case, before.snake_case), (1, 0));
        assert_eq!((after.camel_case, after.snake_case), (0, 1));
        assert_eq!(before.total(), after.total());
    }

    #[test]
    fn test_detect_mvc() {
        let patterns = detect_patterns(&files(&[
            "app/models/UserModel.ts",
            "app/views/UserView.tsx",
            "app/controllers/UserController.ts",
        ]));
        let mvc = patterns.iter().find(|p| p.name == "MVC").unwrap();
        assert_eq!(mvc.confidence, 0.8);
        assert_eq!(mvc.evidence.len(), 3);
    }

    #[test]
    fn test_mvc_requires_all_three_roles() {
        let patterns = detect_patterns(&files(&["models/user.ts", "views/user.ts"]));
        assert!(!patterns.iter().any(|p| p.name == "MVC"));
    }

    #[test]
    fn test_detect_service_and_repository() {
        let patterns = detect_patterns(&files(&[
            "src/user.service.ts",
            "src/order.service.ts",
            "src/user.repository.ts",
        ]));
        let names: Vec<&str> = patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Repository Pattern", "Service Layer"]);
    }

    #[test]
    fn test_detection_is_pure() {
        let index = files(&["components/Button.tsx", "components/Card.tsx"]);
        assert_eq!(detect_patterns(&index), detect_patterns(&index));
        assert_eq!(detect_patterns(&index)[0].name, "Component-Based");
    }

    #[test]
    fn test_empty_index_has_no_patterns() {
        assert!(detect_patterns(&BTreeMap::new()).is_empty());
    }
}
