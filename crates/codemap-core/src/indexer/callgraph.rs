//! Reference scanning inside element bodies.
//!
//! Each source line is attributed to the innermost element covering it, then
//! scanned for call sites, inheritance clauses and composition (`new X`,
//! typed properties). Names are resolved to element ids later, once the
//! candidate set for the file is known.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::symbols::strip_literals;
use crate::models::{CodeElement, EdgeKind, ElementKind, ElementReference, Language};

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:([A-Za-z_$][\w$]*)\s*\.\s*)?([A-Za-z_$][\w$]*)\s*\(").unwrap()
});

static NEW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnew\s+([A-Za-z_$][\w$.]*)").unwrap());

static EXTENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:extends|implements)\s+([A-Za-z_$][\w$.]*(?:<[^{]*?>)?(?:\s*,\s*[A-Za-z_$][\w$.]*(?:<[^{]*?>)?)*)")
        .unwrap()
});

static PY_BASES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+\w+\s*\(([^)]*)\)").unwrap());

static TYPE_ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[:<]\s*([A-Z][\w$]*)").unwrap());

static DEFINITION_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:function|def|fn|func|class|new)\s*\*?\s*$").unwrap());

fn is_call_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "for"
            | "while"
            | "switch"
            | "catch"
            | "return"
            | "function"
            | "typeof"
            | "sizeof"
            | "super"
            | "print"
            | "elif"
            | "with"
            | "assert"
            | "await"
            | "yield"
            | "match"
            | "not"
            | "and"
            | "or"
            | "in"
            | "constructor"
    )
}

/// Innermost element (smallest span) covering `line`.
fn caller_for_line(line: u32, elements: &[CodeElement]) -> Option<&CodeElement> {
    elements
        .iter()
        .filter(|e| e.start_line <= line && line <= e.end_line)
        .min_by_key(|e| (e.end_line - e.start_line, std::cmp::Reverse(e.start_line)))
}

fn last_segment(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit('.').next().unwrap_or(base).trim()
}

/// Scan every element-covered line of `source` for references.
pub fn scan_references(source: &str, language: Language, elements: &[CodeElement]) -> Vec<ElementReference> {
    let mut found = BTreeSet::new();
    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let Some(caller) = caller_for_line(line_no, elements) else {
            continue;
        };
        let line = strip_literals(raw_line, language);
        let mut push = |name: &str, kind: EdgeKind| {
            let name = last_segment(name);
            if name.is_empty() || (name == caller.name && line_no == caller.start_line) {
                return;
            }
            found.insert(ElementReference {
                from: caller.id.clone(),
                name: name.to_string(),
                line: line_no,
                kind,
            });
        };

        if line_no == caller.start_line && caller.kind.is_type() {
            if let Some(caps) = PY_BASES_RE.captures(&line) {
                for base in caps[1].split(',').filter(|b| !b.contains('=')) {
                    push(base, EdgeKind::Inheritance);
                }
            }
        }
        for caps in EXTENDS_RE.captures_iter(&line) {
            for parent in split_type_list(&caps[1]) {
                push(parent, EdgeKind::Inheritance);
            }
        }

        let mut constructed = BTreeSet::new();
        for caps in NEW_RE.captures_iter(&line) {
            let name = last_segment(&caps[1]).to_string();
            push(&name, EdgeKind::Composition);
            constructed.insert(name);
        }
        if caller.kind == ElementKind::Property && line_no == caller.start_line {
            for caps in TYPE_ANNOTATION_RE.captures_iter(&line) {
                push(&caps[1], EdgeKind::Composition);
            }
        }

        for caps in CALL_RE.captures_iter(&line) {
            let Some(callee) = caps.get(2) else {
                continue;
            };
            let name = callee.as_str();
            if is_call_keyword(name) || constructed.contains(name) {
                continue;
            }
            let prefix = &line[..caps.get(0).map_or(0, |m| m.start())];
            if DEFINITION_PREFIX_RE.is_match(prefix) {
                continue;
            }
            push(name, EdgeKind::Call);
        }
    }
    found.into_iter().collect()
}

/// Split `Base<T>, Other` at top-level commas.
fn split_type_list(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (pos, ch) in list.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(list[start..pos].trim());
                start = pos + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::element_id;

    fn element(name: &str, kind: ElementKind, start: u32, end: u32) -> CodeElement {
        CodeElement {
            id: element_id("a.ts", name, start),
            kind,
            name: name.to_string(),
            file_path: "a.ts".to_string(),
            start_line: start,
            end_line: end,
            signature: String::new(),
            dependencies: Vec::new(),
            usage_sites: Vec::new(),
            complexity_score: 1,
            semantic_tags: Vec::new(),
        }
    }

    fn refs(source: &str, language: Language, elements: &[CodeElement]) -> Vec<(String, String, EdgeKind)> {
        scan_references(source, language, elements)
            .into_iter()
            .map(|r| (r.from, r.name, r.kind))
            .collect()
    }

    #[test]
    fn test_caller_for_line_picks_smallest() {
        let elements = vec![
            element("Outer", ElementKind::Class, 1, 10),
            element("inner", ElementKind::Method, 3, 5),
        ];
        assert_eq!(caller_for_line(4, &elements).unwrap().name, "inner");
        assert_eq!(caller_for_line(7, &elements).unwrap().name, "Outer");
        assert!(caller_for_line(11, &elements).is_none());
    }

    #[test]
    fn test_calls_are_attributed_to_innermost_element() {
        let src = "\
function helper() {
  return 1;
}
function main() {
  if (ready()) {
    helper();
  }
}
";
        let elements = vec![
            element("helper", ElementKind::Function, 1, 3),
            element("main", ElementKind::Function, 4, 8),
        ];
        assert_eq!(
            refs(src, Language::TypeScript, &elements),
            vec![
                ("a.ts#main@4".to_string(), "helper".to_string(), EdgeKind::Call),
                ("a.ts#main@4".to_string(), "ready".to_string(), EdgeKind::Call),
            ]
        );
    }

    #[test]
    fn test_definitions_and_keywords_are_not_calls() {
        let src = "def run(x):\n    while (x):\n        print(x)\n";
        let elements = vec![element("run", ElementKind::Function, 1, 3)];
        assert!(refs(src, Language::Python, &elements).is_empty());
    }

    #[test]
    fn test_inheritance_and_composition() {
        let src = "\
class Service extends Base<Model> implements Runnable, Closeable {
  private repo: Repository;
  start() {
    const c = new Cache();
  }
}
";
        let elements = vec![
            element("Service", ElementKind::Class, 1, 6),
            element("repo", ElementKind::Property, 2, 2),
            element("start", ElementKind::Method, 3, 5),
        ];
        let found = refs(src, Language::TypeScript, &elements);
        assert!(found.contains(&("a.ts#Service@1".into(), "Base".into(), EdgeKind::Inheritance)));
        assert!(found.contains(&("a.ts#Service@1".into(), "Runnable".into(), EdgeKind::Inheritance)));
        assert!(found.contains(&("a.ts#Service@1".into(), "Closeable".into(), EdgeKind::Inheritance)));
        assert!(found.contains(&("a.ts#repo@2".into(), "Repository".into(), EdgeKind::Composition)));
        assert!(found.contains(&("a.ts#start@3".into(), "Cache".into(), EdgeKind::Composition)));
        assert!(!found.iter().any(|(_, name, kind)| name == "Cache" && *kind == EdgeKind::Call));
    }

    #[test]
    fn test_python_base_classes() {
        let src = "class Repo(Base, metaclass=Meta):\n    pass\n";
        let elements = vec![element("Repo", ElementKind::Class, 1, 2)];
        assert_eq!(
            refs(src, Language::Python, &elements),
            vec![("a.ts#Repo@1".to_string(), "Base".to_string(), EdgeKind::Inheritance)]
        );
    }

    #[test]
    fn test_string_contents_are_ignored() {
        let src = "function a() {\n  log(\"call b() later\");\n}\n";
        let elements = vec![element("a", ElementKind::Function, 1, 3)];
        assert_eq!(
            refs(src, Language::TypeScript, &elements),
            vec![("a.ts#a@1".to_string(), "log".to_string(), EdgeKind::Call)]
        );
    }
}
