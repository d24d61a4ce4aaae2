//! Pattern-based element, import and export extraction.
//!
//! Every language is handled by regex line scanning with brace-depth (or
//! indentation) tracking for scope detection. This is the fallback
//! extractor for languages without a syntax-tree grammar and for files the
//! syntax-tree extractor rejects.

use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::extract::{ElementExtractor, ExtractedElement};
use crate::models::{ElementKind, Language};

/// Maximum lines a declaration header may span before its body opens.
const MAX_HEADER_LINES: usize = 6;

// ---------------------------------------------------------------------------
// Line helpers
// ---------------------------------------------------------------------------

static STRING_LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\\n]|\\.)'|'(?:[^'\\]|\\.)*'|`(?:[^`\\]|\\.)*`"#)
        .unwrap()
});

/// Blank out string literal contents and trailing line comments so braces
/// and keywords inside them are not counted.
pub fn strip_literals(line: &str, language: Language) -> String {
    let stripped = STRING_LITERAL_RE.replace_all(line, "\"\"");
    let marker = if language == Language::Python {
        "#"
    } else {
        "//"
    };
    match stripped.find(marker) {
        Some(pos) => stripped[..pos].to_string(),
        None => stripped.into_owned(),
    }
}

fn brace_delta(line: &str, language: Language) -> i32 {
    let clean = strip_literals(line, language);
    clean.chars().filter(|&c| c == '{').count() as i32
        - clean.chars().filter(|&c| c == '}').count() as i32
}

fn indentation(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Last line (0-based) of a brace-delimited block starting at `start`.
///
/// A declaration whose header never opens a brace (a `;`-terminated
/// statement or a one-line arrow) ends on the line it starts.
pub fn brace_block_end(lines: &[&str], start: usize, language: Language) -> usize {
    let mut depth = 0i32;
    let mut opened = false;
    for (offset, line) in lines.iter().enumerate().skip(start) {
        let clean = strip_literals(line, language);
        for ch in clean.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return offset;
        }
        if !opened {
            let trimmed = clean.trim_end();
            if trimmed.ends_with(';') || offset - start + 1 >= MAX_HEADER_LINES {
                return start;
            }
            if trimmed.contains("=>") && !trimmed.ends_with("=>") && !trimmed.ends_with('(') {
                return start;
            }
        }
    }
    if opened {
        lines.len().saturating_sub(1)
    } else {
        start
    }
}

/// Last line (0-based) of an indentation-delimited block starting at `start`.
pub fn indent_block_end(lines: &[&str], start: usize) -> usize {
    let base = indentation(lines[start]);
    let mut end = start;
    for (offset, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indentation(line) <= base {
            break;
        }
        end = offset;
    }
    end
}

/// Declaration text up to the opening body.
pub fn signature_at(lines: &[&str], start: usize, language: Language) -> String {
    if language == Language::Python {
        let mut text = String::new();
        for line in lines.iter().skip(start).take(MAX_HEADER_LINES) {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(line.trim());
            if line.trim_end().ends_with(':') {
                break;
            }
        }
        return text.trim_end_matches(':').trim().to_string();
    }
    let mut text = String::new();
    for line in lines.iter().skip(start).take(MAX_HEADER_LINES) {
        let trimmed = line.trim();
        if let Some(pos) = trimmed.find('{') {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed[..pos].trim_end());
            return text.trim().to_string();
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(trimmed);
        if trimmed.ends_with(';') || trimmed.contains("=>") {
            break;
        }
    }
    text.trim_end_matches(';').trim().to_string()
}

fn one_based(index: usize) -> u32 {
    (index + 1) as u32
}

fn element(
    name: &str,
    kind: ElementKind,
    lines: &[&str],
    start: usize,
    end: usize,
    language: Language,
    container: Option<&str>,
) -> ExtractedElement {
    ExtractedElement {
        name: name.to_string(),
        kind,
        start_line: one_based(start),
        end_line: one_based(end.max(start)),
        signature: signature_at(lines, start, language),
        container: container.map(str::to_string),
        is_async: lines[start].contains("async "),
    }
}

/// Scope tracker for brace languages: (container name, body depth).
struct Containers {
    stack: Vec<(String, i32)>,
}

impl Containers {
    fn new() -> Self {
        Self { stack: Vec::new() }
    }

    fn sync(&mut self, depth: i32) {
        while self.stack.last().is_some_and(|(_, body)| *body > depth) {
            self.stack.pop();
        }
    }

    fn push(&mut self, name: &str, depth_before: i32) {
        self.stack.push((name.to_string(), depth_before + 1));
    }

    /// Container whose body the current line sits directly in.
    fn direct(&self, depth: i32) -> Option<&str> {
        self.stack
            .last()
            .filter(|(_, body)| *body == depth)
            .map(|(name, _)| name.as_str())
    }
}

fn is_control_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "else"
            | "for"
            | "while"
            | "switch"
            | "case"
            | "catch"
            | "try"
            | "return"
            | "new"
            | "function"
            | "do"
            | "throw"
            | "typeof"
            | "await"
            | "super"
            | "this"
            | "synchronized"
    )
}

// ---------------------------------------------------------------------------
// TypeScript / JavaScript
// ---------------------------------------------------------------------------

static TS_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(class|enum)\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});

static TS_INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:declare\s+)?(interface|type)\s+([A-Za-z_$][\w$]*)").unwrap()
});

static TS_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\(")
        .unwrap()
});

static TS_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::\s*[^=]+)?=>)")
        .unwrap()
});

static TS_VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)").unwrap()
});

static TS_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)\s+)*\*?\s*(#?[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\([^)]*\)?\s*(?::\s*[^{=;]+)?\s*(?:\{.*)?;?$")
        .unwrap()
});

static TS_PROPERTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|readonly|declare|override)\s+)*(#?[A-Za-z_$][\w$]*)\s*[?!]?\s*(?::[^=;]+)?(=.*)?;?\s*$")
        .unwrap()
});

fn typescript_elements(source: &str, language: Language) -> Vec<ExtractedElement> {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();
    let mut containers = Containers::new();
    let mut depth = 0i32;

    for (idx, line) in lines.iter().enumerate() {
        containers.sync(depth);
        let depth_before = depth;
        depth += brace_delta(line, language);

        if let Some(caps) = TS_CLASS_RE.captures(line) {
            let name = &caps[2];
            let end = brace_block_end(&lines, idx, language);
            out.push(element(name, ElementKind::Class, &lines, idx, end, language, None));
            if &caps[1] == "class" {
                containers.push(name, depth_before);
            }
            continue;
        }
        if let Some(caps) = TS_INTERFACE_RE.captures(line) {
            let end = brace_block_end(&lines, idx, language);
            out.push(element(&caps[2], ElementKind::Interface, &lines, idx, end, language, None));
            continue;
        }
        if let Some(caps) = TS_FUNCTION_RE.captures(line) {
            let end = brace_block_end(&lines, idx, language);
            out.push(element(&caps[1], ElementKind::Function, &lines, idx, end, language, None));
            continue;
        }
        if let Some(class_name) = containers.direct(depth_before).map(str::to_string) {
            if let Some(caps) = TS_METHOD_RE.captures(line) {
                let name = &caps[1];
                if !is_control_keyword(name) && line.contains('(') {
                    let end = brace_block_end(&lines, idx, language);
                    out.push(element(
                        name,
                        ElementKind::Method,
                        &lines,
                        idx,
                        end,
                        language,
                        Some(&class_name),
                    ));
                    continue;
                }
            }
            if let Some(caps) = TS_PROPERTY_RE.captures(line) {
                let name = &caps[1];
                if !is_control_keyword(name) {
                    let is_arrow = caps.get(2).is_some_and(|m| m.as_str().contains("=>"));
                    let kind = if is_arrow {
                        ElementKind::Method
                    } else {
                        ElementKind::Property
                    };
                    let end = brace_block_end(&lines, idx, language);
                    out.push(element(name, kind, &lines, idx, end, language, Some(&class_name)));
                }
            }
            continue;
        }
        if depth_before == 0 {
            if let Some(caps) = TS_ARROW_RE.captures(line) {
                let end = brace_block_end(&lines, idx, language);
                out.push(element(&caps[1], ElementKind::Function, &lines, idx, end, language, None));
                continue;
            }
            if let Some(caps) = TS_VARIABLE_RE.captures(line) {
                let end = brace_block_end(&lines, idx, language);
                out.push(element(&caps[1], ElementKind::Variable, &lines, idx, end, language, None));
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

static PY_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap()
});

static PY_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_]\w*)").unwrap());

static PY_ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)([A-Za-z_]\w*)\s*(?::\s*[^=]+)?=[^=]").unwrap()
});

fn python_elements(source: &str) -> Vec<ExtractedElement> {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();
    // (indent, class name or None for a def)
    let mut blocks: Vec<(usize, Option<String>)> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let indent = indentation(line);
        while blocks.last().is_some_and(|(block_indent, _)| *block_indent >= indent) {
            blocks.pop();
        }
        let enclosing_class = match blocks.last() {
            Some((_, Some(class_name))) => Some(class_name.clone()),
            _ => None,
        };

        if let Some(caps) = PY_CLASS_RE.captures(line) {
            let name = caps[2].to_string();
            let end = indent_block_end(&lines, idx);
            out.push(element(&name, ElementKind::Class, &lines, idx, end, Language::Python, None));
            blocks.push((indent, Some(name)));
            continue;
        }
        if let Some(caps) = PY_DEF_RE.captures(line) {
            let kind = if enclosing_class.is_some() {
                ElementKind::Method
            } else {
                ElementKind::Function
            };
            let end = indent_block_end(&lines, idx);
            out.push(element(
                &caps[2],
                kind,
                &lines,
                idx,
                end,
                Language::Python,
                enclosing_class.as_deref(),
            ));
            blocks.push((indent, None));
            continue;
        }
        let in_def = blocks.last().is_some_and(|(_, class)| class.is_none());
        if in_def {
            continue;
        }
        if let Some(caps) = PY_ASSIGN_RE.captures(line) {
            let kind = if enclosing_class.is_some() {
                ElementKind::Property
            } else if blocks.is_empty() {
                ElementKind::Variable
            } else {
                continue;
            };
            out.push(element(
                &caps[2],
                kind,
                &lines,
                idx,
                idx,
                Language::Python,
                enclosing_class.as_deref(),
            ));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Java
// ---------------------------------------------------------------------------

static JAVA_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:@\w+\s+)*(?:(?:public|private|protected|abstract|final|static|sealed|non-sealed)\s+)*(class|interface|enum|record|@interface)\s+([A-Za-z_]\w*)")
        .unwrap()
});

static JAVA_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:@\w+(?:\([^)]*\))?\s+)*(?:(?:public|private|protected|static|final|abstract|synchronized|native|default|strictfp)\s+)*(?:<[^>]+>\s+)?(?:[\w<>\[\],.?]+(?:\s*<[^>]*>)?\s+)?([A-Za-z_]\w*)\s*\(")
        .unwrap()
});

static JAVA_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|final|volatile|transient)\s+)*[\w<>\[\],.?]+(?:\s*<[^>]*>)?\s+([A-Za-z_]\w*)\s*(?:=[^;]*)?;")
        .unwrap()
});

fn java_elements(source: &str) -> Vec<ExtractedElement> {
    let language = Language::Java;
    let lines: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();
    let mut containers = Containers::new();
    let mut depth = 0i32;

    for (idx, line) in lines.iter().enumerate() {
        containers.sync(depth);
        let depth_before = depth;
        depth += brace_delta(line, language);

        if let Some(caps) = JAVA_TYPE_RE.captures(line) {
            let kind = match &caps[1] {
                "interface" | "@interface" => ElementKind::Interface,
                _ => ElementKind::Class,
            };
            let name = &caps[2];
            let end = brace_block_end(&lines, idx, language);
            let container = containers.direct(depth_before).map(str::to_string);
            out.push(element(name, kind, &lines, idx, end, language, container.as_deref()));
            containers.push(name, depth_before);
            continue;
        }
        let Some(class_name) = containers.direct(depth_before).map(str::to_string) else {
            continue;
        };
        if let Some(caps) = JAVA_METHOD_RE.captures(line) {
            let name = &caps[1];
            if !is_control_keyword(name) {
                let end = brace_block_end(&lines, idx, language);
                out.push(element(
                    name,
                    ElementKind::Method,
                    &lines,
                    idx,
                    end,
                    language,
                    Some(&class_name),
                ));
                continue;
            }
        }
        if let Some(caps) = JAVA_FIELD_RE.captures(line) {
            let name = &caps[1];
            if !is_control_keyword(name) && !line.trim_start().starts_with("return") {
                out.push(element(
                    name,
                    ElementKind::Property,
                    &lines,
                    idx,
                    idx,
                    language,
                    Some(&class_name),
                ));
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

static GO_FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^func\s+([A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*\(").unwrap());

static GO_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^func\s*\(\s*(?:\w+\s+)?\*?\s*([A-Za-z_]\w*)[^)]*\)\s*([A-Za-z_]\w*)\s*\(").unwrap()
});

static GO_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:type\s+|\s+)([A-Za-z_]\w*)\s+(?:\[[^\]]*\]\s*)?(struct|interface)\b").unwrap()
});

static GO_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:var|const)\s+([A-Za-z_]\w*)\b").unwrap());

fn go_elements(source: &str) -> Vec<ExtractedElement> {
    let language = Language::Go;
    let lines: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();
    let mut depth = 0i32;

    for (idx, line) in lines.iter().enumerate() {
        let depth_before = depth;
        depth += brace_delta(line, language);

        if let Some(caps) = GO_METHOD_RE.captures(line) {
            let end = brace_block_end(&lines, idx, language);
            out.push(element(&caps[2], ElementKind::Method, &lines, idx, end, language, Some(&caps[1])));
            continue;
        }
        if let Some(caps) = GO_FUNCTION_RE.captures(line) {
            let end = brace_block_end(&lines, idx, language);
            out.push(element(&caps[1], ElementKind::Function, &lines, idx, end, language, None));
            continue;
        }
        if depth_before > 0 && !line.starts_with("type") {
            continue;
        }
        if let Some(caps) = GO_TYPE_RE.captures(line) {
            let kind = if &caps[2] == "interface" {
                ElementKind::Interface
            } else {
                ElementKind::Class
            };
            let end = brace_block_end(&lines, idx, language);
            out.push(element(&caps[1], kind, &lines, idx, end, language, None));
            continue;
        }
        if let Some(caps) = GO_VAR_RE.captures(line) {
            out.push(element(&caps[1], ElementKind::Variable, &lines, idx, idx, language, None));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

static RUST_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#)
        .unwrap()
});

static RUST_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(struct|enum|union|trait)\s+([A-Za-z_]\w*)").unwrap()
});

static RUST_IMPL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:unsafe\s+)?impl\b(?:\s*<[^>]*>)?\s+(?:[\w:<>, ]+\s+for\s+)?([A-Za-z_]\w*)").unwrap()
});

static RUST_CONST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:pub(?:\([^)]*\))?\s+)?(?:const|static)\s+(?:mut\s+)?([A-Za-z_]\w*)\s*:").unwrap()
});

fn rust_elements(source: &str) -> Vec<ExtractedElement> {
    let language = Language::Rust;
    let lines: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();
    let mut containers = Containers::new();
    let mut depth = 0i32;

    for (idx, line) in lines.iter().enumerate() {
        containers.sync(depth);
        let depth_before = depth;
        depth += brace_delta(line, language);

        if let Some(caps) = RUST_IMPL_RE.captures(line) {
            containers.push(&caps[1], depth_before);
            continue;
        }
        if let Some(caps) = RUST_TYPE_RE.captures(line) {
            let name = &caps[2];
            let kind = if &caps[1] == "trait" {
                ElementKind::Interface
            } else {
                ElementKind::Class
            };
            let end = brace_block_end(&lines, idx, language);
            out.push(element(name, kind, &lines, idx, end, language, None));
            if kind == ElementKind::Interface {
                containers.push(name, depth_before);
            }
            continue;
        }
        if let Some(caps) = RUST_FN_RE.captures(line) {
            let owner = containers.direct(depth_before).map(str::to_string);
            let kind = if owner.is_some() {
                ElementKind::Method
            } else {
                ElementKind::Function
            };
            let end = brace_block_end(&lines, idx, language);
            out.push(element(&caps[1], kind, &lines, idx, end, language, owner.as_deref()));
            continue;
        }
        if depth_before == 0 {
            if let Some(caps) = RUST_CONST_RE.captures(line) {
                out.push(element(&caps[1], ElementKind::Variable, &lines, idx, idx, language, None));
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Regex line-scanning extractor covering every supported language.
#[derive(Debug, Default)]
pub struct PatternExtractor;

impl ElementExtractor for PatternExtractor {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn supports(&self, language: Language) -> bool {
        language != Language::Unknown
    }

    fn extract(&self, source: &str, language: Language) -> Result<Vec<ExtractedElement>, String> {
        let elements = match language {
            Language::TypeScript | Language::JavaScript => typescript_elements(source, language),
            Language::Python => python_elements(source),
            Language::Java => java_elements(source),
            Language::Go => go_elements(source),
            Language::Rust => rust_elements(source),
            Language::Unknown => return Err("no extraction rules for unknown language".to_string()),
        };
        Ok(elements)
    }
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

static TS_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:import|export)\b[^'"]*?\bfrom\s+['"]([^'"]+)['"]"#).unwrap()
});

static TS_FROM_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*\}\s*from\s+['"]([^'"]+)['"]"#).unwrap());

static TS_SIDE_EFFECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).unwrap());

static TS_REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:require|import)\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap()
});

static PY_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)").unwrap());

static PY_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*from\s+(\.*[\w.]*)\s+import\b").unwrap());

static JAVA_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(?:static\s+)?([\w.*]+)\s*;").unwrap());

static GO_IMPORT_SINGLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+(?:[\w.]+\s+)?"([^"]+)""#).unwrap());

static GO_IMPORT_BLOCK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s*\(").unwrap());

static GO_IMPORT_BLOCK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:[\w.]+\s+)?"([^"]+)""#).unwrap());

static RUST_USE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([^;{]+?)(?:::\{|;)").unwrap());

static RUST_MOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_]\w*)\s*;").unwrap());

/// Raw module specifiers as written in source, deduplicated in order.
pub fn extract_imports(source: &str, language: Language) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |module: &str| {
        let module = module.trim();
        if !module.is_empty() && !found.iter().any(|m| m == module) {
            found.push(module.to_string());
        }
    };

    match language {
        Language::TypeScript | Language::JavaScript => {
            for line in source.lines() {
                if let Some(caps) = TS_FROM_RE
                    .captures(line)
                    .or_else(|| TS_FROM_TAIL_RE.captures(line))
                    .or_else(|| TS_SIDE_EFFECT_RE.captures(line))
                {
                    push(&caps[1]);
                }
                for caps in TS_REQUIRE_RE.captures_iter(line) {
                    push(&caps[1]);
                }
            }
        }
        Language::Python => {
            for line in source.lines() {
                if let Some(caps) = PY_FROM_RE.captures(line) {
                    push(&caps[1]);
                } else if let Some(caps) = PY_IMPORT_RE.captures(line) {
                    for part in caps[1].split(',') {
                        let module = part.split(" as ").next().unwrap_or_default();
                        push(module);
                    }
                }
            }
        }
        Language::Java => {
            for line in source.lines() {
                if let Some(caps) = JAVA_IMPORT_RE.captures(line) {
                    push(&caps[1]);
                }
            }
        }
        Language::Go => {
            let mut in_block = false;
            for line in source.lines() {
                if GO_IMPORT_BLOCK_START_RE.is_match(line) {
                    in_block = true;
                    continue;
                }
                if in_block {
                    if line.trim() == ")" {
                        in_block = false;
                    } else if let Some(caps) = GO_IMPORT_BLOCK_LINE_RE.captures(line) {
                        push(&caps[1]);
                    }
                    continue;
                }
                if let Some(caps) = GO_IMPORT_SINGLE_RE.captures(line) {
                    push(&caps[1]);
                }
            }
        }
        Language::Rust => {
            for line in source.lines() {
                if let Some(caps) = RUST_MOD_RE.captures(line) {
                    push(&caps[1]);
                } else if let Some(caps) = RUST_USE_RE.captures(line) {
                    push(&caps[1]);
                }
            }
        }
        Language::Unknown => {}
    }
    found
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

static TS_EXPORT_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s+(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\s*\*?|class|const|let|var|interface|type|enum)\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});

static TS_EXPORT_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*export\s+(?:type\s+)?\{([^}]*)\}").unwrap());

static TS_EXPORT_DEFAULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:export\s+default\b|module\.exports\s*=)").unwrap());

static CJS_EXPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:module\.)?exports\.([A-Za-z_$][\w$]*)\s*=").unwrap());

static PY_TOP_LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+def|def|class)\s+([A-Za-z]\w*)|^([A-Za-z]\w*)\s*(?::[^=]+)?=[^=]").unwrap()
});

static PY_ALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^__all__\s*=\s*[\[(]([^\])]*)[\])]").unwrap());

static JAVA_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*public\s+(?:(?:abstract|final|sealed|static)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_]\w*)")
        .unwrap()
});

static GO_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:func\s+(?:\([^)]*\)\s*)?|type\s+|var\s+|const\s+)([A-Z]\w*)").unwrap()
});

static RUST_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^pub\s+(?:async\s+)?(?:unsafe\s+)?(?:fn|struct|enum|trait|mod|const|static|type|union)\s+([A-Za-z_]\w*)")
        .unwrap()
});

/// Exported symbol names as written in source, deduplicated in order.
pub fn extract_exports(source: &str, language: Language) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let name = name.trim();
        if !name.is_empty() && !found.iter().any(|n| n == name) {
            found.push(name.to_string());
        }
    };

    match language {
        Language::TypeScript | Language::JavaScript => {
            for line in source.lines() {
                if let Some(caps) = TS_EXPORT_DECL_RE.captures(line) {
                    push(&caps[1]);
                } else if let Some(caps) = TS_EXPORT_LIST_RE.captures(line) {
                    for part in caps[1].split(',') {
                        let exported = part.rsplit(" as ").next().unwrap_or_default();
                        push(exported.trim_start_matches("type ").trim());
                    }
                } else if TS_EXPORT_DEFAULT_RE.is_match(line) {
                    push("default");
                } else if let Some(caps) = CJS_EXPORT_RE.captures(line) {
                    push(&caps[1]);
                }
            }
        }
        Language::Python => {
            let declared = source
                .lines()
                .position(|l| l.starts_with("__all__"))
                .and_then(|pos| {
                    let rest = source.lines().skip(pos).collect::<Vec<_>>().join("\n");
                    PY_ALL_RE.captures(&rest).map(|c| c[1].to_string())
                });
            if let Some(list) = declared {
                for name in list.split(',') {
                    push(name.trim().trim_matches(|c| c == '"' || c == '\''));
                }
            } else {
                for line in source.lines() {
                    if let Some(caps) = PY_TOP_LEVEL_RE.captures(line) {
                        if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
                            push(name.as_str());
                        }
                    }
                }
            }
        }
        Language::Java => {
            for line in source.lines() {
                if let Some(caps) = JAVA_EXPORT_RE.captures(line) {
                    push(&caps[1]);
                }
            }
        }
        Language::Go => {
            for line in source.lines() {
                if let Some(caps) = GO_EXPORT_RE.captures(line) {
                    push(&caps[1]);
                }
            }
        }
        Language::Rust => {
            for line in source.lines() {
                if let Some(caps) = RUST_EXPORT_RE.captures(line) {
                    push(&caps[1]);
                }
            }
        }
        Language::Unknown => {}
    }
    found
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

static CONTROL_FLOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:if|elif|else|for|while|switch|case|catch|except|try)\b").unwrap()
});

static LOGICAL_OPERATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&&|\|\|").unwrap());

/// Ternary `?` operators: a `?` with a `:` somewhere after it, excluding
/// `?.`, `??` and `?:` optional members.
fn ternary_count(line: &str) -> u32 {
    let bytes = line.as_bytes();
    let mut count = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'?' {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| bytes[p]);
        let next = bytes.get(i + 1).copied();
        if prev == Some(b'?') || matches!(next, Some(b'.' | b'?' | b':')) {
            continue;
        }
        if bytes[i + 1..].contains(&b':') {
            count += 1;
        }
    }
    count
}

/// `1 + control-flow keywords + logical operators` over the given lines.
pub fn complexity_score<'a>(lines: impl IntoIterator<Item = &'a str>, language: Language) -> u32 {
    let mut score = 1u32;
    for line in lines {
        let clean = strip_literals(line, language);
        score += CONTROL_FLOW_RE.find_iter(&clean).count() as u32;
        score += LOGICAL_OPERATOR_RE.find_iter(&clean).count() as u32;
        score += ternary_count(&clean);
    }
    score
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
