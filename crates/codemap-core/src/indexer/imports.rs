//! Import resolution from raw module specifiers to indexed repository files.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use crate::models::{FileEntry, Language};

const TS_EXTENSIONS: &[&str] = &["ts", "tsx", "d.ts", "js", "jsx", "mjs", "cjs", "vue", "svelte"];

/// Resolves import specifiers against the set of indexed relative paths.
#[derive(Clone, Debug, Default)]
pub struct ImportResolver {
    files: BTreeSet<String>,
    go_module: Option<String>,
}

impl ImportResolver {
    pub fn new<'a>(root: &Path, files: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            files: files.into_iter().cloned().collect(),
            go_module: read_go_module(root),
        }
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.files.contains(relative_path)
    }

    pub fn insert(&mut self, relative_path: &str) {
        self.files.insert(relative_path.to_string());
    }

    pub fn remove(&mut self, relative_path: &str) {
        self.files.remove(relative_path);
    }

    /// Every indexed file the entry's imports resolve to, sorted and
    /// deduplicated. Unresolvable specifiers are dropped.
    pub fn resolve_all(&self, entry: &FileEntry) -> Vec<String> {
        let mut targets = BTreeSet::new();
        for module in &entry.imports {
            match self.resolve(&entry.relative_path, entry.language, module) {
                Some(target) if target != entry.relative_path => {
                    targets.insert(target);
                }
                Some(_) => {}
                None => debug!(
                    "unresolved import {module:?} in {}",
                    entry.relative_path
                ),
            }
        }
        targets.into_iter().collect()
    }

    pub fn resolve(&self, source_path: &str, language: Language, module: &str) -> Option<String> {
        if module.is_empty() {
            return None;
        }
        match language {
            Language::TypeScript | Language::JavaScript => self.resolve_typescript(source_path, module),
            Language::Python => self.resolve_python(source_path, module),
            Language::Java => self.resolve_java(module),
            Language::Go => self.resolve_go(source_path, module),
            Language::Rust => self.resolve_rust(source_path, module),
            Language::Unknown => None,
        }
    }

    /// First indexed file below `dir` with the given extension.
    fn first_in_dir(&self, dir: &str, extension: &str) -> Option<String> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        self.files
            .range(prefix.clone()..)
            .take_while(|p| p.starts_with(&prefix))
            .find(|p| {
                p.ends_with(extension) && !p[prefix.len()..].contains('/')
            })
            .cloned()
    }

    fn first_existing(&self, candidates: impl IntoIterator<Item = String>) -> Option<String> {
        candidates
            .into_iter()
            .map(|c| normalize_posix_path(&c))
            .find(|c| self.files.contains(c))
    }

    fn resolve_typescript(&self, source_path: &str, module: &str) -> Option<String> {
        if !module.starts_with('.') {
            return None;
        }
        let base = normalize_posix_path(&format!("{}/{module}", parent_dir(source_path)));
        let mut candidates = vec![base.clone()];
        // `./util.js` written against a `util.ts` source.
        if let Some(stem) = base
            .strip_suffix(".js")
            .or_else(|| base.strip_suffix(".mjs"))
            .or_else(|| base.strip_suffix(".jsx"))
        {
            candidates.push(format!("{stem}.ts"));
            candidates.push(format!("{stem}.tsx"));
        }
        candidates.extend(TS_EXTENSIONS.iter().map(|ext| format!("{base}.{ext}")));
        candidates.extend(TS_EXTENSIONS.iter().map(|ext| format!("{base}/index.{ext}")));
        self.first_existing(candidates)
    }

    fn resolve_python(&self, source_path: &str, module: &str) -> Option<String> {
        let base = if module.starts_with('.') {
            let levels = module.chars().take_while(|&c| c == '.').count();
            let suffix = &module[levels..];
            let mut dir = parent_dir(source_path).to_string();
            for _ in 0..levels.saturating_sub(1) {
                dir = parent_dir(&dir).to_string();
            }
            if suffix.is_empty() {
                dir
            } else {
                format!("{dir}/{}", suffix.replace('.', "/"))
            }
        } else {
            module.replace('.', "/")
        };
        let mut candidates = vec![format!("{base}.py"), format!("{base}/__init__.py")];
        if !module.starts_with('.') {
            candidates.push(format!("src/{base}.py"));
            candidates.push(format!("src/{base}/__init__.py"));
        }
        self.first_existing(candidates)
    }

    fn resolve_java(&self, module: &str) -> Option<String> {
        let (package, wildcard) = match module.strip_suffix(".*") {
            Some(stripped) => (stripped, true),
            None => (module, false),
        };
        let relative = package.replace('.', "/");
        // Maven and Gradle keep sources below src/main/java.
        let roots = ["", "src/main/java/", "src/"];
        for root in roots {
            if wildcard {
                if let Some(found) = self.first_in_dir(&format!("{root}{relative}"), ".java") {
                    return Some(found);
                }
            } else if let Some(found) = self.first_existing([format!("{root}{relative}.java")]) {
                return Some(found);
            }
        }
        None
    }

    fn resolve_go(&self, source_path: &str, module: &str) -> Option<String> {
        if module.starts_with('.') {
            let dir = normalize_posix_path(&format!("{}/{module}", parent_dir(source_path)));
            return self.first_in_dir(&dir, ".go");
        }
        let root_module = self.go_module.as_deref()?;
        let rel_pkg = module.strip_prefix(root_module)?;
        if !rel_pkg.is_empty() && !rel_pkg.starts_with('/') {
            return None;
        }
        self.first_in_dir(rel_pkg.trim_start_matches('/'), ".go")
    }

    fn resolve_rust(&self, source_path: &str, module: &str) -> Option<String> {
        let segments: Vec<&str> = module.split("::").map(str::trim).collect();
        let module_dir = rust_module_dir(source_path);
        let (base, rest) = match segments.first().copied() {
            Some("crate") => (rust_crate_root(source_path), &segments[1..]),
            Some("self") => (module_dir, &segments[1..]),
            Some("super") => (parent_dir(&module_dir).to_string(), &segments[1..]),
            Some(_) if segments.len() == 1 => (module_dir, &segments[..]),
            _ => return None,
        };
        // Longest module path first; trailing segments may be items.
        for len in (1..=rest.len()).rev() {
            let joined = rest[..len].join("/");
            let path = if base.is_empty() {
                joined
            } else {
                format!("{base}/{joined}")
            };
            if let Some(found) = self.first_existing([format!("{path}.rs"), format!("{path}/mod.rs")]) {
                return Some(found);
            }
        }
        None
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Directory holding the children of the module defined in `source_path`.
fn rust_module_dir(source_path: &str) -> String {
    let dir = parent_dir(source_path);
    let stem = Path::new(source_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if matches!(stem.as_str(), "lib" | "main" | "mod") {
        dir.to_string()
    } else if dir.is_empty() {
        stem
    } else {
        format!("{dir}/{stem}")
    }
}

fn rust_crate_root(source_path: &str) -> String {
    match source_path.find("src/") {
        Some(pos) => source_path[..pos + 3].to_string(),
        None => parent_dir(source_path).to_string(),
    }
}

fn read_go_module(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("go.mod")).ok()?;
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("module "))
        .map(|name| name.trim().to_string())
}

/// Collapse `.`, `..` and empty segments of a `/`-separated path.
pub fn normalize_posix_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }
    stack.join("/")
}
