//! Filesystem scanning helpers for indexing passes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use ignore::gitignore::Gitignore;
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::IndexConfig;
use crate::errors::{IndexError, IndexResult};
use crate::models::Language;

/// Repository-local ignore file, gitignore syntax.
pub const IGNORE_FILE_NAME: &str = ".codemapignore";

const LANGUAGE_BY_EXTENSION: &[(&str, Language)] = &[
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("cts", Language::TypeScript),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("py", Language::Python),
    ("pyi", Language::Python),
    ("java", Language::Java),
    ("go", Language::Go),
    ("rs", Language::Rust),
];

/// Extensions whose language depends on the embedded script block.
const TEMPLATED_EXTENSIONS: &[&str] = &["vue", "svelte", "html", "htm"];

static SCRIPT_TS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<script[^>]*\blang\s*=\s*["'](ts|typescript)["']"#).unwrap());

static SHEBANG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#!\s*\S*?(?:env\s+)?(python[0-9.]*|node|deno|bun)\b").unwrap());

/// Ignore files read in every directory, strongest first.
const IGNORE_FILE_KINDS: [&str; 3] = [IGNORE_FILE_NAME, ".ignore", ".gitignore"];

/// Eligibility rules shared by full discovery and incremental updates.
///
/// Discovery walks the tree with these rules; a single changed path is
/// checked against the same include/exclude overrides and the ignore files
/// of every directory between it and the root, so an incremental update
/// admits exactly the files a full rebuild would.
#[derive(Clone, Debug)]
pub struct RepositoryFilter {
    root: PathBuf,
    overrides: Override,
    config: IndexConfig,
}

impl RepositoryFilter {
    pub fn new(root: &Path, config: &IndexConfig) -> IndexResult<Self> {
        let mut overrides = OverrideBuilder::new(root);
        for pattern in &config.include_patterns {
            let pattern = pattern.trim();
            if !pattern.is_empty() {
                overrides
                    .add(pattern)
                    .map_err(|e| IndexError::Config(format!("include pattern {pattern:?}: {e}")))?;
            }
        }
        for pattern in config.effective_excludes() {
            let pattern = pattern.trim().trim_start_matches("./");
            if pattern.is_empty() {
                continue;
            }
            overrides
                .add(&format!("!{pattern}"))
                .map_err(|e| IndexError::Config(format!("exclude pattern {pattern:?}: {e}")))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| IndexError::Config(e.to_string()))?;
        Ok(Self {
            root: root.to_path_buf(),
            overrides,
            config: config.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate eligible files, sorted and deduplicated. Applies the
    /// extension filter, `.gitignore` and [`IGNORE_FILE_NAME`] rules, the
    /// configured overrides and the size cap. Entries that cannot be
    /// stat'ed or opened are skipped.
    pub fn discover(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .parents(false)
            .require_git(false)
            .git_global(false)
            .git_exclude(false)
            .add_custom_ignore_filename(IGNORE_FILE_NAME)
            .overrides(self.overrides.clone())
            .build();

        let mut found = BTreeSet::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("skipping unreadable walk entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.into_path();
            if self.has_eligible_extension(&path) && self.within_size(&path) {
                found.insert(path);
            }
        }
        found.into_iter().collect()
    }

    /// Whether `path` would be found by [`discover`](Self::discover) right now.
    pub fn accepts(&self, path: &Path) -> bool {
        self.has_eligible_extension(path) && !self.is_ignored(path) && self.within_size(path)
    }

    pub fn has_eligible_extension(&self, path: &Path) -> bool {
        self.config.is_eligible_extension(path)
    }

    fn within_size(&self, path: &Path) -> bool {
        is_indexable(path, self.config.max_file_size_bytes)
    }

    /// True when an override or an ignore file excludes `path` or one of
    /// its parent directories. Paths outside the root are ignored. The
    /// path itself need not exist.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        let components: Vec<_> = relative.components().collect();
        let mut dir = self.root.clone();
        let mut layers: Vec<[Gitignore; 3]> = Vec::with_capacity(components.len());
        for (i, component) in components.iter().enumerate() {
            layers.push(load_ignore_files(&dir));
            let candidate = dir.join(component);
            let is_dir = i + 1 < components.len();
            if self.entry_ignored(&candidate, is_dir, &layers) {
                return true;
            }
            dir = candidate;
        }
        false
    }

    /// Overrides win outright; otherwise each ignore-file kind is consulted
    /// closest directory first, stronger kinds before weaker ones.
    fn entry_ignored(&self, candidate: &Path, is_dir: bool, layers: &[[Gitignore; 3]]) -> bool {
        let matched = self.overrides.matched(candidate, is_dir);
        if matched.is_ignore() {
            return true;
        }
        if matched.is_whitelist() {
            return false;
        }
        for kind in 0..IGNORE_FILE_KINDS.len() {
            for layer in layers.iter().rev() {
                let matched = layer[kind].matched(candidate, is_dir);
                if matched.is_ignore() {
                    return true;
                }
                if matched.is_whitelist() {
                    return false;
                }
            }
        }
        false
    }
}

fn load_ignore_files(dir: &Path) -> [Gitignore; 3] {
    IGNORE_FILE_KINDS.map(|name| {
        let path = dir.join(name);
        if !path.is_file() {
            return Gitignore::empty();
        }
        let (gitignore, err) = Gitignore::new(&path);
        if let Some(err) = err {
            debug!("partial ignore file {}: {err}", path.display());
        }
        gitignore
    })
}

/// Size and readability checks shared by discovery and incremental updates.
fn is_indexable(path: &Path, max_size: u64) -> bool {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(err) => {
            debug!("cannot stat {}: {err}", path.display());
            return false;
        }
    };
    if !metadata.is_file() {
        return false;
    }
    if metadata.len() > max_size {
        debug!(
            "skipping {} ({} bytes exceeds {max_size})",
            path.display(),
            metadata.len()
        );
        return false;
    }
    std::fs::File::open(path).is_ok()
}

/// Detect the language of a file from its extension, sniffing the content
/// for templated or extensionless files.
pub fn detect_language(path: &Path, content: Option<&str>) -> Language {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    if let Some(ext) = ext.as_deref() {
        if let Some((_, lang)) = LANGUAGE_BY_EXTENSION.iter().find(|(e, _)| *e == ext) {
            return *lang;
        }
        if TEMPLATED_EXTENSIONS.contains(&ext) {
            return match content {
                Some(text) if SCRIPT_TS_RE.is_match(text) => Language::TypeScript,
                Some(text) if text.contains("<script") => Language::JavaScript,
                _ => Language::Unknown,
            };
        }
    }
    content.map(sniff_shebang).unwrap_or(Language::Unknown)
}

fn sniff_shebang(content: &str) -> Language {
    let first_line = content.lines().next().unwrap_or_default();
    match SHEBANG_RE.captures(first_line) {
        Some(caps) if caps[1].starts_with("python") => Language::Python,
        Some(_) => Language::JavaScript,
        None => Language::Unknown,
    }
}

/// SHA-256 hex digest used for change detection.
pub fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Repository-relative POSIX path, or `None` when `path` is outside `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let normalized = rel.to_string_lossy().replace('\\', "/");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn walkdir_all(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                files.extend(walkdir_all(&path));
            } else {
                files.push(path);
            }
        }
        files.sort();
        files
    }

    fn discovered(root: &Path, config: &IndexConfig) -> Vec<String> {
        RepositoryFilter::new(root, config)
            .unwrap()
            .discover()
            .iter()
            .map(|p| relative_path(root, p).unwrap())
            .collect()
    }

    #[test]
    fn test_discovery_applies_extension_and_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/a.ts", "export function a() {}");
        write(root, "src/b.py", "def b():\n    pass\n");
        write(root, "README.md", "# readme");
        write(root, "node_modules/lib/index.js", "module.exports = 1;");
        write(root, "dist/app.min.js", "var a=1;");
        write(root, "src/vendor.min.js", "var a=1;");
        write(root, ".git/config.js", "x");

        let files = discovered(root, &IndexConfig::default());
        assert_eq!(files, vec!["src/a.ts".to_string(), "src/b.py".to_string()]);
    }

    #[test]
    fn test_discovery_honours_ignore_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/keep.ts", "const a = 1;");
        write(root, "generated/skip.ts", "const b = 2;");
        write(root, IGNORE_FILE_NAME, "generated/\n");

        let files = discovered(root, &IndexConfig::default());
        assert_eq!(files, vec!["src/keep.ts".to_string()]);
    }

    #[test]
    fn test_discovery_skips_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "small.ts", "const a = 1;");
        write(root, "big.ts", &"x".repeat(4096));
        let config = IndexConfig {
            max_file_size_bytes: 1024,
            ..IndexConfig::default()
        };
        assert_eq!(discovered(root, &config), vec!["small.ts".to_string()]);
    }

    #[test]
    fn test_discovery_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in ["c.ts", "a.ts", "b/d.go"] {
            write(root, name, "package x");
        }
        let config = IndexConfig::default();
        assert_eq!(discovered(root, &config), discovered(root, &config));
    }

    #[test]
    fn test_filter_checks_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filter = RepositoryFilter::new(root, &IndexConfig::default()).unwrap();
        assert!(filter.is_ignored(&root.join("node_modules/pkg/index.js")));
        assert!(filter.is_ignored(&root.join("app.min.js")));
        assert!(filter.is_ignored(Path::new("/elsewhere/app.ts")));
        assert!(!filter.is_ignored(&root.join("src/app.ts")));
    }

    #[test]
    fn test_filter_agrees_with_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, ".gitignore", "gen.ts\n/out-*/\n");
        write(root, "src/.gitignore", "local.ts\n!keep.ts\n");
        write(root, "src/.ignore", "*.gen.ts\n");
        write(root, IGNORE_FILE_NAME, "keep.ts\n");
        for rel in [
            "a.ts",
            "gen.ts",
            "src/gen.ts",
            "src/local.ts",
            "src/keep.ts",
            "src/model.gen.ts",
            "src/ok.ts",
            "out-1/x.ts",
            "lib/out-1/x.ts",
            "node_modules/dep/index.ts",
        ] {
            write(root, rel, "export const x = 1;\n");
        }
        let filter = RepositoryFilter::new(root, &IndexConfig::default()).unwrap();
        let walked = discovered(root, &IndexConfig::default());
        let checked: Vec<String> = walkdir_all(root)
            .into_iter()
            .filter(|p| filter.accepts(p))
            .map(|p| relative_path(root, &p).unwrap())
            .collect();
        assert_eq!(walked, checked);
        assert_eq!(
            walked,
            vec!["a.ts".to_string(), "lib/out-1/x.ts".to_string(), "src/ok.ts".to_string()]
        );
    }

    #[test]
    fn test_filter_applies_include_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/a.ts", "export const a = 1;\n");
        write(root, "scripts/b.ts", "export const b = 1;\n");
        let config = IndexConfig {
            include_patterns: vec!["src/**".to_string()],
            ..IndexConfig::default()
        };
        let filter = RepositoryFilter::new(root, &config).unwrap();
        assert!(filter.accepts(&root.join("src/a.ts")));
        assert!(!filter.accepts(&root.join("scripts/b.ts")));
        assert_eq!(discovered(root, &config), vec!["src/a.ts".to_string()]);
    }

    #[test]
    fn test_detect_language_by_extension() {
        assert_eq!(detect_language(Path::new("a/b.tsx"), None), Language::TypeScript);
        assert_eq!(detect_language(Path::new("a/b.mjs"), None), Language::JavaScript);
        assert_eq!(detect_language(Path::new("a/b.py"), None), Language::Python);
        assert_eq!(detect_language(Path::new("a/B.java"), None), Language::Java);
        assert_eq!(detect_language(Path::new("main.go"), None), Language::Go);
        assert_eq!(detect_language(Path::new("lib.rs"), None), Language::Rust);
        assert_eq!(detect_language(Path::new("notes.txt"), None), Language::Unknown);
    }

    #[test]
    fn test_detect_language_sniffs_templates_and_shebangs() {
        let vue = "<template></template>\n<script lang=\"ts\">\nexport default {}\n</script>";
        assert_eq!(
            detect_language(Path::new("App.vue"), Some(vue)),
            Language::TypeScript
        );
        let svelte = "<script>\nlet count = 0;\n</script>";
        assert_eq!(
            detect_language(Path::new("App.svelte"), Some(svelte)),
            Language::JavaScript
        );
        assert_eq!(
            detect_language(Path::new("bin/tool"), Some("#!/usr/bin/env python3\nprint(1)")),
            Language::Python
        );
        assert_eq!(
            detect_language(Path::new("bin/cli"), Some("#!/usr/bin/env node\n")),
            Language::JavaScript
        );
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = compute_content_hash(b"one");
        assert_eq!(a, compute_content_hash(b"one"));
        assert_ne!(a, compute_content_hash(b"two"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_path(root, Path::new("/repo/src/a.ts")),
            Some("src/a.ts".to_string())
        );
        assert_eq!(relative_path(root, Path::new("/elsewhere/a.ts")), None);
        assert_eq!(relative_path(root, root), None);
    }
}
