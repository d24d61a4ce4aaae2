//! Index configuration: defaults, optional JSON file, environment overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, IndexResult};

const DEFAULT_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "java", "go", "rs", "vue", "svelte",
];

const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "vendor/",
    "target/",
    "dist/",
    "build/",
    "out/",
    "coverage/",
    "__pycache__/",
    ".venv/",
    "*.lock",
    "package-lock.json",
    "*.log",
    "*.tmp",
    "*.swp",
    "*.min.js",
    "*.bundle.js",
    "*.map",
];

const SENSITIVE_EXCLUDE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "*secret*",
    "*credential*",
    "id_rsa",
    "id_dsa",
];

/// Settings shared by discovery, analysis, embeddings and the watcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// File extensions (without the dot) eligible for indexing.
    pub extensions: Vec<String>,
    /// Gitignore-style patterns excluded from discovery.
    pub exclude_patterns: Vec<String>,
    /// When non-empty, only paths matching one of these are indexed.
    pub include_patterns: Vec<String>,
    pub max_file_size_bytes: u64,
    pub debounce_ms: u64,
    pub embedding_dimensions: usize,
    pub workers: usize,
    pub batch_size: usize,
    pub exclude_sensitive: bool,
    pub use_syntax_trees: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            include_patterns: Vec::new(),
            max_file_size_bytes: 1024 * 1024,
            debounce_ms: 1000,
            embedding_dimensions: 128,
            workers: 4,
            batch_size: 64,
            exclude_sensitive: true,
            use_syntax_trees: true,
        }
    }
}

impl IndexConfig {
    /// Load a JSON config file, then apply environment overrides.
    pub fn load(path: &Path) -> IndexResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| IndexError::file_access(path, e))?;
        let config: IndexConfig = serde_json::from_str(&content)?;
        config.with_env_overrides().validated()
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> IndexResult<Self> {
        Self::default().with_env_overrides().validated()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_number("CODEMAP_MAX_FILE_SIZE") {
            self.max_file_size_bytes = v;
        }
        if let Some(v) = env_number("CODEMAP_DEBOUNCE_MS") {
            self.debounce_ms = v;
        }
        if let Some(v) = env_number("CODEMAP_WORKERS") {
            self.workers = v as usize;
        }
        if let Some(v) = env_flag("CODEMAP_EXCLUDE_SENSITIVE") {
            self.exclude_sensitive = v;
        }
        if let Some(v) = env_flag("CODEMAP_SYNTAX_TREES") {
            self.use_syntax_trees = v;
        }
        self
    }

    pub fn validated(self) -> IndexResult<Self> {
        if self.embedding_dimensions == 0 {
            return Err(IndexError::Config(
                "embedding_dimensions must be positive".to_string(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(IndexError::Config("no eligible extensions".to_string()));
        }
        Ok(self)
    }

    /// Every exclusion pattern discovery should apply.
    pub fn effective_excludes(&self) -> Vec<String> {
        let mut patterns = self.exclude_patterns.clone();
        if self.exclude_sensitive {
            patterns.extend(SENSITIVE_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()));
        }
        patterns
    }

    pub fn is_eligible_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_flag(&v))
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
