//! Pluggable element extraction.
//!
//! Extractors are tried in registration order; the first one that supports
//! the language and succeeds wins.

use tracing::debug;

use crate::indexer::parser::SyntaxTreeExtractor;
use crate::indexer::symbols::PatternExtractor;
use crate::models::{ElementKind, Language};

/// A declaration found in source, before ids and tags are assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedElement {
    pub name: String,
    pub kind: ElementKind,
    /// 1-based, inclusive.
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    /// Enclosing class, impl or receiver type.
    pub container: Option<String>,
    pub is_async: bool,
}

pub trait ElementExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, language: Language) -> bool;

    fn extract(&self, source: &str, language: Language) -> Result<Vec<ExtractedElement>, String>;
}

#[derive(Debug)]
pub struct Extraction {
    pub elements: Vec<ExtractedElement>,
    pub extractor: &'static str,
}

pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn ElementExtractor>>,
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Syntax trees first (when enabled), regex patterns as the fallback.
    pub fn with_defaults(use_syntax_trees: bool) -> Self {
        let mut registry = Self::empty();
        if use_syntax_trees {
            registry.register(Box::new(SyntaxTreeExtractor));
        }
        registry.register(Box::new(PatternExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn ElementExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Run the first extractor that succeeds. The error lists every
    /// failure when none did.
    pub fn extract(&self, source: &str, language: Language) -> Result<Extraction, String> {
        let mut failures = Vec::new();
        for extractor in self.extractors.iter().filter(|e| e.supports(language)) {
            match extractor.extract(source, language) {
                Ok(elements) => {
                    return Ok(Extraction {
                        elements,
                        extractor: extractor.name(),
                    })
                }
                Err(reason) => {
                    debug!("{} extractor failed: {reason}", extractor.name());
                    failures.push(format!("{}: {reason}", extractor.name()));
                }
            }
        }
        if failures.is_empty() {
            Err(format!("no extractor supports {language}"))
        } else {
            Err(failures.join("; "))
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults(true)
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.names())
            .finish()
    }
}
