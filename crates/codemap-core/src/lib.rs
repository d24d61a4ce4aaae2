//! Codemap core library: a semantic index of a source repository plus an
//! incrementally maintained file and element dependency graph.
//!
//! The crate discovers source files, extracts code elements (functions,
//! classes, types, variables) per language, links them into a dependency
//! graph, and answers keyword, similarity and structural queries. A
//! [`RepositoryService`] owns the live index; a [`RepositoryWatcher`] keeps
//! it current as files change on disk.

pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod query;
pub mod service;
pub mod store;
pub mod watcher;

pub use config::IndexConfig;
pub use errors::{IndexError, IndexResult};
pub use indexer::extract::{ElementExtractor, ExtractorRegistry};
pub use service::{RepositoryService, UpdateReport};
pub use store::RepositoryIndex;
pub use watcher::RepositoryWatcher;
