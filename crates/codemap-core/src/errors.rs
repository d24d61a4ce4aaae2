//! Error types for the codemap core library.

use std::path::PathBuf;

/// Top-level error enum for the codemap core library.
///
/// Most variants are recoverable per file: the pipeline logs them and moves
/// on. Only `Config`, `Watch` and `Cancelled` usually reach a caller.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction degraded for {path}: {reason}")]
    ParseDegradation { path: String, reason: String },

    #[error("a full rebuild is in progress; incremental update re-queued")]
    ConcurrentMutation,

    #[error("repository index has not been built yet")]
    NotInitialized,

    #[error("index build cancelled")]
    Cancelled,

    #[error("unknown code element: {0}")]
    UnknownElement(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// True for errors scoped to a single file that must not abort a build.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            IndexError::FileAccess { .. } | IndexError::ParseDegradation { .. }
        )
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
