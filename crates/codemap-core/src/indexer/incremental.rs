//! Incremental update primitives: change events, the pending-path debounce
//! queue, and preparation of per-file replacements ahead of an apply.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{IndexError, IndexResult};
use crate::indexer::analyzer::{analyze_source, read_source};
use crate::indexer::extract::ExtractorRegistry;
use crate::indexer::filesystem::{relative_path, RepositoryFilter};
use crate::indexer::imports::normalize_posix_path;
use crate::models::FileAnalysis;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Queuing,
    DebouncedFlush,
    Applying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Repository-relative key for a path given absolute or relative.
pub fn index_key(root: &Path, path: &Path) -> Option<String> {
    if path.is_absolute() {
        relative_path(root, path)
    } else {
        let key = normalize_posix_path(&path.to_string_lossy().replace('\\', "/"));
        (!key.is_empty()).then_some(key)
    }
}

/// Pending paths plus a restartable deadline. Every push moves the
/// deadline to `now + window`.
#[derive(Debug)]
pub struct DebounceQueue {
    window: Duration,
    pending: BTreeSet<String>,
    deadline: Option<Instant>,
}

impl DebounceQueue {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeSet::new(),
            deadline: None,
        }
    }

    pub fn push(&mut self, path: String, now: Instant) {
        self.pending.insert(path);
        self.deadline = Some(now + self.window);
    }

    /// Drop a path that was deleted before the flush.
    pub fn remove(&mut self, path: &str) {
        self.pending.remove(path);
        if self.pending.is_empty() {
            self.deadline = None;
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn take(&mut self) -> BTreeSet<String> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }
}

/// Replacements ready to be applied to the index.
#[derive(Debug, Default)]
pub struct PreparedChanges {
    pub updates: Vec<FileAnalysis>,
    pub removals: Vec<String>,
    /// Paths whose content hash was unchanged.
    pub unchanged: Vec<String>,
}

impl PreparedChanges {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.removals.is_empty()
    }
}

/// Re-read and re-analyze `paths`. Paths gone from disk (or no longer
/// eligible, or unreadable) become removals; paths whose hash matches
/// `known` are skipped.
pub async fn prepare_changes(
    filter: &RepositoryFilter,
    registry: Arc<ExtractorRegistry>,
    paths: &BTreeSet<String>,
    known: &BTreeMap<String, String>,
) -> IndexResult<PreparedChanges> {
    let root = filter.root();
    let mut prepared = PreparedChanges::default();
    let mut sources = Vec::new();
    for key in paths {
        let absolute = root.join(key);
        if !filter.accepts(&absolute) {
            if known.contains_key(key) {
                prepared.removals.push(key.clone());
            }
            continue;
        }
        match read_source(root, &absolute).await {
            Ok(source) if known.get(key) == Some(&source.content_hash) => {
                debug!("content unchanged, skipping {key}");
                prepared.unchanged.push(key.clone());
            }
            Ok(source) => sources.push(source),
            Err(err) => {
                warn!("dropping unreadable file: {err}");
                if known.contains_key(key) {
                    prepared.removals.push(key.clone());
                }
            }
        }
    }
    if !sources.is_empty() {
        prepared.updates = tokio::task::spawn_blocking(move || {
            sources
                .iter()
                .map(|source| analyze_source(source, &registry))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| IndexError::Config(format!("analysis task failed: {e}")))?;
    }
    Ok(prepared)
}
