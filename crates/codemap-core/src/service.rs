//! Long-lived repository service.
//!
//! Owns the [`RepositoryIndex`] behind a single-writer/multi-reader lock.
//! Readers clone results out of the lock; writers (full rebuilds and
//! incremental applies) are serialised by an async mutex and only take the
//! write lock for the in-memory swap or patch, after all I/O is done.
//!
//! A rebuild raises a flag for its whole duration. An incremental apply
//! that sees the flag re-queues its paths instead of interleaving; they are
//! flushed as soon as the rebuild finishes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::IndexConfig;
use crate::errors::{IndexError, IndexResult};
use crate::indexer::extract::ExtractorRegistry;
use crate::indexer::filesystem::RepositoryFilter;
use crate::indexer::incremental::{index_key, prepare_changes, EngineState};
use crate::indexer::pipeline::{scan_repository, ProgressSender};
use crate::models::{
    ArchitecturalPattern, BuildPhase, BuildProgress, CodeElement, DependencyCycle,
    NamingConventions, RepositoryStats,
};
use crate::query::search::{keyword_search, similar_elements};
use crate::query::structure;
use crate::store::RepositoryIndex;

/// Outcome of an incremental update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    pub relinked: Vec<String>,
    /// Paths deferred because a full rebuild was running.
    pub requeued: Vec<String>,
}

impl UpdateReport {
    fn requeued(paths: BTreeSet<String>) -> Self {
        Self {
            requeued: paths.into_iter().collect(),
            ..Self::default()
        }
    }

    fn merge(&mut self, other: UpdateReport) {
        self.updated.extend(other.updated);
        self.removed.extend(other.removed);
        self.unchanged.extend(other.unchanged);
        self.relinked.extend(other.relinked);
        self.requeued.extend(other.requeued);
    }
}

/// Raised for the lifetime of a rebuild, lowered on every exit path.
struct RebuildFlag<'a>(&'a AtomicBool);

impl<'a> RebuildFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RebuildFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct RepositoryService {
    root: PathBuf,
    config: IndexConfig,
    filter: RepositoryFilter,
    registry: Arc<ExtractorRegistry>,
    index: RwLock<Option<RepositoryIndex>>,
    writer: tokio::sync::Mutex<()>,
    rebuilding: AtomicBool,
    requeued: Mutex<BTreeSet<String>>,
    state: Mutex<EngineState>,
    progress: ProgressSender,
    cancel: Mutex<CancellationToken>,
}

impl RepositoryService {
    pub fn new(root: impl AsRef<Path>, config: IndexConfig) -> IndexResult<Self> {
        let registry = ExtractorRegistry::with_defaults(config.use_syntax_trees);
        Self::with_registry(root, config, registry)
    }

    /// Use a custom set of element extractors.
    pub fn with_registry(
        root: impl AsRef<Path>,
        config: IndexConfig,
        registry: ExtractorRegistry,
    ) -> IndexResult<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|e| IndexError::file_access(root, e))?;
        let config = config.validated()?;
        let filter = RepositoryFilter::new(&root, &config)?;
        let (progress, _) = watch::channel(BuildProgress::default());
        Ok(Self {
            root,
            config,
            filter,
            registry: Arc::new(registry),
            index: RwLock::new(None),
            writer: tokio::sync::Mutex::new(()),
            rebuilding: AtomicBool::new(false),
            requeued: Mutex::new(BTreeSet::new()),
            state: Mutex::new(EngineState::Idle),
            progress: Arc::new(progress),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Eligibility rules applied to both full builds and updates.
    pub fn filter(&self) -> &RepositoryFilter {
        &self.filter
    }

    pub fn is_initialized(&self) -> bool {
        self.index.read().is_some()
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    pub fn engine_state(&self) -> EngineState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
    }

    /// Subscribe to full-build progress.
    pub fn progress(&self) -> watch::Receiver<BuildProgress> {
        self.progress.subscribe()
    }

    /// Paths waiting for the current rebuild to finish.
    pub fn requeued_paths(&self) -> Vec<String> {
        self.requeued.lock().iter().cloned().collect()
    }

    /// Stop the running rebuild after the file currently being analyzed.
    pub fn cancel_rebuild(&self) {
        self.cancel.lock().cancel();
    }

    // -----------------------------------------------------------------
    // Full build
    // -----------------------------------------------------------------

    /// Build (or rebuild) the whole index from disk. Files whose content is
    /// unchanged since the previous build are carried over without
    /// re-analysis. A cancelled rebuild leaves the previous index in place.
    pub async fn initialize_repository(&self) -> IndexResult<RepositoryStats> {
        let result = {
            let _flag = RebuildFlag::raise(&self.rebuilding);
            let cancel = CancellationToken::new();
            *self.cancel.lock() = cancel.clone();
            let _writer = self.writer.lock().await;
            self.rebuild(&cancel).await
        };
        if let Err(err) = self.flush_requeued().await {
            warn!("re-queued update failed: {err}");
        }
        result
    }

    async fn rebuild(&self, cancel: &CancellationToken) -> IndexResult<RepositoryStats> {
        let known = self
            .index
            .read()
            .as_ref()
            .map(RepositoryIndex::content_hashes)
            .unwrap_or_default();
        let scan = scan_repository(
            &self.filter,
            &self.config,
            Arc::clone(&self.registry),
            &known,
            &self.progress,
            cancel,
        )
        .await?;

        self.progress.send_modify(|p| p.phase = BuildPhase::Embedding);
        let analyzed = scan.fresh.len();
        let next = {
            let current = self.index.read();
            let mut next = RepositoryIndex::build(
                &self.root,
                scan.fresh,
                &scan.reused,
                current.as_ref(),
                self.config.embedding_dimensions,
            );
            next.revision = current.as_ref().map_or(0, |c| c.revision + 1);
            next
        };
        if cancel.is_cancelled() {
            self.progress.send_modify(|p| p.phase = BuildPhase::Cancelled);
            return Err(IndexError::Cancelled);
        }
        let stats = next.stats();
        *self.index.write() = Some(next);
        self.progress.send_modify(|p| p.phase = BuildPhase::Complete);
        info!(
            "index ready in {}ms: {} files ({} analyzed, {} failed), {} elements",
            scan.elapsed_ms,
            stats.total_files,
            analyzed,
            scan.failed,
            stats.total_elements
        );
        Ok(stats)
    }

    // -----------------------------------------------------------------
    // Incremental updates
    // -----------------------------------------------------------------

    /// Re-analyze `paths` (absolute or repository-relative) and patch the
    /// index. Paths missing from disk are removed; unchanged content is
    /// skipped. While a rebuild runs, the paths are re-queued instead.
    pub async fn update_index<P: AsRef<Path>>(
        &self,
        paths: impl IntoIterator<Item = P>,
    ) -> IndexResult<UpdateReport> {
        let keys: BTreeSet<String> = paths
            .into_iter()
            .filter_map(|p| index_key(&self.root, p.as_ref()))
            .collect();
        let mut report = self.apply_paths(keys).await?;
        report.merge(self.flush_requeued().await?);
        Ok(report)
    }

    /// Apply whatever was re-queued, unless a rebuild still holds it.
    async fn flush_requeued(&self) -> IndexResult<UpdateReport> {
        let mut report = UpdateReport::default();
        while !self.is_rebuilding() && self.is_initialized() {
            let next = std::mem::take(&mut *self.requeued.lock());
            if next.is_empty() {
                break;
            }
            info!("flushing {} re-queued paths", next.len());
            report.merge(self.apply_paths(next).await?);
        }
        Ok(report)
    }

    async fn apply_paths(&self, keys: BTreeSet<String>) -> IndexResult<UpdateReport> {
        if !self.is_initialized() {
            return Err(IndexError::NotInitialized);
        }
        if keys.is_empty() {
            return Ok(UpdateReport::default());
        }
        if self.is_rebuilding() {
            info!("{} ({} paths)", IndexError::ConcurrentMutation, keys.len());
            self.requeued.lock().extend(keys.iter().cloned());
            return Ok(UpdateReport::requeued(keys));
        }

        let _writer = self.writer.lock().await;
        self.set_state(EngineState::Applying);
        let result = self.apply_locked(&keys).await;
        self.set_state(EngineState::Idle);
        result
    }

    async fn apply_locked(&self, keys: &BTreeSet<String>) -> IndexResult<UpdateReport> {
        let known = {
            let guard = self.index.read();
            let index = guard.as_ref().ok_or(IndexError::NotInitialized)?;
            keys.iter()
                .filter_map(|k| {
                    index
                        .file_index
                        .get(k)
                        .map(|e| (k.clone(), e.content_hash.clone()))
                })
                .collect()
        };
        let prepared = prepare_changes(
            &self.filter,
            Arc::clone(&self.registry),
            keys,
            &known,
        )
        .await?;

        let mut report = UpdateReport {
            unchanged: prepared.unchanged.clone(),
            ..UpdateReport::default()
        };
        if prepared.is_empty() {
            return Ok(report);
        }
        let summary = {
            let mut guard = self.index.write();
            let index = guard.as_mut().ok_or(IndexError::NotInitialized)?;
            index.apply_changes(prepared.updates, &prepared.removals)
        };
        report.updated = summary.updated;
        report.removed = summary.removed;
        report.relinked = summary.relinked;
        Ok(report)
    }

    /// Remove deleted paths from the live index right away. When another
    /// writer is active the paths are also re-queued, so the result is
    /// checked against disk once it finishes.
    pub fn remove_paths<P: AsRef<Path>>(
        &self,
        paths: impl IntoIterator<Item = P>,
    ) -> IndexResult<Vec<String>> {
        let keys: Vec<String> = paths
            .into_iter()
            .filter_map(|p| index_key(&self.root, p.as_ref()))
            .collect();
        let removed = {
            let mut guard = self.index.write();
            let index = guard.as_mut().ok_or(IndexError::NotInitialized)?;
            index.apply_changes(Vec::new(), &keys).removed
        };
        if self.writer.try_lock().is_err() {
            self.requeued.lock().extend(keys);
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    fn read<T>(&self, query: impl FnOnce(&RepositoryIndex) -> IndexResult<T>) -> IndexResult<T> {
        let guard = self.index.read();
        let index = guard.as_ref().ok_or(IndexError::NotInitialized)?;
        query(index)
    }

    fn key(&self, path: impl AsRef<Path>) -> String {
        index_key(&self.root, path.as_ref()).unwrap_or_default()
    }

    pub fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<CodeElement>> {
        self.read(|index| {
            Ok(keyword_search(index.semantic_index.elements.values(), query, limit)
                .into_iter()
                .map(|r| r.element.clone())
                .collect())
        })
    }

    pub fn find_similar(&self, element_id: &str, limit: usize) -> IndexResult<Vec<CodeElement>> {
        self.read(|index| {
            Ok(similar_elements(&index.semantic_index, element_id, limit)?
                .into_iter()
                .map(|r| r.element.clone())
                .collect())
        })
    }

    pub fn get_element(&self, element_id: &str) -> IndexResult<CodeElement> {
        self.read(|index| {
            index
                .element(element_id)
                .cloned()
                .ok_or_else(|| IndexError::UnknownElement(element_id.to_string()))
        })
    }

    pub fn get_file_dependencies(&self, path: impl AsRef<Path>) -> IndexResult<Vec<String>> {
        let key = self.key(path);
        self.read(|index| Ok(structure::file_dependencies(index, &key)))
    }

    pub fn get_file_dependents(&self, path: impl AsRef<Path>) -> IndexResult<Vec<String>> {
        let key = self.key(path);
        self.read(|index| Ok(structure::file_dependents(index, &key)))
    }

    pub fn find_cycles(&self) -> IndexResult<Vec<DependencyCycle>> {
        self.read(|index| Ok(structure::import_cycles(index)))
    }

    pub fn get_element_relationships(&self, element_id: &str) -> IndexResult<Vec<String>> {
        self.read(|index| Ok(structure::element_relationships(index, element_id)))
    }

    pub fn get_structure(&self, prefix: &str, include_signatures: bool, max_lines: usize) -> IndexResult<String> {
        self.read(|index| {
            Ok(structure::repository_outline(
                index,
                prefix,
                include_signatures,
                max_lines,
            ))
        })
    }

    pub fn get_project_patterns(&self) -> IndexResult<Vec<ArchitecturalPattern>> {
        self.read(|index| Ok(index.architectural_patterns.clone()))
    }

    pub fn get_naming_conventions(&self) -> IndexResult<NamingConventions> {
        self.read(|index| Ok(index.naming_conventions.clone()))
    }

    pub fn get_repository_stats(&self) -> IndexResult<RepositoryStats> {
        self.read(|index| Ok(index.stats()))
    }

    /// Read-only snapshot of the whole index.
    pub fn get_repository_index(&self) -> IndexResult<RepositoryIndex> {
        self.read(|index| Ok(index.clone()))
    }
}
