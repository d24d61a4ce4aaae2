//! Full-build orchestration: discovery, batched async reads and Rayon-based
//! parallel analysis.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::IndexConfig;
use crate::errors::{IndexError, IndexResult};
use crate::indexer::analyzer::{analyze_source, read_source, SourceFile};
use crate::indexer::extract::ExtractorRegistry;
use crate::indexer::filesystem::RepositoryFilter;
use crate::models::{BuildPhase, BuildProgress, FileAnalysis};

/// Result of scanning the repository for a full build.
#[derive(Debug, Default)]
pub struct FullScan {
    /// Files that were (re-)analyzed.
    pub fresh: Vec<FileAnalysis>,
    /// Files whose content hash matched the previous index.
    pub reused: Vec<String>,
    /// Files dropped because they could not be read.
    pub failed: usize,
    pub elapsed_ms: u128,
}

pub type ProgressSender = Arc<watch::Sender<BuildProgress>>;

fn publish(progress: &ProgressSender, phase: BuildPhase) {
    progress.send_modify(|p| p.phase = phase);
}

fn build_pool(workers: usize) -> Option<rayon::ThreadPool> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(err) => {
            warn!("falling back to sequential analysis: {err}");
            None
        }
    }
}

/// Analyze one batch on the worker pool. Files not yet started when the
/// token fires are skipped.
fn analyze_batch(
    pool: Option<&rayon::ThreadPool>,
    sources: &[SourceFile],
    registry: &ExtractorRegistry,
    progress: &ProgressSender,
    cancel: &CancellationToken,
) -> Vec<FileAnalysis> {
    let work = |source: &SourceFile| {
        if cancel.is_cancelled() {
            return None;
        }
        let analysis = analyze_source(source, registry);
        progress.send_modify(|p| p.processed += 1);
        Some(analysis)
    };
    match pool {
        Some(pool) => pool.install(|| sources.par_iter().filter_map(work).collect()),
        None => sources.iter().filter_map(work).collect(),
    }
}

/// Discover and analyze every file `filter` accepts.
///
/// Files whose content hash equals the one in `known` are reported as
/// reused instead of re-analyzed. Progress is published after each file;
/// cancellation is honoured between files and leaves no partial result.
pub async fn scan_repository(
    filter: &RepositoryFilter,
    config: &IndexConfig,
    registry: Arc<ExtractorRegistry>,
    known: &BTreeMap<String, String>,
    progress: &ProgressSender,
    cancel: &CancellationToken,
) -> IndexResult<FullScan> {
    let started = Instant::now();
    progress.send_replace(BuildProgress {
        phase: BuildPhase::Discovering,
        processed: 0,
        total: 0,
    });

    let root = filter.root();
    let discovering = filter.clone();
    let files: Vec<PathBuf> = tokio::task::spawn_blocking(move || discovering.discover())
        .await
        .map_err(|e| IndexError::Config(format!("discovery task failed: {e}")))?;
    progress.send_modify(|p| {
        p.phase = BuildPhase::Analyzing;
        p.total = files.len();
    });
    info!("discovered {} files under {}", files.len(), root.display());

    let pool = build_pool(config.workers).map(Arc::new);
    let mut scan = FullScan::default();
    for batch in files.chunks(config.batch_size.max(1)) {
        let mut sources = Vec::with_capacity(batch.len());
        for path in batch {
            if cancel.is_cancelled() {
                publish(progress, BuildPhase::Cancelled);
                return Err(IndexError::Cancelled);
            }
            match read_source(root, path).await {
                Ok(source) if known.get(&source.relative_path) == Some(&source.content_hash) => {
                    scan.reused.push(source.relative_path);
                    progress.send_modify(|p| p.processed += 1);
                }
                Ok(source) => sources.push(source),
                Err(err) => {
                    warn!("skipping file: {err}");
                    scan.failed += 1;
                    progress.send_modify(|p| p.processed += 1);
                }
            }
        }
        if sources.is_empty() {
            continue;
        }

        let pool = pool.clone();
        let registry = Arc::clone(&registry);
        let progress_tx = Arc::clone(progress);
        let token = cancel.clone();
        let analyses = tokio::task::spawn_blocking(move || {
            analyze_batch(pool.as_deref(), &sources, &registry, &progress_tx, &token)
        })
        .await
        .map_err(|e| IndexError::Config(format!("analysis task failed: {e}")))?;
        if cancel.is_cancelled() {
            publish(progress, BuildPhase::Cancelled);
            return Err(IndexError::Cancelled);
        }
        scan.fresh.extend(analyses);
    }

    publish(progress, BuildPhase::Linking);
    scan.elapsed_ms = started.elapsed().as_millis();
    info!(
        "scanned {} files in {} ms ({} analyzed, {} reused, {} failed)",
        files.len(),
        scan.elapsed_ms,
        scan.fresh.len(),
        scan.reused.len(),
        scan.failed
    );
    Ok(scan)
}
