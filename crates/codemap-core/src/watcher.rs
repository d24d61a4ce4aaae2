//! File-system watcher feeding debounced incremental updates.
//!
//! Notify events are translated into [`FileEvent`]s on the notify thread and
//! handed to a tokio task over an unbounded channel. Deletions are applied
//! immediately; creations and modifications are collected until the
//! debounce window passes with no further events, then flushed as a single
//! update.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{IndexError, IndexResult};
use crate::indexer::incremental::{index_key, ChangeKind, DebounceQueue, EngineState, FileEvent};
use crate::service::RepositoryService;

pub struct RepositoryWatcher {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl RepositoryWatcher {
    /// Watch the service's root recursively.
    pub fn start(service: Arc<RepositoryService>) -> IndexResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => forward(event, &tx),
            Err(err) => warn!("watch error: {err}"),
        })?;
        watcher.watch(service.root(), RecursiveMode::Recursive)?;
        info!("watching {}", service.root().display());
        let mut this = Self::from_events(service, rx);
        this._watcher = Some(watcher);
        Ok(this)
    }

    /// Drive the debounce loop from an arbitrary event source.
    pub fn from_events(service: Arc<RepositoryService>, rx: UnboundedReceiver<FileEvent>) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(service, rx, cancel.clone()));
        Self {
            cancel,
            task,
            _watcher: None,
        }
    }

    /// Stop watching. Pending paths that have not been flushed are dropped.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!("watcher task ended abnormally: {err}");
        }
    }
}

fn forward(event: Event, tx: &UnboundedSender<FileEvent>) {
    let kind = match event.kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        // A rename reports both ends; whichever side still exists is live.
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => return,
    };
    for path in event.paths {
        let kind = kind.unwrap_or(if path.exists() {
            ChangeKind::Created
        } else {
            ChangeKind::Deleted
        });
        if tx.send(FileEvent::new(path, kind)).is_err() {
            return;
        }
    }
}

fn watched_key(service: &RepositoryService, path: &Path) -> Option<String> {
    let key = index_key(service.root(), path)?;
    let absolute = service.root().join(&key);
    let filter = service.filter();
    (filter.has_eligible_extension(&absolute) && !filter.is_ignored(&absolute)).then_some(key)
}

fn handle_event(service: &RepositoryService, queue: &mut DebounceQueue, event: FileEvent) {
    let Some(key) = watched_key(service, &event.path) else {
        return;
    };
    match event.kind {
        ChangeKind::Deleted => {
            queue.remove(&key);
            match service.remove_paths([key.as_str()]) {
                Ok(removed) if !removed.is_empty() => debug!("removed {key}"),
                Ok(_) => {}
                Err(IndexError::NotInitialized) => {}
                Err(err) => warn!("failed to remove {key}: {err}"),
            }
        }
        ChangeKind::Created | ChangeKind::Modified => queue.push(key, Instant::now()),
    }
    service.set_state(if queue.is_empty() {
        EngineState::Idle
    } else {
        EngineState::Queuing
    });
}

async fn flush(service: &RepositoryService, queue: &mut DebounceQueue) {
    let paths = queue.take();
    if paths.is_empty() {
        return;
    }
    service.set_state(EngineState::DebouncedFlush);
    match service.update_index(paths).await {
        Ok(report) => debug!(
            "flushed: {} updated, {} removed, {} unchanged, {} requeued",
            report.updated.len(),
            report.removed.len(),
            report.unchanged.len(),
            report.requeued.len()
        ),
        Err(err) => warn!("incremental update failed: {err}"),
    }
    service.set_state(EngineState::Idle);
}

async fn run(
    service: Arc<RepositoryService>,
    mut rx: UnboundedReceiver<FileEvent>,
    cancel: CancellationToken,
) {
    let mut queue = DebounceQueue::new(Duration::from_millis(service.config().debounce_ms));
    loop {
        let deadline = queue.deadline();
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                let Some(event) = maybe else {
                    flush(&service, &mut queue).await;
                    break;
                };
                handle_event(&service, &mut queue, event);
            }
            _ = async {
                if let Some(deadline) = deadline {
                    tokio::time::sleep_until(deadline.into()).await;
                }
            }, if deadline.is_some() => {
                if queue.is_due(Instant::now()) {
                    flush(&service, &mut queue).await;
                }
            }
        }
    }
    service.set_state(EngineState::Idle);
}
