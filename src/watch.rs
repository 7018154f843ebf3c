//! Filesystem watching and change coalescing.
//!
//! ```text
//! notify callback ──► mpsc ──► debounce task ──► ChangeHandler
//!  (FsEvent / Rescan)           (Debouncer)       (index, cache, broadcast)
//! ```
//!
//! The [`Debouncer`] is a plain state machine driven by explicit instants.
//! The async loop in [`run_debounce`] only feeds it and sleeps until its
//! next deadline.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify::event::{ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::ChangeKind;
use crate::store::DocumentStore;

/// A change to one managed document, as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: String,
    pub kind: ChangeKind,
}

impl FsEvent {
    pub fn new(kind: ChangeKind, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    Changed(FsEvent),
    /// A directory moved or vanished; individual file events may be missing.
    Rescan,
}

/// Receives coalesced changes from the debounce task.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_change(&self, event: FsEvent);
    /// Returns `false` when the rescan could not run and should be retried.
    async fn on_rescan(&self) -> bool;
}

/// Everything that came due at one instant.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Flush {
    pub events: Vec<FsEvent>,
    pub rescan: bool,
}

impl Flush {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && !self.rescan
    }
}

/// Trailing-edge debouncer keyed by path.
///
/// Every event re-arms its path's timer. Kinds fold with
/// [`ChangeKind::merge`], so a burst of `add, change, change` surfaces once
/// as `add`.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<String, (ChangeKind, Instant)>,
    rescan_at: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            rescan_at: None,
        }
    }

    pub fn push(&mut self, message: WatchMessage, now: Instant) {
        let deadline = now + self.window;
        match message {
            WatchMessage::Changed(event) => {
                self.pending
                    .entry(event.path)
                    .and_modify(|(kind, due)| {
                        *kind = kind.merge(event.kind);
                        *due = deadline;
                    })
                    .or_insert((event.kind, deadline));
            }
            WatchMessage::Rescan => self.rescan_at = Some(deadline),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|(_, due)| *due)
            .chain(self.rescan_at)
            .min()
    }

    /// Removes and returns everything whose quiet period has elapsed, in
    /// path order.
    pub fn take_due(&mut self, now: Instant) -> Flush {
        let mut due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| *at <= now)
            .map(|(path, _)| path.clone())
            .collect();
        due.sort();

        let events = due
            .into_iter()
            .filter_map(|path| {
                self.pending
                    .remove(&path)
                    .map(|(kind, _)| FsEvent { path, kind })
            })
            .collect();

        let rescan = matches!(self.rescan_at, Some(at) if at <= now);
        if rescan {
            self.rescan_at = None;
        }

        Flush { events, rescan }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.rescan_at.is_none()
    }
}

/// Final kind to report once the disk has been consulted.
///
/// `observed` is what the indexer saw when it re-read the path: `Unlink` if
/// the file is gone, `Add` if it was new to the index, `Change` otherwise.
/// The OS kind is not used: editors that save through a temp file and a
/// rename make every edit look like a create.
///
/// `local` is the kind recorded by a write from this process. Such writes
/// refresh the index before the watcher reports them, so `observed` alone
/// would call a new file a change.
pub fn settle(observed: ChangeKind, local: Option<ChangeKind>) -> ChangeKind {
    match (observed, local) {
        (ChangeKind::Unlink, _) => ChangeKind::Unlink,
        (_, Some(ChangeKind::Add)) => ChangeKind::Add,
        (_, Some(_)) => ChangeKind::Change,
        (observed, None) => observed,
    }
}

// ============ OS watcher ============

/// Starts a recursive watcher on the store root. Events are translated and
/// sent to `tx`; the watcher stops when the returned handle is dropped.
pub fn start_watcher(
    store: DocumentStore,
    tx: mpsc::UnboundedSender<WatchMessage>,
) -> notify::Result<RecommendedWatcher> {
    let root = store.sandbox().root().to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for message in translate(&store, &event) {
                let _ = tx.send(message);
            }
        }
        Err(e) => tracing::warn!("watcher error: {}", e),
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!(root = %root.display(), "watching workspace");
    Ok(watcher)
}

/// Maps a raw notify event onto workspace messages.
pub fn translate(store: &DocumentStore, event: &Event) -> Vec<WatchMessage> {
    let kinds: Vec<(ChangeKind, &Path)> = match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|p| (ChangeKind::Add, p.as_path()))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| (ChangeKind::Unlink, p.as_path()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::Both, [from, to]) => {
                vec![(ChangeKind::Unlink, from.as_path()), (ChangeKind::Add, to.as_path())]
            }
            (RenameMode::From, paths) => {
                paths.iter().map(|p| (ChangeKind::Unlink, p.as_path())).collect()
            }
            (RenameMode::To, paths) => paths.iter().map(|p| (ChangeKind::Add, p.as_path())).collect(),
            // Unknown direction: let the flush look at the disk.
            (_, paths) => paths.iter().map(|p| (ChangeKind::Change, p.as_path())).collect(),
        },
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => Vec::new(),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => event
            .paths
            .iter()
            .map(|p| (ChangeKind::Change, p.as_path()))
            .collect(),
    };

    let mut messages = Vec::new();
    let mut rescan = false;
    for (kind, path) in kinds {
        match store.sandbox().relativize(path) {
            Some(rel) if store.manages(&rel) => {
                messages.push(WatchMessage::Changed(FsEvent::new(kind, rel)))
            }
            Some(_) => {}
            None => rescan |= touches_directory(store, &event.kind, path),
        }
    }
    if rescan {
        messages.push(WatchMessage::Rescan);
    }
    messages
}

/// Whether a non-document path looks like a directory that moved or vanished.
fn touches_directory(store: &DocumentStore, kind: &EventKind, path: &Path) -> bool {
    let structural = matches!(
        kind,
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(RemoveKind::Folder)
    );
    let visible = path
        .strip_prefix(store.sandbox().root())
        .map(|rel| {
            !rel.as_os_str().is_empty()
                && !rel
                    .components()
                    .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        })
        .unwrap_or(false);
    structural && visible && path.extension().is_none()
}

// ============ Debounce task ============

/// Runs until `shutdown` fires or the sender side closes. Pending changes
/// are dropped on shutdown.
pub async fn run_debounce(
    mut rx: mpsc::UnboundedReceiver<WatchMessage>,
    window: Duration,
    handler: Arc<dyn ChangeHandler>,
    shutdown: CancellationToken,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        let deadline = debouncer.next_deadline();
        tokio::select! {
            _ = shutdown.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => debouncer.push(message, Instant::now()),
                None => break,
            },
            _ = sleep_until(deadline) => {
                let flush = debouncer.take_due(Instant::now());
                if flush.rescan && !handler.on_rescan().await {
                    tracing::debug!("rescan deferred");
                    debouncer.push(WatchMessage::Rescan, Instant::now());
                }
                for event in flush.events {
                    handler.on_change(event).await;
                }
            }
        }
    }

    tracing::debug!("debounce loop stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending::<()>().await,
    }
}
