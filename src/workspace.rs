//! The workspace service.
//!
//! [`Workspace`] owns every component and is the only thing the HTTP layer
//! and the CLI talk to. It is constructed explicitly from a [`Config`]; there
//! is no global state. [`Workspace::start`] crawls the corpus and starts the
//! watcher, [`Workspace::stop`] tears the watcher down again.
//!
//! Change flow for a document edited anywhere:
//!
//! ```text
//! disk ─► watcher ─► debounce ─► on_change ─┬─► indexer.refresh
//!                                           ├─► semantic.invalidate
//!                                           └─► broadcast file-change
//! ```
//!
//! Writes through [`Workspace::write`] refresh the index immediately so a
//! search issued right after a save sees the new content. The kind of such a
//! write is remembered until the watcher reports it, since by then the index
//! can no longer tell a new file from an edited one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use notify::RecommendedWatcher;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcast::EventBroadcaster;
use crate::concurrency::{ConcurrencyController, WriteOutcome};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Result, WorkspaceError};
use crate::extract;
use crate::index::{CrawlReport, IndexStats, Indexer};
use crate::models::{
    Backlink, ChangeFrame, ChangeKind, Document, SearchResults, SemanticHit, TagCount,
    TaggedFile, TreeNode, Version, WikilinkResolution,
};
use crate::sandbox::PathSandbox;
use crate::semantic::{BackfillReport, EmbeddingStats, SemanticCache};
use crate::settings::{SettingsStore, SettingsUpdate, SettingsView};
use crate::store::DocumentStore;
use crate::watch::{self, ChangeHandler, FsEvent};
use crate::{db, migrate};

pub const DEFAULT_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStats {
    pub index: IndexStats,
    pub embeddings: EmbeddingStats,
    pub clients: usize,
}

struct Running {
    shutdown: CancellationToken,
    _watcher: Option<RecommendedWatcher>,
    debounce: Option<JoinHandle<()>>,
}

pub struct Workspace {
    config: Config,
    store: DocumentStore,
    indexer: Indexer,
    writes: ConcurrencyController,
    semantic: Arc<SemanticCache>,
    settings: SettingsStore,
    events: EventBroadcaster,
    /// Kinds of local writes the watcher has not reported yet.
    local_writes: DashMap<String, ChangeKind>,
    running: Mutex<Option<Running>>,
}

impl Workspace {
    /// Opens a workspace with the provider described by its settings.
    pub async fn open(config: Config) -> anyhow::Result<Arc<Self>> {
        Self::build(config, None).await
    }

    /// Opens a workspace with an explicit provider, enabled regardless of
    /// settings. Used by tests and embedders of the library.
    pub async fn open_with_provider(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> anyhow::Result<Arc<Self>> {
        Self::build(config, Some(provider)).await
    }

    async fn build(
        config: Config,
        provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> anyhow::Result<Arc<Self>> {
        use anyhow::Context;

        std::fs::create_dir_all(&config.workspace.root).with_context(|| {
            format!(
                "Failed to create workspace root: {}",
                config.workspace.root.display()
            )
        })?;
        let root = config.workspace.root.canonicalize()?;

        let sandbox = PathSandbox::new(root, config.workspace.extension.clone());
        let store = DocumentStore::new(sandbox, &config.workspace.exclude_globs)?;
        let indexer = Indexer::new(store.clone(), config.index.clone());
        let writes = ConcurrencyController::new(store.clone());

        let pool = db::connect(&config.db.path).await?;
        migrate::run_migrations(&pool).await?;

        let settings = SettingsStore::load(&config.data_dir(), config.embedding.clone())?;
        let (provider, enabled) = match provider {
            Some(provider) => (provider, true),
            None => {
                let current = settings.current();
                (embedding::create_provider(&current)?, current.is_enabled())
            }
        };
        let semantic = Arc::new(SemanticCache::new(pool, provider, enabled));

        tracing::info!(
            root = %store.sandbox().root().display(),
            semantic = enabled,
            "workspace opened"
        );

        Ok(Arc::new(Self {
            config,
            store,
            indexer,
            writes,
            semantic,
            settings,
            events: EventBroadcaster::new(),
            local_writes: DashMap::new(),
            running: Mutex::new(None),
        }))
    }

    /// Starts the watcher, then crawls the corpus. Idempotent.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.running_guard().is_some() {
            return Ok(());
        }

        let shutdown = CancellationToken::new();
        let (watcher, debounce) = if self.config.watch.enabled {
            let (tx, rx) = mpsc::unbounded_channel();
            let watcher = watch::start_watcher(self.store.clone(), tx)?;
            let handler: Arc<dyn ChangeHandler> = self.clone();
            let debounce = tokio::spawn(watch::run_debounce(
                rx,
                Duration::from_millis(self.config.watch.debounce_ms),
                handler,
                shutdown.clone(),
            ));
            (Some(watcher), Some(debounce))
        } else {
            (None, None)
        };

        *self.running_guard() = Some(Running {
            shutdown,
            _watcher: watcher,
            debounce,
        });

        self.indexer.crawl().await?;

        if self.semantic.is_enabled() {
            let ws = self.clone();
            tokio::spawn(async move {
                match ws.backfill(None).await {
                    Ok(report) => tracing::info!(
                        embedded = report.embedded,
                        failed = report.failed,
                        "startup embedding backfill complete"
                    ),
                    Err(e) => tracing::warn!("startup embedding backfill failed: {}", e),
                }
            });
        }
        Ok(())
    }

    /// Stops the watcher and waits for the debounce task to finish.
    pub async fn stop(&self) {
        let running = self.running_guard().take();
        if let Some(running) = running {
            running.shutdown.cancel();
            if let Some(handle) = running.debounce {
                let _ = handle.await;
            }
            tracing::info!("workspace stopped");
        }
    }

    fn running_guard(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_watching(&self) -> bool {
        self.running_guard()
            .as_ref()
            .is_some_and(|r| r.debounce.is_some())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    // ============ Documents ============

    pub async fn read(&self, path: &str) -> Result<Document> {
        self.store.read(path).await
    }

    pub async fn write(
        &self,
        path: &str,
        content: &str,
        expected: Option<Version>,
    ) -> Result<WriteOutcome> {
        let existed = self
            .canonical(path)
            .is_ok_and(|rel| self.indexer.contains(&rel));
        let outcome = self.writes.write(path, content, expected).await?;
        if let WriteOutcome::Committed { .. } = outcome {
            let kind = if existed {
                ChangeKind::Change
            } else {
                ChangeKind::Add
            };
            self.apply_local_change(path, kind).await;
        }
        Ok(outcome)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.store.delete(path).await?;
        self.apply_local_change(path, ChangeKind::Unlink).await;
        Ok(())
    }

    pub async fn tree(&self) -> Result<Vec<TreeNode>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.tree())
            .await
            .map_err(|e| WorkspaceError::Io(std::io::Error::other(e)))
    }

    /// Brings derived state up to date after a write or delete made by this
    /// process. Clients are notified here only when no watcher will.
    async fn apply_local_change(&self, path: &str, kind: ChangeKind) {
        let rel = self.canonical(path).unwrap_or_else(|_| path.to_string());
        if self.is_watching() {
            self.local_writes
                .entry(rel.clone())
                .and_modify(|pending| *pending = pending.merge(kind))
                .or_insert(kind);
        }
        match self.refresh_derived(&rel).await {
            Some(observed) if !self.is_watching() => {
                self.events.broadcast(ChangeFrame::file_change(observed, rel));
            }
            _ => {}
        }
    }

    /// Re-reads one path into the index and updates the embedding cache.
    /// Returns what the indexer observed on disk.
    async fn refresh_derived(&self, path: &str) -> Option<ChangeKind> {
        let observed = match self.indexer.refresh(path).await {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(path, "failed to refresh index entry: {}", e);
                return None;
            }
        };

        let cache_result = if observed == ChangeKind::Unlink {
            self.semantic.remove(path).await
        } else {
            self.semantic.invalidate(path).await
        };
        if let Err(e) = cache_result {
            tracing::warn!(path, "failed to update embedding cache: {}", e);
        }

        if observed != ChangeKind::Unlink && self.semantic.is_enabled() {
            self.spawn_embed(path.to_string());
        }
        Some(observed)
    }

    fn spawn_embed(&self, path: String) {
        let store = self.store.clone();
        let semantic = self.semantic.clone();
        tokio::spawn(async move {
            let result = match store.read(&path).await {
                Ok(doc) => semantic.ensure(&path, &doc.content).await.map(|_| ()),
                Err(WorkspaceError::NotFound(_)) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::warn!(path = path.as_str(), "background embedding failed: {}", e);
            }
        });
    }

    /// Normalized workspace-relative form of a client path.
    fn canonical(&self, path: &str) -> Result<String> {
        let abs = self.store.sandbox().resolve(path)?;
        self.store
            .sandbox()
            .relativize(&abs)
            .ok_or_else(|| WorkspaceError::InvalidPath(path.to_string()))
    }

    // ============ Search ============

    pub fn search_literal(&self, query: &str) -> SearchResults {
        SearchResults::Literal(self.indexer.search(query))
    }

    pub fn search_bm25(&self, query: &str) -> SearchResults {
        SearchResults::Ranked(self.indexer.rank(query))
    }

    pub async fn search_vector(&self, query: &str, top_k: Option<usize>) -> Result<SearchResults> {
        if !self.semantic.is_enabled() {
            return Err(WorkspaceError::EmbeddingsDisabled);
        }
        if query.trim().is_empty() {
            return Ok(SearchResults::Semantic(Vec::new()));
        }

        let top_k = top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);
        let fingerprints = self.indexer.fingerprints();
        let scored = self.semantic.query(query, top_k, &fingerprints).await?;

        let hits = scored
            .into_iter()
            .map(|(path, score)| SemanticHit {
                snippet: self
                    .indexer
                    .preview(&path)
                    .map(|p| extract::truncate_chars(&p, extract::SNIPPET_CHARS))
                    .unwrap_or_default(),
                path,
                score,
            })
            .collect();
        Ok(SearchResults::Semantic(hits))
    }

    // ============ Embeddings ============

    /// Embedding for the current content of `path`.
    pub async fn ensure_embedding(&self, path: &str) -> Result<Vec<f32>> {
        let rel = self.canonical(path)?;
        let doc = self.store.read(&rel).await?;
        self.semantic.ensure(&rel, &doc.content).await
    }

    pub async fn invalidate_embedding(&self, path: &str) -> Result<()> {
        let rel = self.canonical(path)?;
        self.semantic.invalidate(&rel).await
    }

    /// Paths that would be embedded by [`backfill`](Self::backfill).
    pub async fn pending_embeddings(&self) -> Result<Vec<String>> {
        self.semantic.pending(&self.indexer.fingerprints()).await
    }

    /// Embeds up to `limit` documents lacking a valid record. Individual
    /// failures are logged and counted, never fatal.
    pub async fn backfill(&self, limit: Option<usize>) -> Result<BackfillReport> {
        if !self.semantic.is_enabled() {
            return Err(WorkspaceError::EmbeddingsDisabled);
        }

        let pending = self.pending_embeddings().await?;
        let take = limit.unwrap_or(pending.len()).min(pending.len());
        let mut report = BackfillReport {
            skipped: pending.len() - take,
            ..Default::default()
        };

        for path in pending.into_iter().take(take) {
            let result = match self.store.read(&path).await {
                Ok(doc) => self.semantic.ensure(&path, &doc.content).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.embedded += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = path.as_str(), "embedding failed: {}", e);
                }
            }
        }

        tracing::info!(
            embedded = report.embedded,
            failed = report.failed,
            skipped = report.skipped,
            "embedding backfill finished"
        );
        Ok(report)
    }

    // ============ Tags and links ============

    pub fn tags(&self) -> Vec<TagCount> {
        self.indexer.tags()
    }

    pub fn files_for_tag(&self, tag: &str) -> Vec<TaggedFile> {
        self.indexer.files_for_tag(tag)
    }

    pub fn backlinks(&self, path: &str) -> Result<Vec<Backlink>> {
        let rel = self.canonical(path)?;
        Ok(self.indexer.backlinks(&rel))
    }

    pub fn resolve_wikilink(&self, link: &str) -> WikilinkResolution {
        self.indexer.resolve_wikilink(link)
    }

    // ============ Maintenance ============

    pub async fn reindex(&self) -> Result<CrawlReport> {
        self.indexer.crawl().await
    }

    pub async fn stats(&self) -> Result<WorkspaceStats> {
        let embeddings = self.semantic.stats(&self.indexer.fingerprints()).await?;
        Ok(WorkspaceStats {
            index: self.indexer.stats(),
            embeddings,
            clients: self.events.client_count(),
        })
    }

    // ============ Settings ============

    pub fn settings(&self) -> SettingsView {
        self.settings.view()
    }

    /// Applies a settings change and swaps the embedding provider to match.
    pub fn update_settings(&self, update: SettingsUpdate) -> anyhow::Result<SettingsView> {
        let next = self.settings.update(update)?;
        let provider = embedding::create_provider(&next)?;
        self.semantic.set_provider(provider, next.is_enabled());
        Ok(self.settings.view())
    }

    // ============ Realtime ============

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }
}

#[async_trait]
impl ChangeHandler for Workspace {
    async fn on_change(&self, event: FsEvent) {
        let local = self.local_writes.remove(&event.path).map(|(_, kind)| kind);
        if let Some(observed) = self.refresh_derived(&event.path).await {
            let kind = watch::settle(observed, local);
            self.events.broadcast(ChangeFrame::file_change(kind, event.path));
        }
    }

    /// Full recrawl, then one notification per path that appeared or vanished.
    /// Declines while another crawl holds the index.
    async fn on_rescan(&self) -> bool {
        let before: HashSet<String> = self.indexer.fingerprints().into_keys().collect();
        match self.indexer.crawl().await {
            Ok(_) => {}
            Err(WorkspaceError::IndexUnavailable) => return false,
            Err(e) => {
                tracing::warn!("rescan failed: {}", e);
                return true;
            }
        }
        let after: HashMap<String, String> = self.indexer.fingerprints();

        let mut added: Vec<&String> = after.keys().filter(|p| !before.contains(*p)).collect();
        let mut removed: Vec<&String> = before.iter().filter(|p| !after.contains_key(*p)).collect();
        added.sort();
        removed.sort();

        for path in removed {
            if let Err(e) = self.semantic.remove(path).await {
                tracing::warn!(path = path.as_str(), "failed to drop embedding: {}", e);
            }
            self.events
                .broadcast(ChangeFrame::file_change(ChangeKind::Unlink, path.clone()));
        }
        for path in added {
            self.events
                .broadcast(ChangeFrame::file_change(ChangeKind::Add, path.clone()));
        }
        true
    }
}
