//! Corpus indexer: lexical, tag, and wikilink structures over the workspace.
//!
//! Everything here is derived from the [`DocumentStore`] and can be thrown
//! away and rebuilt with [`Indexer::crawl`] at any time.
//!
//! # Retrieval modes
//!
//! | Mode | Entry point | Ordering |
//! |------|-------------|----------|
//! | Literal substring | [`Indexer::search`] | newest document first |
//! | BM25 | [`Indexer::rank`] | score desc, path asc |
//!
//! # BM25
//!
//! ```text
//! idf(t)     = ln(1 + (N - df + 0.5) / (df + 0.5))
//! score(d,q) = Σ idf(t) · tf·(k1+1) / (tf + k1·(1 - b + b·|d|/avgdl))
//! ```
//!
//! with `k1 = 1.2` and `b = 0.75`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::Serialize;

use crate::config::IndexConfig;
use crate::error::{Result, WorkspaceError};
use crate::extract::{self, OutboundLink};
use crate::models::{
    Backlink, ChangeKind, LineMatch, LiteralHit, RankedHit, TagCount, TaggedFile, Version,
    WikilinkResolution,
};
use crate::store::DocumentStore;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

/// Derived view of a single document.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub path: String,
    pub version: Version,
    pub fingerprint: String,
    pub title: String,
    pub preview: String,
    pub tags: Vec<String>,
    pub links: Vec<OutboundLink>,
    /// Upsert order within the owning index.
    seq: u64,
    lines: Vec<String>,
    lines_lower: Vec<String>,
    term_freqs: HashMap<String, u32>,
    doc_len: usize,
}

impl IndexEntry {
    pub fn build(path: &str, content: &str, version: Version, max_tags: usize) -> Self {
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        let tokens = extract::tokenize(content);
        let doc_len = tokens.len();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }

        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let lines_lower = lines.iter().map(|l| l.to_lowercase()).collect();

        Self {
            path: path.to_string(),
            version,
            fingerprint: extract::fingerprint(content),
            title: extract::title(content, path),
            preview: extract::preview(content),
            tags: extract::extract_tags(content, max_tags),
            links: extract::extract_links(content),
            seq: 0,
            lines,
            lines_lower,
            term_freqs,
            doc_len,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub terms: usize,
    pub tags: usize,
    pub links: usize,
    pub ready: bool,
}

/// In-memory index structures. Not synchronized; see [`Indexer`].
#[derive(Debug, Default)]
pub struct CorpusIndex {
    extension: String,
    entries: BTreeMap<String, IndexEntry>,
    postings: HashMap<String, HashSet<String>>,
    total_len: usize,
    tag_index: HashMap<String, BTreeSet<String>>,
    by_lower_path: HashMap<String, BTreeSet<String>>,
    by_stem: HashMap<String, BTreeSet<String>>,
    next_seq: u64,
}

impl CorpusIndex {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.to_lowercase(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Sequence number the next upsert will receive.
    pub fn mark(&self) -> u64 {
        self.next_seq
    }

    /// Inserts or replaces an entry, returning the previous one.
    pub fn upsert(&mut self, mut entry: IndexEntry) -> Option<IndexEntry> {
        let previous = self.remove(&entry.path);
        entry.seq = self.next_seq;
        self.next_seq += 1;

        for term in entry.term_freqs.keys() {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(entry.path.clone());
        }
        self.total_len += entry.doc_len;
        for tag in &entry.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(entry.path.clone());
        }
        self.by_lower_path
            .entry(entry.path.to_lowercase())
            .or_default()
            .insert(entry.path.clone());
        self.by_stem
            .entry(self.stem_key(&entry.path))
            .or_default()
            .insert(entry.path.clone());

        self.entries.insert(entry.path.clone(), entry);
        previous
    }

    /// Drops a path from every structure.
    pub fn remove(&mut self, path: &str) -> Option<IndexEntry> {
        let entry = self.entries.remove(path)?;

        for term in entry.term_freqs.keys() {
            if let Some(docs) = self.postings.get_mut(term) {
                docs.remove(path);
                if docs.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_len -= entry.doc_len;
        for tag in &entry.tags {
            if let Some(docs) = self.tag_index.get_mut(tag) {
                docs.remove(path);
                if docs.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        let lower = path.to_lowercase();
        if let Some(paths) = self.by_lower_path.get_mut(&lower) {
            paths.remove(path);
            if paths.is_empty() {
                self.by_lower_path.remove(&lower);
            }
        }
        let stem = self.stem_key(path);
        if let Some(paths) = self.by_stem.get_mut(&stem) {
            paths.remove(path);
            if paths.is_empty() {
                self.by_stem.remove(&stem);
            }
        }

        Some(entry)
    }

    /// Removes entries that are not in `live` and were last written before
    /// `mark`. Returns how many went.
    pub fn retain_since(&mut self, live: &HashSet<&String>, mark: u64) -> usize {
        let gone: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.seq < mark && !live.contains(&e.path))
            .map(|e| e.path.clone())
            .collect();
        for path in &gone {
            self.remove(path);
        }
        gone.len()
    }

    // ============ Literal search ============

    /// Case-insensitive substring search, newest documents first.
    pub fn literal_search(
        &self,
        query: &str,
        max_per_file: usize,
        max_files: usize,
        min_query_len: usize,
    ) -> Vec<LiteralHit> {
        let needle = query.trim().to_lowercase();
        if needle.chars().count() < min_query_len.max(1) {
            return Vec::new();
        }

        let mut by_recency: Vec<&IndexEntry> = self.entries.values().collect();
        by_recency.sort_by(|a, b| b.version.cmp(&a.version).then(a.path.cmp(&b.path)));

        let mut hits = Vec::new();
        for entry in by_recency {
            if hits.len() >= max_files {
                break;
            }
            let matches: Vec<LineMatch> = entry
                .lines_lower
                .iter()
                .enumerate()
                .filter(|(_, line)| line.contains(&needle))
                .take(max_per_file)
                .map(|(idx, _)| LineMatch {
                    line: idx + 1,
                    text: entry.lines[idx].clone(),
                })
                .collect();
            if !matches.is_empty() {
                hits.push(LiteralHit {
                    path: entry.path.clone(),
                    matches,
                });
            }
        }
        hits
    }

    // ============ BM25 ============

    pub fn rank(&self, query: &str) -> Vec<RankedHit> {
        let n = self.entries.len();
        if n == 0 {
            return Vec::new();
        }
        let avg_doc_len = (self.total_len as f64 / n as f64).max(1.0);

        let mut query_terms = extract::tokenize(query);
        query_terms.sort();
        query_terms.dedup();

        let mut scores: HashMap<&str, f64> = HashMap::new();
        for term in &query_terms {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };
            let df = docs.len() as f64;
            let idf = (1.0 + (n as f64 - df + 0.5) / (df + 0.5)).ln();

            for path in docs {
                let Some(entry) = self.entries.get(path) else {
                    continue;
                };
                let tf = *entry.term_freqs.get(term).unwrap_or(&0) as f64;
                let length_norm = 1.0 - BM25_B + BM25_B * entry.doc_len as f64 / avg_doc_len;
                let term_score = idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * length_norm);
                *scores.entry(entry.path.as_str()).or_insert(0.0) += term_score;
            }
        }

        let mut hits: Vec<RankedHit> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(path, score)| RankedHit {
                path: path.to_string(),
                score,
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.path.cmp(&b.path)));
        hits
    }

    // ============ Tags ============

    pub fn tags(&self) -> Vec<TagCount> {
        let mut tags: Vec<TagCount> = self
            .tag_index
            .iter()
            .map(|(name, paths)| TagCount {
                name: name.clone(),
                count: paths.len(),
            })
            .collect();
        tags.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));
        tags
    }

    pub fn files_for_tag(&self, tag: &str) -> Vec<TaggedFile> {
        let key = tag.trim().trim_start_matches('#').to_lowercase();
        self.tag_index
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|path| self.entries.get(path))
            .map(|entry| TaggedFile {
                path: entry.path.clone(),
                title: entry.title.clone(),
                preview: entry.preview.clone(),
                tags: entry.tags.clone(),
            })
            .collect()
    }

    // ============ Wikilinks ============

    /// Resolves a raw wikilink target against known paths.
    ///
    /// Case-insensitive; an exact path (with or without extension) wins over
    /// a filename-only match, and among paths differing only in case the one
    /// spelled like the link wins. Never fails: unknown targets are `None`.
    pub fn resolve_link(&self, link: &str) -> Option<&str> {
        let cleaned = link.trim().replace('\\', "/");
        let cleaned = cleaned.trim_start_matches("./").trim_start_matches('/');
        if cleaned.is_empty() {
            return None;
        }

        let with_ext = format!("{}.{}", cleaned, self.extension);
        for candidate in [cleaned, with_ext.as_str()] {
            if let Some((path, _)) = self.entries.get_key_value(candidate) {
                return Some(path.as_str());
            }
        }

        let normalized = cleaned.to_lowercase();
        for candidate in [normalized.clone(), with_ext.to_lowercase()] {
            if let Some(path) = self.by_lower_path.get(&candidate).and_then(|p| p.iter().next()) {
                return Some(path.as_str());
            }
        }

        let stem = self.stem_key(&normalized);
        self.by_stem
            .get(&stem)
            .and_then(|paths| paths.iter().next())
            .map(String::as_str)
    }

    pub fn resolve_wikilink(&self, link: &str) -> WikilinkResolution {
        let path = self.resolve_link(link).map(str::to_string);
        WikilinkResolution {
            found: path.is_some(),
            path,
        }
    }

    /// Every link in the corpus that resolves to `target`, excluding self-links.
    pub fn backlinks(&self, target: &str) -> Vec<Backlink> {
        let mut out = Vec::new();
        for entry in self.entries.values() {
            if entry.path == target {
                continue;
            }
            for link in &entry.links {
                if self.resolve_link(&link.target) == Some(target) {
                    out.push(Backlink {
                        path: entry.path.clone(),
                        line: link.line,
                        context: link.context.clone(),
                    });
                }
            }
        }
        out
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.entries.len(),
            terms: self.postings.len(),
            tags: self.tag_index.len(),
            links: self.entries.values().map(|e| e.links.len()).sum(),
            ready: true,
        }
    }

    /// Lower-cased file name without the managed extension.
    fn stem_key(&self, path: &str) -> String {
        let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
        let suffix = format!(".{}", self.extension);
        match name.strip_suffix(&suffix) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => name,
        }
    }
}

/// Thread-safe indexer bound to a document store.
///
/// Queries take a read lock and never wait on I/O. Refreshes are serialized
/// so that the entry for a path always comes from the most recent read.
pub struct Indexer {
    store: DocumentStore,
    config: IndexConfig,
    index: RwLock<CorpusIndex>,
    refresh_lock: tokio::sync::Mutex<()>,
    crawling: AtomicBool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub indexed: usize,
    pub failed: usize,
    pub removed: usize,
}

impl Indexer {
    pub fn new(store: DocumentStore, config: IndexConfig) -> Self {
        let index = CorpusIndex::new(store.sandbox().extension());
        Self {
            store,
            config,
            index: RwLock::new(index),
            refresh_lock: tokio::sync::Mutex::new(()),
            crawling: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.crawling.load(Ordering::SeqCst)
    }

    /// Full crawl. Entries appear one by one, so queries during a crawl see
    /// partial results rather than blocking.
    pub async fn crawl(&self) -> Result<CrawlReport> {
        if self.crawling.swap(true, Ordering::SeqCst) {
            return Err(WorkspaceError::IndexUnavailable);
        }

        let started = std::time::Instant::now();
        let mark = self.read_index().mark();
        let paths = self.store.list();
        let mut report = CrawlReport::default();

        for path in &paths {
            match self.refresh(path).await {
                Ok(_) => report.indexed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = path.as_str(), "failed to index document: {}", e);
                }
            }
        }

        // Entries refreshed after the mark reflect the disk already.
        let live: HashSet<&String> = paths.iter().collect();
        report.removed = self.write_index().retain_since(&live, mark);

        self.crawling.store(false, Ordering::SeqCst);
        tracing::info!(
            indexed = report.indexed,
            failed = report.failed,
            removed = report.removed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "corpus crawl complete"
        );
        Ok(report)
    }

    /// Re-derives a single path from disk.
    ///
    /// Returns what happened to the entry: `Add`, `Change`, or `Unlink` when
    /// the document no longer exists.
    pub async fn refresh(&self, path: &str) -> Result<ChangeKind> {
        let _guard = self.refresh_lock.lock().await;

        match self.store.read(path).await {
            Ok(doc) => {
                let entry = IndexEntry::build(
                    path,
                    &doc.content,
                    doc.version,
                    self.config.max_tags_per_document,
                );
                let previous = self.write_index().upsert(entry);
                Ok(if previous.is_some() {
                    ChangeKind::Change
                } else {
                    ChangeKind::Add
                })
            }
            Err(WorkspaceError::NotFound(_)) => {
                self.write_index().remove(path);
                Ok(ChangeKind::Unlink)
            }
            Err(e) => Err(e),
        }
    }

    pub fn search(&self, query: &str) -> Vec<LiteralHit> {
        self.search_with_limits(
            query,
            self.config.literal_max_per_file,
            self.config.literal_max_files,
        )
    }

    pub fn search_with_limits(
        &self,
        query: &str,
        max_per_file: usize,
        max_files: usize,
    ) -> Vec<LiteralHit> {
        self.read_index().literal_search(
            query,
            max_per_file,
            max_files,
            self.config.min_query_len,
        )
    }

    pub fn rank(&self, query: &str) -> Vec<RankedHit> {
        self.read_index().rank(query)
    }

    pub fn tags(&self) -> Vec<TagCount> {
        self.read_index().tags()
    }

    pub fn files_for_tag(&self, tag: &str) -> Vec<TaggedFile> {
        self.read_index().files_for_tag(tag)
    }

    pub fn backlinks(&self, path: &str) -> Vec<Backlink> {
        self.read_index().backlinks(path)
    }

    pub fn resolve_wikilink(&self, link: &str) -> WikilinkResolution {
        self.read_index().resolve_wikilink(link)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            ready: self.is_ready(),
            ..self.read_index().stats()
        }
    }

    /// Content fingerprint of every indexed document.
    pub fn fingerprints(&self) -> HashMap<String, String> {
        self.read_index()
            .entries
            .values()
            .map(|e| (e.path.clone(), e.fingerprint.clone()))
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.read_index().get(path).is_some()
    }

    pub fn preview(&self, path: &str) -> Option<String> {
        self.read_index().get(path).map(|e| e.preview.clone())
    }

    fn read_index(&self) -> std::sync::RwLockReadGuard<'_, CorpusIndex> {
        self.index.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_index(&self) -> std::sync::RwLockWriteGuard<'_, CorpusIndex> {
        self.index.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(docs: &[(&str, &str, Version)]) -> CorpusIndex {
        let mut index = CorpusIndex::new("md");
        for (path, content, version) in docs {
            index.upsert(IndexEntry::build(path, content, *version, 5));
        }
        index
    }

    #[test]
    fn test_literal_search_line_numbers() {
        let index = index_of(&[("notes/today.md", "# Today\nhello #work", 1)]);
        let hits = index.literal_search("HELLO", 5, 50, 2);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "notes/today.md");
        assert_eq!(hits[0].matches[0].line, 2);
        assert_eq!(hits[0].matches[0].text, "hello #work");
    }

    #[test]
    fn test_literal_search_short_query_is_empty() {
        let index = index_of(&[("a.md", "a b c", 1)]);
        assert!(index.literal_search("a", 5, 50, 2).is_empty());
        assert!(index.literal_search("  ", 5, 50, 2).is_empty());
    }

    #[test]
    fn test_literal_search_limits_and_recency() {
        let body = "match\n".repeat(10);
        let index = index_of(&[
            ("old.md", &body, 10),
            ("new.md", &body, 20),
            ("mid.md", &body, 15),
        ]);
        let hits = index.literal_search("match", 3, 2, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "new.md");
        assert_eq!(hits[1].path, "mid.md");
        assert!(hits.iter().all(|h| h.matches.len() == 3));
    }

    #[test]
    fn test_bm25_prefers_term_dense_documents() {
        let index = index_of(&[
            ("a.md", "rust rust rust memory", 1),
            ("b.md", "rust python go java kotlin swift", 1),
            ("c.md", "nothing relevant here", 1),
        ]);
        let hits = index.rank("rust");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "a.md");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_bm25_deterministic_with_path_tiebreak() {
        let index = index_of(&[
            ("z.md", "alpha beta", 1),
            ("m.md", "alpha beta", 1),
            ("a.md", "alpha beta", 1),
        ]);
        let first = index.rank("alpha");
        let second = index.rank("alpha");
        assert_eq!(first, second);
        let order: Vec<&str> = first.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(order, vec!["a.md", "m.md", "z.md"]);
    }

    #[test]
    fn test_upsert_replaces_statistics() {
        let mut index = index_of(&[("a.md", "hello world", 1)]);
        index.upsert(IndexEntry::build("a.md", "goodbye", 2, 5));
        assert!(index.rank("hello").is_empty());
        assert_eq!(index.rank("goodbye").len(), 1);
        assert_eq!(index.stats().terms, 1);
    }

    #[test]
    fn test_remove_clears_all_structures() {
        let mut index = index_of(&[("a.md", "#tag text [[b]]", 1), ("b.md", "b", 1)]);
        index.remove("a.md");
        assert!(index.tags().is_empty());
        assert!(index.rank("text").is_empty());
        assert!(index.backlinks("b.md").is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_tag_counts_and_files() {
        let index = index_of(&[
            ("a.md", "# A\nfirst #work #home", 1),
            ("b.md", "# B\nsecond #work", 1),
        ]);
        let tags = index.tags();
        assert_eq!(tags[0], TagCount { name: "work".to_string(), count: 2 });
        assert_eq!(tags[1], TagCount { name: "home".to_string(), count: 1 });

        let files = index.files_for_tag("#Work");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "a.md");
        assert_eq!(files[0].title, "A");
        assert_eq!(files[0].preview, "first #work #home");
    }

    #[test]
    fn test_resolve_prefers_exact_path() {
        let index = index_of(&[
            ("ideas.md", "root", 1),
            ("notes/ideas.md", "nested", 1),
            ("projects/Plan.md", "plan", 1),
        ]);
        assert_eq!(index.resolve_link("notes/ideas"), Some("notes/ideas.md"));
        assert_eq!(index.resolve_link("IDEAS"), Some("ideas.md"));
        assert_eq!(index.resolve_link("plan"), Some("projects/Plan.md"));
        assert_eq!(index.resolve_link("projects/plan.md"), Some("projects/Plan.md"));
        assert_eq!(index.resolve_link("missing"), None);
        assert_eq!(index.resolve_link(""), None);

        let res = index.resolve_wikilink("missing");
        assert!(!res.found);
        assert!(res.path.is_none());
    }

    #[test]
    fn test_resolve_distinguishes_case_variants() {
        let mut index = index_of(&[("Notes.md", "upper", 1), ("notes.md", "lower", 1)]);
        assert_eq!(index.resolve_link("Notes"), Some("Notes.md"));
        assert_eq!(index.resolve_link("notes"), Some("notes.md"));
        assert_eq!(index.resolve_link("notes.md"), Some("notes.md"));

        index.remove("notes.md");
        assert_eq!(index.resolve_link("notes"), Some("Notes.md"));
        assert_eq!(index.resolve_link("NOTES.md"), Some("Notes.md"));

        index.remove("Notes.md");
        assert_eq!(index.resolve_link("notes"), None);
    }

    #[test]
    fn test_retain_since_keeps_entries_written_after_mark() {
        let mut index = index_of(&[("a.md", "a", 1), ("gone.md", "gone", 1)]);
        let mark = index.mark();
        index.upsert(IndexEntry::build("fresh.md", "fresh", 2, 5));

        let a = "a.md".to_string();
        let live: HashSet<&String> = [&a].into_iter().collect();
        assert_eq!(index.retain_since(&live, mark), 1);
        assert!(index.get("gone.md").is_none());
        assert!(index.get("fresh.md").is_some());
        assert!(index.get("a.md").is_some());
    }

    #[tokio::test]
    async fn test_crawl_sweeps_deleted_documents() {
        use crate::sandbox::PathSandbox;

        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::fs::write(root.join("keep.md"), "keep").unwrap();
        std::fs::write(root.join("gone.md"), "gone").unwrap();

        let store = DocumentStore::new(PathSandbox::new(root.clone(), "md"), &[]).unwrap();
        let indexer = Indexer::new(store, IndexConfig::default());
        assert_eq!(indexer.crawl().await.unwrap().indexed, 2);

        std::fs::remove_file(root.join("gone.md")).unwrap();
        let report = indexer.crawl().await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(indexer.contains("keep.md"));
        assert!(!indexer.contains("gone.md"));
        assert!(indexer.is_ready());
    }

    #[test]
    fn test_backlinks_with_line_and_context() {
        let index = index_of(&[
            ("target.md", "# Target\nlinks to [[target]] itself", 1),
            ("a.md", "intro\nsee [[Target]] for details", 1),
            ("b.md", "[[nowhere]]", 1),
        ]);
        let links = index.backlinks("target.md");
        assert_eq!(
            links,
            vec![Backlink {
                path: "a.md".to_string(),
                line: 2,
                context: "see [[Target]] for details".to_string(),
            }]
        );
    }
}
