//! Semantic search cache.
//!
//! Stores one embedding per document in SQLite, keyed by path and validated
//! by content fingerprint and model id. A record is usable only when all
//! three agree with the current state of the corpus and it has not been
//! invalidated since it was written.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use sqlx::SqlitePool;

use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Result, WorkspaceError};
use crate::extract;

/// Documents longer than this are embedded from their leading characters.
const EMBED_MAX_CHARS: usize = 8000;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingStats {
    pub enabled: bool,
    pub model: String,
    pub cached_count: usize,
    pub total_count: usize,
    pub coverage_percent: f64,
    pub cache_size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub embedded: usize,
    pub failed: usize,
    pub skipped: usize,
}

struct ActiveProvider {
    provider: Arc<dyn EmbeddingProvider>,
    enabled: bool,
}

pub struct SemanticCache {
    pool: SqlitePool,
    active: RwLock<ActiveProvider>,
}

impl SemanticCache {
    pub fn new(pool: SqlitePool, provider: Arc<dyn EmbeddingProvider>, enabled: bool) -> Self {
        Self {
            pool,
            active: RwLock::new(ActiveProvider { provider, enabled }),
        }
    }

    /// Swaps the provider after a settings change. Records written under a
    /// different model simply stop matching.
    pub fn set_provider(&self, provider: Arc<dyn EmbeddingProvider>, enabled: bool) {
        let mut active = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::info!(model = provider.model_name(), enabled, "embedding provider changed");
        *active = ActiveProvider { provider, enabled };
    }

    pub fn is_enabled(&self) -> bool {
        self.read_active().enabled
    }

    fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let active = self.read_active();
        if !active.enabled {
            return Err(WorkspaceError::EmbeddingsDisabled);
        }
        Ok(active.provider.clone())
    }

    fn read_active(&self) -> std::sync::RwLockReadGuard<'_, ActiveProvider> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the embedding for `text`, calling the provider only when no
    /// valid record exists.
    pub async fn ensure(&self, path: &str, text: &str) -> Result<Vec<f32>> {
        let provider = self.provider()?;
        let model = provider.model_name().to_string();
        let fingerprint = extract::fingerprint(text);

        let cached: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT vector FROM embeddings
             WHERE path = ? AND fingerprint = ? AND model = ? AND stale = 0",
        )
        .bind(path)
        .bind(&fingerprint)
        .bind(&model)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(blob) = cached {
            return Ok(embedding::blob_to_vec(&blob));
        }

        let input = extract::truncate_chars(text, EMBED_MAX_CHARS);
        let vector = embedding::embed_one(provider.as_ref(), &input).await?;

        sqlx::query(
            "INSERT INTO embeddings (path, fingerprint, model, dims, vector, stale, updated_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)
             ON CONFLICT(path) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                model = excluded.model,
                dims = excluded.dims,
                vector = excluded.vector,
                stale = 0,
                updated_at = excluded.updated_at",
        )
        .bind(path)
        .bind(&fingerprint)
        .bind(&model)
        .bind(vector.len() as i64)
        .bind(embedding::vec_to_blob(&vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        tracing::debug!(path, model = model.as_str(), dims = vector.len(), "embedding cached");
        Ok(vector)
    }

    /// Scores every valid record against `text`.
    ///
    /// `fingerprints` maps each live document to its current content
    /// fingerprint; records for other paths or older content are skipped.
    /// Results are `(path, score)` ordered by score desc, then path asc.
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        fingerprints: &HashMap<String, String>,
    ) -> Result<Vec<(String, u8)>> {
        let provider = self.provider()?;
        let model = provider.model_name().to_string();
        let query_vec = embedding::embed_one(provider.as_ref(), text).await?;

        let rows: Vec<(String, String, Vec<u8>)> = sqlx::query_as(
            "SELECT path, fingerprint, vector FROM embeddings WHERE model = ? AND stale = 0",
        )
        .bind(&model)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(String, u8)> = rows
            .into_iter()
            .filter(|(path, fp, _)| fingerprints.get(path) == Some(fp))
            .map(|(path, _, blob)| {
                let cos = embedding::cosine_similarity(&query_vec, &embedding::blob_to_vec(&blob));
                (path, embedding::similarity_score(cos))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Marks a record stale so the next [`ensure`](Self::ensure) re-embeds.
    pub async fn invalidate(&self, path: &str) -> Result<()> {
        sqlx::query("UPDATE embeddings SET stale = 1 WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Live paths without a valid record, sorted.
    pub async fn pending(&self, fingerprints: &HashMap<String, String>) -> Result<Vec<String>> {
        let valid = self.valid_paths(fingerprints).await?;
        let mut pending: Vec<String> = fingerprints
            .keys()
            .filter(|path| !valid.contains_key(*path))
            .cloned()
            .collect();
        pending.sort();
        Ok(pending)
    }

    pub async fn stats(&self, fingerprints: &HashMap<String, String>) -> Result<EmbeddingStats> {
        let (enabled, model) = {
            let active = self.read_active();
            (active.enabled, active.provider.model_name().to_string())
        };
        let valid = self.valid_paths(fingerprints).await?;

        let cached_count = valid.len();
        let total_count = fingerprints.len();
        let coverage_percent = if total_count == 0 {
            0.0
        } else {
            (cached_count as f64 / total_count as f64 * 1000.0).round() / 10.0
        };

        Ok(EmbeddingStats {
            enabled,
            model,
            cached_count,
            total_count,
            coverage_percent,
            cache_size_bytes: valid.values().sum(),
        })
    }

    /// Valid records under the active model, with their vector size in bytes.
    async fn valid_paths(
        &self,
        fingerprints: &HashMap<String, String>,
    ) -> Result<HashMap<String, u64>> {
        let model = self.read_active().provider.model_name().to_string();
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT path, fingerprint, LENGTH(vector) FROM embeddings
             WHERE model = ? AND stale = 0",
        )
        .bind(&model)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|(path, fp, _)| fingerprints.get(path) == Some(fp))
            .map(|(path, _, bytes)| (path, bytes.max(0) as u64))
            .collect())
    }
}
