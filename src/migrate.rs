use anyhow::Result;
use sqlx::SqlitePool;

/// Creates the embedding cache schema. Safe to run on every startup.
///
/// The cache is derived data: dropping the database loses nothing but
/// provider calls.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One record per document; the key is (path) but validity also
    // depends on fingerprint and model.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            path TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            vector BLOB NOT NULL,
            stale INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(model)")
        .execute(pool)
        .await?;

    Ok(())
}
