#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use memory_harness::config::Config;
use memory_harness::embedding::EmbeddingProvider;
use memory_harness::error::Result;
use tempfile::TempDir;

/// Builds a config rooted in `tmp`: documents under `notes/`, data under `data/`.
pub fn test_config(tmp: &TempDir, watch: bool) -> Config {
    let root = tmp.path();
    fs::create_dir_all(root.join("notes")).unwrap();
    let toml = format!(
        r#"[workspace]
root = "{root}/notes"

[db]
path = "{root}/data/memh.sqlite"

[watch]
enabled = {watch}
debounce_ms = 50

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display(),
        watch = watch,
    );
    let config: Config = toml::from_str(&toml).unwrap();
    memory_harness::config::validate(&config).unwrap();
    config
}

pub fn write_note(tmp: &TempDir, rel: &str, content: &str) {
    let path = tmp.path().join("notes").join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn config_file(tmp: &TempDir, config_toml_extra: &str) -> std::path::PathBuf {
    let root = tmp.path();
    fs::create_dir_all(root.join("notes")).unwrap();
    fs::create_dir_all(root.join("config")).unwrap();
    let content = format!(
        r#"[workspace]
root = "{root}/notes"

[db]
path = "{root}/data/memh.sqlite"

[watch]
enabled = false
{extra}
"#,
        root = root.display(),
        extra = config_toml_extra,
    );
    let path = root.join("config").join("memh.toml");
    fs::write(&path, content).unwrap();
    path
}

/// Deterministic provider: one dimension per topic keyword.
pub struct TopicProvider {
    pub calls: AtomicUsize,
}

pub const TOPICS: &[&str] = &["rust", "python", "cooking"];

impl TopicProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for TopicProvider {
    fn model_name(&self) -> &str {
        "topic-test"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                TOPICS
                    .iter()
                    .map(|topic| lower.matches(topic).count() as f32 + 0.01)
                    .collect()
            })
            .collect())
    }
}

/// Polls `check` every 25 ms until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

pub fn exists(tmp: &TempDir, rel: &str) -> bool {
    Path::new(&tmp.path().join("notes").join(rel)).exists()
}
