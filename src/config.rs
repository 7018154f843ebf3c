//! TOML configuration parsing.
//!
//! The configuration file describes where the workspace lives, where the
//! embedding cache database is stored, how the indexer and watcher behave,
//! which embedding provider backs semantic search, and where the HTTP server
//! binds. Every section except `[workspace]` has defaults.
//!
//! ```toml
//! [workspace]
//! root = "./memory"
//!
//! [db]
//! path = "./data/memh.sqlite"
//!
//! [embedding]
//! enabled = true
//! provider = "openai"
//! url = "https://api.openai.com/v1"
//! model = "text-embedding-3-small"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    /// Managed document extension, without the leading dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_extension() -> String {
    "md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/memh.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_max_tags")]
    pub max_tags_per_document: usize,
    #[serde(default = "default_literal_max_per_file")]
    pub literal_max_per_file: usize,
    #[serde(default = "default_literal_max_files")]
    pub literal_max_files: usize,
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_tags_per_document: default_max_tags(),
            literal_max_per_file: default_literal_max_per_file(),
            literal_max_files: default_literal_max_files(),
            min_query_len: default_min_query_len(),
        }
    }
}

fn default_max_tags() -> usize {
    5
}
fn default_literal_max_per_file() -> usize {
    5
}
fn default_literal_max_files() -> usize {
    50
}
fn default_min_query_len() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    300
}

/// Embedding provider settings.
///
/// These are also the runtime-editable settings exposed over HTTP; see
/// [`crate::settings`]. The API key is never serialized back out in full.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            url: None,
            api_key: None,
            model: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    2
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.provider != "disabled"
    }

    /// Model identifier used as part of every embedding cache key.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or("")
    }

    pub fn validate(&self) -> Result<()> {
        match self.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.is_enabled() && self.model.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                self.provider
            );
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("embedding.timeout_secs must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Directory holding derived state (embedding cache, runtime settings).
    pub fn data_dir(&self) -> PathBuf {
        self.db
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let ext = &config.workspace.extension;
    if ext.is_empty() || ext.starts_with('.') {
        anyhow::bail!("workspace.extension must be non-empty and must not start with '.'");
    }

    if config.index.max_tags_per_document == 0 {
        anyhow::bail!("index.max_tags_per_document must be > 0");
    }
    if config.index.literal_max_per_file == 0 || config.index.literal_max_files == 0 {
        anyhow::bail!("index.literal_max_per_file and index.literal_max_files must be > 0");
    }

    if config.watch.debounce_ms == 0 {
        anyhow::bail!("watch.debounce_ms must be > 0");
    }

    config.embedding.validate()?;
    Ok(())
}
