//! Runtime-editable embedding settings.
//!
//! The `[embedding]` section of the config file is the starting point.
//! Changes made through `PUT /api/settings` are written to `settings.json`
//! in the data directory and layered over the file config on the next start.
//!
//! The API key is write-only: reads return whether one is set and a masked
//! hint, never the key itself.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

pub const SETTINGS_FILE: &str = "settings.json";

/// What clients see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub enabled: bool,
    pub provider: String,
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key_set: bool,
    pub api_key_hint: Option<String>,
}

/// A partial update. Absent fields keep their current value; an empty
/// `apiKey` clears the key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub provider: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

pub struct SettingsStore {
    file: PathBuf,
    current: RwLock<EmbeddingConfig>,
}

impl SettingsStore {
    /// Loads persisted overrides from `data_dir`, falling back to `base`.
    pub fn load(data_dir: &Path, base: EmbeddingConfig) -> Result<Self> {
        let file = data_dir.join(SETTINGS_FILE);
        let current = if file.exists() {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let saved: EmbeddingConfig = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            tracing::info!(path = %file.display(), "loaded runtime settings");
            saved
        } else {
            base
        };
        current.validate()?;

        Ok(Self {
            file,
            current: RwLock::new(current),
        })
    }

    pub fn current(&self) -> EmbeddingConfig {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn view(&self) -> SettingsView {
        view_of(&self.current())
    }

    /// Applies and persists an update. Returns the new config, or an error
    /// (leaving settings untouched) if the result would be invalid.
    pub fn update(&self, update: SettingsUpdate) -> Result<EmbeddingConfig> {
        let mut next = self.current();
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }
        if let Some(provider) = update.provider {
            next.provider = provider;
        }
        if let Some(url) = update.url {
            next.url = non_empty(url);
        }
        if let Some(model) = update.model {
            next.model = non_empty(model);
        }
        if let Some(key) = update.api_key {
            next.api_key = non_empty(key);
        }
        next.validate()?;

        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&next)?;
        std::fs::write(&self.file, json)
            .with_context(|| format!("Failed to write {}", self.file.display()))?;

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next.clone();
        tracing::info!(
            provider = next.provider.as_str(),
            model = next.model_id(),
            enabled = next.enabled,
            "settings updated"
        );
        Ok(next)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn view_of(config: &EmbeddingConfig) -> SettingsView {
    SettingsView {
        enabled: config.enabled,
        provider: config.provider.clone(),
        url: config.url.clone(),
        model: config.model.clone(),
        api_key_set: config.api_key.is_some(),
        api_key_hint: config.api_key.as_deref().map(mask_key),
    }
}

/// Keeps the last four characters of keys long enough to hide the rest.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
