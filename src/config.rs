//! Engine configuration
//!
//! Layers, lowest precedence first: built-in defaults, `<root>/.sefs_config.json`,
//! environment variables, then command-line flags (applied by the binary).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cluster::ClusterParams;
use crate::state::io::{read_json, SafeIoError};
use crate::vector::{EmbeddingModelKind, IndexConfig};

/// Optional config file under the managed root
pub const CONFIG_FILE_NAME: &str = ".sefs_config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    File(#[from] SafeIoError),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which naming backend labels clusters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NamingBackend {
    #[default]
    Keyword,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Directory being organized
    pub root: PathBuf,
    pub tick_interval_ms: u64,
    pub debounce_ms: u64,
    /// DBSCAN neighbourhood radius (cosine distance)
    pub epsilon: f32,
    pub min_samples: usize,
    /// Reorganize as soon as new files arrive instead of waiting for confirmation
    pub auto_include: bool,
    /// Lower-case file extensions the engine manages
    pub extensions: Vec<String>,
    pub embedding_model: EmbeddingModelKind,
    pub max_embed_chars: usize,
    pub preview_chars: usize,
    pub min_content_chars: usize,
    pub folder_name_max_len: usize,
    pub history_limit: usize,
    pub naming: NamingBackend,
    /// Never read from or written to the config file
    #[serde(skip)]
    pub anthropic_api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let index = IndexConfig::default();
        let cluster = ClusterParams::default();
        Self {
            root: default_root(),
            tick_interval_ms: 2000,
            debounce_ms: 500,
            epsilon: cluster.epsilon,
            min_samples: cluster.min_samples,
            auto_include: false,
            extensions: vec!["txt".to_string(), "pdf".to_string()],
            embedding_model: EmbeddingModelKind::default(),
            max_embed_chars: index.max_embed_chars,
            preview_chars: index.preview_chars,
            min_content_chars: index.min_content_chars,
            folder_name_max_len: 50,
            history_limit: crate::state::DEFAULT_HISTORY_LIMIT,
            naming: NamingBackend::default(),
            anthropic_api_key: None,
        }
    }
}

/// `~/sefs_root`, or `./sefs_root` without a home directory
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("sefs_root"))
        .unwrap_or_else(|| PathBuf::from("sefs_root"))
}

/// Where downloaded embedding models are cached
pub fn model_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("sefs").join("models"))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl EngineConfig {
    /// Defaults, then the root's config file, then the process environment
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(root)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with `<root>/.sefs_config.json` if present
    pub fn from_file(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        let mut config: EngineConfig = match read_json(&path)? {
            Some(config) => {
                tracing::info!(path = %path.display(), "Loaded config file");
                config
            }
            None => EngineConfig::default(),
        };
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Apply `SEFS_*` and `ANTHROPIC_API_KEY` overrides from `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SEFS_EPSILON") {
            self.epsilon = parse_env("SEFS_EPSILON", &v)?;
        }
        if let Some(v) = lookup("SEFS_MIN_SAMPLES") {
            self.min_samples = parse_env("SEFS_MIN_SAMPLES", &v)?;
        }
        if let Some(v) = lookup("SEFS_AUTO_INCLUDE") {
            self.auto_include = parse_bool("SEFS_AUTO_INCLUDE", &v)?;
        }
        if let Some(v) = lookup("SEFS_TICK_MS") {
            self.tick_interval_ms = parse_env("SEFS_TICK_MS", &v)?;
        }
        if let Some(v) = lookup("SEFS_NAMING") {
            self.naming = match v.trim().to_ascii_lowercase().as_str() {
                "keyword" => NamingBackend::Keyword,
                "anthropic" => NamingBackend::Anthropic,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "SEFS_NAMING".to_string(),
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup(crate::ai::API_KEY_ENV) {
            if !v.trim().is_empty() {
                self.anthropic_api_key = Some(v);
            }
        }
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.epsilon > 0.0 && self.epsilon <= 2.0) {
            return Err(ConfigError::Invalid(format!("epsilon must be in (0, 2], got {}", self.epsilon)));
        }
        if self.min_samples == 0 {
            return Err(ConfigError::Invalid("minSamples must be at least 1".to_string()));
        }
        if self.max_embed_chars == 0 || self.preview_chars == 0 || self.min_content_chars == 0 {
            return Err(ConfigError::Invalid("character limits must be positive".to_string()));
        }
        if self.preview_chars > self.max_embed_chars {
            return Err(ConfigError::Invalid(format!(
                "previewChars ({}) exceeds maxEmbedChars ({})",
                self.preview_chars, self.max_embed_chars
            )));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("at least one extension is required".to_string()));
        }
        if self.folder_name_max_len == 0 {
            return Err(ConfigError::Invalid("folderNameMaxLen must be positive".to_string()));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("historyLimit must be positive".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tickIntervalMs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            max_embed_chars: self.max_embed_chars,
            preview_chars: self.preview_chars,
            min_content_chars: self.min_content_chars,
        }
    }

    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            epsilon: self.epsilon,
            min_samples: self.min_samples,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Extensions normalised to lower case without a leading dot
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tick_interval(), Duration::from_secs(2));
        assert_eq!(config.cluster_params(), ClusterParams::default());
        assert!(!config.auto_include);
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"epsilon": 0.3, "minSamples": 3, "extensions": ["txt", "md"], "naming": "anthropic"}"#,
        )
        .unwrap();

        let config = EngineConfig::from_file(dir.path()).unwrap();

        assert_eq!(config.root, dir.path());
        assert!((config.epsilon - 0.3).abs() < 1e-6);
        assert_eq!(config.min_samples, 3);
        assert_eq!(config.extensions, vec!["txt".to_string(), "md".to_string()]);
        assert_eq!(config.naming, NamingBackend::Anthropic);
        // Unset fields keep their defaults
        assert_eq!(config.preview_chars, 500);
    }

    #[test]
    fn test_env_layer_overrides_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{"epsilon": 0.3}"#).unwrap();

        let mut config = EngineConfig::from_file(dir.path()).unwrap();
        config
            .apply_env(env(&[
                ("SEFS_EPSILON", "0.7"),
                ("SEFS_AUTO_INCLUDE", "yes"),
                ("SEFS_TICK_MS", "500"),
                ("ANTHROPIC_API_KEY", "sk-test"),
            ]))
            .unwrap();

        assert!((config.epsilon - 0.7).abs() < 1e-6);
        assert!(config.auto_include);
        assert_eq!(config.tick_interval_ms, 500);
        assert_eq!(config.anthropic_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = EngineConfig::default();
        let err = config.apply_env(env(&[("SEFS_MIN_SAMPLES", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = config.apply_env(env(&[("SEFS_NAMING", "gpt")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig {
            epsilon: 0.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        config.epsilon = 0.5;
        config.min_samples = 0;
        assert!(config.validate().is_err());

        config.min_samples = 2;
        config.preview_chars = 6000;
        assert!(config.validate().is_err());

        config.preview_chars = 500;
        config.extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let config = EngineConfig {
            anthropic_api_key: Some("secret".to_string()),
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_normalized_extensions() {
        let config = EngineConfig {
            extensions: vec![".TXT".to_string(), " pdf ".to_string(), "".to_string()],
            ..EngineConfig::default()
        };
        assert_eq!(config.normalized_extensions(), vec!["txt".to_string(), "pdf".to_string()]);
    }
}
