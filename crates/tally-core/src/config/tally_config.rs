//! Layered configuration.
//!
//! Sources, lowest precedence first: defaults, `~/.tally/config.toml`,
//! `./.tallyrc`, `TALLY_*` environment variables, command-line overrides.
//! Every source is read into a [`ConfigLayer`] of optional values; layers are
//! merged and then resolved into a validated [`TallyConfig`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tally_models::{ModelConfig, ModelType};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_DOCS_PATH: &str = "docs";
pub const DEFAULT_DATABASE_PATH: &str = "data/northwind.sqlite";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read or write a configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse a configuration file or variable.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A value is outside its allowed range.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Model settings as written in a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// One configuration source. Unset values defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigLayer {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemplars_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl ConfigLayer {
    /// Load a layer from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Save this layer as a TOML file, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(format!("Failed to serialize: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::ReadError(format!("Failed to create directory: {}", e)))?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::ReadError(format!("Failed to write file: {}", e)))
    }

    /// Layer read from `TALLY_*` process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Layer read through `lookup`, which maps a variable name to its value.
    ///
    /// `TALLY_MODEL` is a model id, optionally prefixed with a provider
    /// (`ollama:qwen2:1.5b`, `scripted:fixture`).
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut layer = Self::default();
        if let Some(spec) = get("TALLY_MODEL") {
            layer.set_model_spec(&spec);
        }
        layer.model.base_url = get("TALLY_OLLAMA_URL");
        layer.docs_path = get("TALLY_DOCS").map(PathBuf::from);
        layer.database_path = get("TALLY_DB").map(PathBuf::from);
        layer.exemplars_path = get("TALLY_EXEMPLARS").map(PathBuf::from);
        layer.top_k = get("TALLY_TOP_K").map(|v| parse_var("TALLY_TOP_K", &v)).transpose()?;
        layer.max_attempts = get("TALLY_MAX_ATTEMPTS").map(|v| parse_var("TALLY_MAX_ATTEMPTS", &v)).transpose()?;
        layer.query_timeout_ms =
            get("TALLY_QUERY_TIMEOUT_MS").map(|v| parse_var("TALLY_QUERY_TIMEOUT_MS", &v)).transpose()?;
        layer.concurrency = get("TALLY_CONCURRENCY").map(|v| parse_var("TALLY_CONCURRENCY", &v)).transpose()?;
        layer.as_of = get("TALLY_AS_OF").map(|v| parse_var("TALLY_AS_OF", &v)).transpose()?;
        Ok(layer)
    }

    /// Set the model from a `provider:id` or bare `id` spec.
    pub fn set_model_spec(&mut self, spec: &str) {
        let (provider, id) = split_model_spec(spec);
        self.model.provider = provider;
        self.model.id = Some(id);
    }

    /// Merge another layer into this one. Values set in `other` win.
    pub fn merge(&mut self, other: &Self) {
        fn take<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }

        take(&mut self.model.provider, other.model.provider.as_ref());
        take(&mut self.model.id, other.model.id.as_ref());
        take(&mut self.model.base_url, other.model.base_url.as_ref());
        take(&mut self.model.temperature, other.model.temperature.as_ref());
        take(&mut self.docs_path, other.docs_path.as_ref());
        take(&mut self.database_path, other.database_path.as_ref());
        take(&mut self.exemplars_path, other.exemplars_path.as_ref());
        take(&mut self.top_k, other.top_k.as_ref());
        take(&mut self.max_attempts, other.max_attempts.as_ref());
        take(&mut self.query_timeout_ms, other.query_timeout_ms.as_ref());
        take(&mut self.concurrency, other.concurrency.as_ref());
        take(&mut self.as_of, other.as_of.as_ref());
        take(&mut self.log_level, other.log_level.as_ref());
    }
}

fn split_model_spec(spec: &str) -> (Option<String>, String) {
    match spec.split_once(':') {
        Some((provider, id)) if ModelType::from_str(provider).is_ok() && !id.is_empty() => {
            (Some(provider.to_string()), id.to_string())
        }
        _ => (None, spec.to_string()),
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| ConfigError::ParseError(format!("{name}={value}: {e}")))
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TallyConfig {
    pub model: ModelConfig,
    /// Overrides the exemplar set's generation temperature when set.
    pub temperature: Option<f32>,
    pub docs_path: PathBuf,
    pub database_path: PathBuf,
    pub exemplars_path: Option<PathBuf>,
    pub top_k: usize,
    pub max_attempts: u32,
    pub query_timeout_ms: u64,
    pub concurrency: usize,
    /// Reference date for relative periods; today when unset.
    pub as_of: Option<NaiveDate>,
    pub log_level: Option<String>,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            temperature: None,
            docs_path: PathBuf::from(DEFAULT_DOCS_PATH),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            exemplars_path: None,
            top_k: DEFAULT_TOP_K,
            max_attempts: crate::repair::DEFAULT_MAX_ATTEMPTS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            as_of: None,
            log_level: None,
        }
    }
}

impl TallyConfig {
    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".tally")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".tallyrc")
    }

    /// Discover files and environment, then apply `overrides`.
    ///
    /// Missing files are skipped; unreadable or malformed ones are errors.
    pub fn discover(overrides: &ConfigLayer) -> ConfigResult<Self> {
        let mut layer = ConfigLayer::default();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            match ConfigLayer::load_from_file(&path) {
                Ok(file) => {
                    debug!(path = %path.display(), "Loaded configuration file");
                    layer.merge(&file);
                }
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        layer.merge(&ConfigLayer::from_env()?);
        layer.merge(overrides);
        Self::resolve(&layer)
    }

    /// Fill unset values with defaults and validate.
    pub fn resolve(layer: &ConfigLayer) -> ConfigResult<Self> {
        let defaults = Self::default();

        let mut model = defaults.model.clone();
        if let Some(provider) = &layer.model.provider {
            model.model_type = ModelType::from_str(provider).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        }
        if let Some(id) = &layer.model.id {
            model.model_id.clone_from(id);
        }
        model.base_url.clone_from(&layer.model.base_url);

        let config = Self {
            model,
            temperature: layer.model.temperature,
            docs_path: layer.docs_path.clone().unwrap_or(defaults.docs_path),
            database_path: layer.database_path.clone().unwrap_or(defaults.database_path),
            exemplars_path: layer.exemplars_path.clone(),
            top_k: layer.top_k.unwrap_or(defaults.top_k),
            max_attempts: layer.max_attempts.unwrap_or(defaults.max_attempts),
            query_timeout_ms: layer.query_timeout_ms.unwrap_or(defaults.query_timeout_ms),
            concurrency: layer.concurrency.unwrap_or(defaults.concurrency),
            as_of: layer.as_of,
            log_level: layer.log_level.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidValue("top_k must be at least 1".to_string()));
        }
        if !(1..=5).contains(&self.max_attempts) {
            return Err(ConfigError::InvalidValue(format!(
                "max_attempts must be between 1 and 5, got {}",
                self.max_attempts
            )));
        }
        if !(1..=32).contains(&self.concurrency) {
            return Err(ConfigError::InvalidValue(format!(
                "concurrency must be between 1 and 32, got {}",
                self.concurrency
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("query_timeout_ms must be positive".to_string()));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidValue(format!("temperature must be in [0, 2], got {temperature}")));
            }
        }
        if self.model.model_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue("model id must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// The reference date for relative periods.
    pub fn as_of_or_today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_content = r#"
docs_path = "corpus"
top_k = 5
as_of = "1998-05-06"

[model]
provider = "ollama"
id = "phi3.5"
temperature = 0.2
"#;
        std::fs::write(&config_path, config_content).unwrap();

        let layer = ConfigLayer::load_from_file(&config_path).unwrap();
        assert_eq!(layer.docs_path, Some(PathBuf::from("corpus")));
        assert_eq!(layer.top_k, Some(5));
        assert_eq!(layer.model.id.as_deref(), Some("phi3.5"));
        assert_eq!(layer.as_of, NaiveDate::from_ymd_opt(1998, 5, 6));
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");
        assert!(matches!(ConfigLayer::load_from_file(&missing), Err(ConfigError::NotFound(_))));

        let bad = temp_dir.path().join("bad.toml");
        std::fs::write(&bad, "top_k = \"many\"").unwrap();
        assert!(matches!(ConfigLayer::load_from_file(&bad), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let layer = ConfigLayer { concurrency: Some(8), ..ConfigLayer::default() };
        layer.save_to_file(&path).unwrap();
        assert_eq!(ConfigLayer::load_from_file(&path).unwrap(), layer);
    }

    #[test]
    fn test_env_layer() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TALLY_MODEL", "scripted:fixture"),
            ("TALLY_TOP_K", "4"),
            ("TALLY_AS_OF", "1997-12-31"),
            ("TALLY_DB", "  "),
        ]);
        let layer = ConfigLayer::from_vars(|name| vars.get(name).map(|v| (*v).to_string())).unwrap();
        assert_eq!(layer.model.provider.as_deref(), Some("scripted"));
        assert_eq!(layer.model.id.as_deref(), Some("fixture"));
        assert_eq!(layer.top_k, Some(4));
        assert_eq!(layer.database_path, None);

        let err = ConfigLayer::from_vars(|name| (name == "TALLY_MAX_ATTEMPTS").then(|| "two".to_string()));
        assert!(matches!(err, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_model_spec_keeps_colons_in_id() {
        assert_eq!(split_model_spec("ollama:qwen2:1.5b"), (Some("ollama".into()), "qwen2:1.5b".into()));
        assert_eq!(split_model_spec("qwen2:1.5b"), (None, "qwen2:1.5b".into()));
    }

    #[test]
    fn test_merge_precedence_and_resolve() {
        let mut layer = ConfigLayer { top_k: Some(2), max_attempts: Some(3), ..ConfigLayer::default() };
        layer.merge(&ConfigLayer { top_k: Some(7), ..ConfigLayer::default() });

        let config = TallyConfig::resolve(&layer).unwrap();
        assert_eq!(config.top_k, 7);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validation() {
        for layer in [
            ConfigLayer { top_k: Some(0), ..ConfigLayer::default() },
            ConfigLayer { max_attempts: Some(6), ..ConfigLayer::default() },
            ConfigLayer { concurrency: Some(0), ..ConfigLayer::default() },
            ConfigLayer { query_timeout_ms: Some(0), ..ConfigLayer::default() },
        ] {
            assert!(matches!(TallyConfig::resolve(&layer), Err(ConfigError::InvalidValue(_))));
        }
        let unknown_provider = ConfigLayer {
            model: ModelSection { provider: Some("gpt".into()), ..ModelSection::default() },
            ..ConfigLayer::default()
        };
        assert!(matches!(TallyConfig::resolve(&unknown_provider), Err(ConfigError::InvalidValue(_))));
    }
}
