//! Layered configuration
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file: explicit path, `STEPWISE_CONFIG_PATH`, or `./stepwise.toml`
//! 3. Environment variables `STEPWISE__<SECTION>__<KEY>` (e.g. `STEPWISE__ENGINE__TIMEOUT_MS`)
//!
//! `.env` files are loaded into the environment first. `OPENAI_API_KEY` fills
//! `explain.api_key` when nothing else sets it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::Limits;

pub const CONFIG_PATH_ENV: &str = "STEPWISE_CONFIG_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "stepwise.toml";
const ENV_PREFIX: &str = "STEPWISE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub explain: ExplainConfig,
    pub logging: LoggingConfig,
}

/// Interpreter limits and worker thread sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub timeout_ms: u64,
    pub recursion_limit: usize,
    pub max_output_bytes: usize,
    pub max_trace_steps: usize,
    /// Longest binding representation kept in a step, in characters
    pub repr_limit: usize,
    pub stack_size_mb: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            recursion_limit: 1000,
            max_output_bytes: 1024 * 1024,
            max_trace_steps: 50_000,
            repr_limit: 1000,
            stack_size_mb: 256,
        }
    }
}

impl EngineConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            timeout: Some(Duration::from_millis(self.timeout_ms)),
            recursion_limit: self.recursion_limit,
            max_trace_steps: self.max_trace_steps,
            max_output_bytes: self.max_output_bytes,
        }
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_concurrent_executions: usize,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: 2,
            max_concurrent_executions: 4,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// OpenAI-compatible chat completions endpoint used for explanations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplainConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "stepwise=info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Effective configuration as TOML, with the API key masked
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.explain.api_key.is_some() {
            shown.explain.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));
        if self.engine.timeout_ms == 0 {
            return invalid("engine.timeout_ms must be greater than 0");
        }
        if self.engine.recursion_limit == 0 {
            return invalid("engine.recursion_limit must be greater than 0");
        }
        if self.engine.repr_limit == 0 {
            return invalid("engine.repr_limit must be greater than 0");
        }
        if self.engine.stack_size_mb == 0 {
            return invalid("engine.stack_size_mb must be greater than 0");
        }
        if self.server.workers == 0 {
            return invalid("server.workers must be greater than 0");
        }
        if self.server.max_concurrent_executions == 0 {
            return invalid("server.max_concurrent_executions must be greater than 0");
        }
        if !(0.0..=2.0).contains(&self.explain.temperature) {
            return invalid("explain.temperature must be between 0 and 2");
        }
        if self.explain.base_url.trim().is_empty() {
            return invalid("explain.base_url must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Explicit config file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = self.resolve_path()? {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Config = builder.build()?.try_deserialize()?;
        if config.explain.api_key.as_deref().map_or(true, str::is_empty) {
            config.explain.api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.is_empty());
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        let explicit = self
            .config_path
            .clone()
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));
        match explicit {
            Some(path) if path.is_file() => Ok(Some(path)),
            Some(path) => Err(ConfigError::FileNotFound(path)),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                Ok(local.is_file().then(|| local.to_path_buf()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("stepwise-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.timeout_ms, 5000);
        assert_eq!(config.engine.max_output_bytes, 1_048_576);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.explain.model, "gpt-4o-mini");
        assert_eq!(config.logging.filter, "stepwise=info");
        assert_eq!(config.engine.limits().timeout, Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_file_overrides_defaults_per_key() {
        let path = write_config("[engine]\ntimeout_ms = 250\n\n[server]\nport = 9100\n");
        let config = Config::builder().config_path(Some(path.clone())).build().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.engine.timeout_ms, 250);
        assert_eq!(config.engine.recursion_limit, 1000);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let missing = std::env::temp_dir().join("stepwise-does-not-exist.toml");
        let err = Config::builder().config_path(Some(missing)).build().unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let path = write_config("[engine]\ntimeout_ms = 0\n");
        let err = Config::builder().config_path(Some(path.clone())).build().unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("engine.timeout_ms"));
    }

    #[test]
    fn test_to_toml_masks_api_key() {
        let mut config = Config::default();
        config.explain.api_key = Some("sk-secret".to_string());
        let text = config.to_toml().unwrap();
        assert!(text.contains("[engine]"));
        assert!(!text.contains("sk-secret"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.engine, config.engine);
    }
}
