#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: "postgresql://nba:nba@db:5432/nba".to_string(),
            min_connections: 5,
            max_connections: 15,
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    pub embedding_dimension: u32,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://ollama:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            max_workers: 10,
            max_retries: 3,
            retry_delay_secs: 1.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Configuration file not found: {0}")]
    MissingFile(PathBuf),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid database DSN: {0} (must be a postgres:// or postgresql:// URL)")]
    InvalidDsn(String),
    #[error("Invalid connection pool bounds: min {0}, max {1} (need 1 <= min <= max <= 100)")]
    InvalidPoolBounds(u32, u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid worker count: {0} (must be between 1 and 64)")]
    InvalidWorkerCount(usize),
    #[error("Invalid retry count: {0} (must be between 1 and 10)")]
    InvalidRetryCount(u32),
    #[error("Invalid retry delay: {0} (must be between 0 and 60 seconds)")]
    InvalidRetryDelay(f64),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid value for {0}: {1}")]
    InvalidOverride(&'static str, String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".nba-embeddings"))
            .or_else(|| dirs::config_dir().map(|dir| dir.join("nba-embeddings")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides and validate.
    ///
    /// A missing file at the default location means "use defaults"; a missing
    /// file that was asked for explicitly is an error.
    #[inline]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile(path.to_path_buf()).into());
                }
                Self::from_file(path)?
            }
            None => {
                let default_path = Self::config_file_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config
            .apply_overrides(|key| std::env::var(key).ok())
            .context("Failed to apply environment overrides")?;

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dsn) = lookup("DB_DSN") {
            self.database.dsn = dsn;
        }
        if let Some(value) = lookup("DB_MIN_CONNECTIONS") {
            self.database.min_connections = parse_override("DB_MIN_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("DB_MAX_CONNECTIONS") {
            self.database.max_connections = parse_override("DB_MAX_CONNECTIONS", &value)?;
        }
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ollama.url = host;
        }
        if let Some(model) = lookup("EMBED_MODEL") {
            self.ollama.model = model;
        }
        if let Some(value) = lookup("EMBED_DIM") {
            self.ollama.embedding_dimension = parse_override("EMBED_DIM", &value)?;
        }
        if let Some(value) = lookup("BATCH_SIZE") {
            self.pipeline.batch_size = parse_override("BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("MAX_WORKERS") {
            self.pipeline.max_workers = parse_override("MAX_WORKERS", &value)?;
        }
        if let Some(value) = lookup("MAX_RETRIES") {
            self.pipeline.max_retries = parse_override("MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("RETRY_DELAY") {
            self.pipeline.retry_delay_secs = parse_override("RETRY_DELAY", &value)?;
        }
        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.ollama.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }

    #[inline]
    pub fn embedding_dimension(&self) -> usize {
        self.ollama.embedding_dimension as usize
    }
}

fn parse_override<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride(key, value.to_string()))
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.dsn).map_err(|_| ConfigError::InvalidDsn(self.masked_dsn()))?;
        if url.scheme() != "postgres" && url.scheme() != "postgresql" {
            return Err(ConfigError::InvalidDsn(self.masked_dsn()));
        }

        if self.min_connections == 0
            || self.min_connections > self.max_connections
            || self.max_connections > 100
        {
            return Err(ConfigError::InvalidPoolBounds(
                self.min_connections,
                self.max_connections,
            ));
        }

        if !(1..=600).contains(&self.acquire_timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.acquire_timeout_secs));
        }

        Ok(())
    }

    /// DSN with the password replaced, safe for logs and `config --show`
    pub fn masked_dsn(&self) -> String {
        match Url::parse(&self.dsn) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("****"));
                }
                url.to_string()
            }
            Err(_) => "<unparseable DSN>".to_string(),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.ollama_url()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.url).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))
    }

    pub fn embedding_endpoint(&self) -> Result<Url, ConfigError> {
        self.ollama_url()?
            .join("/api/embeddings")
            .map_err(|_| ConfigError::InvalidUrl(self.url.clone()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=64).contains(&self.max_workers) {
            return Err(ConfigError::InvalidWorkerCount(self.max_workers));
        }

        if !(1..=10).contains(&self.max_retries) {
            return Err(ConfigError::InvalidRetryCount(self.max_retries));
        }

        if !self.retry_delay_secs.is_finite() || !(0.0..=60.0).contains(&self.retry_delay_secs) {
            return Err(ConfigError::InvalidRetryDelay(self.retry_delay_secs));
        }

        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }
}
