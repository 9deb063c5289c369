// Configuration management module
// TOML file settings with environment variable overrides

pub mod settings;

pub use settings::{
    Config, ConfigError, DEFAULT_EMBEDDING_DIMENSION, DatabaseConfig, OllamaConfig,
    PipelineConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

/// Print the effective configuration
#[inline]
pub fn show_config(config: &Config) {
    println!("Database:");
    println!("  DSN: {}", config.database.masked_dsn());
    println!(
        "  Pool: {}..{} connections",
        config.database.min_connections, config.database.max_connections
    );
    println!("Embedding service:");
    println!("  URL: {}", config.ollama.url);
    println!("  Model: {}", config.ollama.model);
    println!("  Dimension: {}", config.ollama.embedding_dimension);
    println!("  Timeout: {}s", config.ollama.timeout_secs);
    println!("Pipeline:");
    println!("  Batch size: {}", config.pipeline.batch_size);
    println!("  Max workers: {}", config.pipeline.max_workers);
    println!("  Max retries: {}", config.pipeline.max_retries);
    println!("  Retry delay: {}s", config.pipeline.retry_delay_secs);
}
