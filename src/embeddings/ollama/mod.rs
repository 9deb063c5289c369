
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::PipelineError;
use crate::config::Config;
use crate::embeddings::Embedder;

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// HTTP client for the Ollama embeddings API.
///
/// The underlying agent pools connections and is shared by every clone, so
/// cloning the client per worker is cheap.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    endpoint: Url,
    model: String,
    dimension: usize,
    agent: ureq::Agent,
    max_workers: usize,
    retry_attempts: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;
        let endpoint = config
            .ollama
            .embedding_endpoint()
            .context("Failed to build embedding endpoint URL")?;
        let max_workers = config.pipeline.max_workers.max(1);

        Ok(Self {
            base_url,
            endpoint,
            model: config.ollama.model.clone(),
            dimension: config.embedding_dimension(),
            agent: build_agent(config.ollama.timeout(), max_workers),
            max_workers,
            retry_attempts: config.pipeline.max_retries.max(1),
            retry_delay: config.pipeline.retry_delay(),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout, self.max_workers);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[inline]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Test connection to Ollama server and verify model availability
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;

        if !models.iter().any(|m| self.matches_model(&m.name)) {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            return Err(anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                self.model,
                available
            ));
        }

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    // Ollama reports "name:tag"; an untagged configured model means ":latest"
    fn matches_model(&self, listed: &str) -> bool {
        listed == self.model
            || (!self.model.contains(':') && listed == format!("{}:latest", self.model))
    }

    /// Generate an embedding for a single text, with HTTP-level retry
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let request_json = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            prompt: text,
        })
        .context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(self.endpoint.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embedding")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        Ok(response.embedding)
    }

    /// Generate an embedding and reject vectors of the wrong dimension
    #[inline]
    pub fn generate_checked_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.generate_embedding(text)?;
        if embedding.len() != self.dimension {
            return Err(anyhow!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            ));
        }
        Ok(embedding)
    }

    /// Embed every text concurrently, at most `max_workers` requests in flight.
    ///
    /// Results land in a slot per input index, so output order always matches
    /// input order whatever order the requests finish in. An item that fails
    /// (or comes back with the wrong dimension) gets exactly one more attempt
    /// after the fan-out has joined; if that fails too the whole call fails.
    #[inline]
    pub async fn embed_texts(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating {} embeddings with up to {} workers",
            texts.len(),
            self.max_workers
        );

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut retry_indices = Vec::new();

        let mut completed = stream::iter(texts.to_vec().into_iter().enumerate())
            .map(|(index, text)| {
                let client = self.clone();
                async move { (index, client.embed_blocking(text).await) }
            })
            .buffer_unordered(self.max_workers);

        while let Some((index, outcome)) = completed.next().await {
            match outcome {
                Ok(embedding) => slots[index] = Some(embedding),
                Err(e) => {
                    warn!("Embedding {} failed, will retry once: {:#}", index, e);
                    retry_indices.push(index);
                }
            }
        }
        drop(completed);

        retry_indices.sort_unstable();
        for index in retry_indices {
            match self.clone().embed_blocking(texts[index].clone()).await {
                Ok(embedding) => slots[index] = Some(embedding),
                Err(e) => {
                    error!("Embedding {} failed after retry: {:#}", index, e);
                    return Err(PipelineError::Embedding(format!(
                        "Failed to generate embedding for index {} of {}: {:#}",
                        index,
                        texts.len(),
                        e
                    )));
                }
            }
        }

        slots.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
            PipelineError::Embedding("Embedding result slot left empty".to_string())
        })
    }

    async fn embed_blocking(self, text: String) -> Result<Vec<f32>> {
        tokio::task::spawn_blocking(move || self.generate_checked_embedding(&text))
            .await
            .context("Embedding worker panicked")?
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if RETRYABLE_STATUS_CODES.contains(status) {
                                warn!(
                                    "Transient status {}, attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Status {} is not retryable", status);
                                return Err(anyhow!("Request rejected: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = self.retry_delay * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow!("Request failed after retries")))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.embed_texts(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn build_agent(timeout: Duration, max_idle: usize) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .max_idle_connections_per_host(max_idle)
        .build()
        .into()
}
