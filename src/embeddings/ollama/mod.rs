
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Batch embedder backed by an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: Url,
    model: String,
    max_chunk_size: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .embedding
            .server_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.embedding.model.clone(),
            max_chunk_size: config.embedding.max_chunk_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn embed_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = BatchEmbedRequest {
            model: &self.model,
            inputs: texts,
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embeddings")?;

        let response: BatchEmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let retryable = match &error {
                        ureq::Error::StatusCode(status) => *status >= 500,
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => true,
                        _ => false,
                    };

                    if !retryable {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    warn!(
                        "Embedding request failed (attempt {}/{}): {}",
                        attempt, self.retry_attempts, error
                    );
                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    #[inline]
    fn id(&self) -> &str {
        &self.model
    }

    #[inline]
    fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || client.embed_sync(&texts))
            .await
            .context("Embedding task panicked")?
    }
}
