#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;

const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// One precomputed chunk as served by the remote cache. Chunks share the
/// file's cache-key; the server guarantees dimensionality agreement with the
/// local artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCacheChunk {
    pub vector: Vec<f32>,
    #[serde(rename = "startLine")]
    pub start_line: i64,
    #[serde(rename = "endLine")]
    pub end_line: i64,
    pub contents: String,
}

/// Optional source of precomputed embeddings, keyed by cache-key batch.
///
/// Any failure here is recoverable: the coordinator falls back to local
/// compute for the whole request set.
#[async_trait]
pub trait RemoteEmbeddingsCache: Send + Sync {
    fn connected(&self) -> bool;

    async fn get(
        &self,
        keys: &[String],
        label: &str,
        repo_name: &str,
    ) -> Result<HashMap<String, Vec<RemoteCacheChunk>>>;
}

#[derive(Debug, Serialize)]
struct CacheGetRequest<'a> {
    label: &'a str,
    #[serde(rename = "repoName")]
    repo_name: &'a str,
    keys: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CacheGetResponse {
    files: HashMap<String, Vec<RemoteCacheChunk>>,
}

/// HTTP binding of [`RemoteEmbeddingsCache`].
#[derive(Debug, Clone)]
pub struct HttpRemoteCache {
    base_url: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl HttpRemoteCache {
    /// Build a client when the config enables one; `Ok(None)` means no remote
    /// cache is configured.
    #[inline]
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(base_url) = config
            .remote_cache_url()
            .context("Invalid remote cache configuration")?
        else {
            return Ok(None);
        };

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.remote_cache.timeout_seconds)))
            .build()
            .into();

        Ok(Some(Self {
            base_url,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }))
    }

    fn get_sync(
        &self,
        keys: &[String],
        label: &str,
        repo_name: &str,
    ) -> Result<HashMap<String, Vec<RemoteCacheChunk>>> {
        let request = CacheGetRequest {
            label,
            repo_name,
            keys,
        };

        let url = self
            .base_url
            .join("/cache/get")
            .context("Failed to build remote cache URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize cache request")?;

        let mut last_error = None;
        for attempt in 1..=self.retry_attempts {
            let result = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string());

            match result {
                Ok(response_text) => {
                    let response: CacheGetResponse = serde_json::from_str(&response_text)
                        .context("Failed to parse cache response")?;
                    debug!(
                        "Remote cache answered {} of {} keys",
                        response.files.len(),
                        keys.len()
                    );
                    return Ok(response.files);
                }
                Err(error) => {
                    debug!(
                        "Remote cache request failed (attempt {}/{}): {}",
                        attempt, self.retry_attempts, error
                    );
                    last_error = Some(anyhow::anyhow!("Request error: {}", error));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }
}

#[async_trait]
impl RemoteEmbeddingsCache for HttpRemoteCache {
    #[inline]
    fn connected(&self) -> bool {
        true
    }

    async fn get(
        &self,
        keys: &[String],
        label: &str,
        repo_name: &str,
    ) -> Result<HashMap<String, Vec<RemoteCacheChunk>>> {
        let client = self.clone();
        let keys = keys.to_vec();
        let label = label.to_string();
        let repo_name = repo_name.to_string();
        tokio::task::spawn_blocking(move || client.get_sync(&keys, &label, &repo_name))
            .await
            .context("Remote cache task panicked")?
    }
}
