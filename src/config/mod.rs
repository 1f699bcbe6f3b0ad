
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub remote_cache: RemoteCacheConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    /// Upper bound, in characters, handed to the chunker for a single chunk.
    pub max_chunk_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

/// Optional server holding precomputed embeddings keyed by cache-key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteCacheConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid max chunk size: {0} (must be between 64 and 8192)")]
    InvalidMaxChunkSize(usize),
    #[error("Remote cache is enabled but no URL is configured")]
    MissingRemoteCacheUrl,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embedding: EmbeddingConfig::default(),
                remote_cache: RemoteCacheConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        if self.remote_cache.enabled && self.remote_cache.url.is_none() {
            return Err(ConfigError::MissingRemoteCacheUrl);
        }
        if let Some(url) = &self.remote_cache.url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }
        Ok(())
    }

    /// Root directory of the LanceDB database holding the per-tag vector tables.
    #[inline]
    pub fn vector_db_path(&self) -> PathBuf {
        self.base_dir.join("lancedb")
    }

    /// Path of the SQLite file backing the durable embedding cache.
    #[inline]
    pub fn cache_db_path(&self) -> PathBuf {
        self.base_dir.join("index.sqlite")
    }

    #[inline]
    pub fn remote_cache_url(&self) -> Result<Option<Url>, ConfigError> {
        if !self.remote_cache.enabled {
            return Ok(None);
        }
        match &self.remote_cache.url {
            Some(url) => Ok(Some(
                Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?,
            )),
            None => Err(ConfigError::MissingRemoteCacheUrl),
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=8192).contains(&self.max_chunk_size) {
            return Err(ConfigError::InvalidMaxChunkSize(self.max_chunk_size));
        }

        Ok(())
    }

    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}
