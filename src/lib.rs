use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Remote cache error: {0}")]
    RemoteCache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunks;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod remote;
pub mod retrieval;
pub mod tags;
