
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A bounded contiguous fragment of a source file.
///
/// `digest` identifies the file-content version the chunk was cut from;
/// `start_line` and `end_line` are inclusive and refer to that version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub filepath: String,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    pub digest: String,
    pub index: u32,
}

/// Splits file contents into chunks no larger than `max_chunk_size`.
pub trait Chunker: Send + Sync {
    fn chunk(
        &self,
        path: &str,
        contents: &str,
        max_chunk_size: usize,
        digest: &str,
    ) -> Result<Vec<Chunk>>;
}

/// Reads workspace files for the compute pipeline.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, path: &str) -> Result<String>;
}
