// Embedding provider abstraction and the bundled Ollama binding.

pub mod ollama;

pub use ollama::OllamaEmbedder;

use anyhow::Result;
use async_trait::async_trait;

/// A black-box batch embedder.
///
/// The output length equals the input length and every vector has the same
/// dimensionality. Vectors produced by providers with different `id`s are
/// incomparable; [`artifact_id`](EmbeddingProvider::artifact_id) isolates them
/// from one another in the durable cache and the table namespace.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn id(&self) -> &str;

    fn max_chunk_size(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn artifact_id(&self) -> String {
        format!("vectordb::{}", self.id())
    }
}
