
use anyhow::Result;
use async_stream::try_stream;
use futures::Stream;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::PathAndCacheKey;
use crate::chunks::{Chunker, FileReader};
use crate::database::sqlite::CacheRecord;
use crate::embeddings::EmbeddingProvider;

/// Files chunking into more pieces than this are skipped outright; embedding
/// cost per file stays bounded. A file of exactly this many chunks is indexed.
pub const MAX_CHUNKS_PER_FILE: usize = 20;

/// Event emitted while computing embeddings for a list of file versions.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// One embedded chunk, ready to be persisted. `progress` covers the whole
    /// input list, advancing as `(i + j/|chunks|) / |items|`.
    Chunk {
        progress: f64,
        record: CacheRecord,
        desc: String,
    },
    /// All chunks of `item` have been emitted; the caller can flush its batch
    /// and mark the item complete.
    FileDone { item: PathAndCacheKey },
}

/// Chunk → embed → record pipeline over an ordered list of file versions.
///
/// Per-file failures (unreadable file, chunker error, empty chunk, oversized
/// chunk count, embedding failure) skip the file: it emits nothing, is never
/// marked complete, and reappears in a later refresh. A provider returning
/// the wrong number of vectors is a contract violation and fails the stream.
pub struct ComputePipeline {
    reader: Arc<dyn FileReader>,
    chunker: Arc<dyn Chunker>,
    provider: Arc<dyn EmbeddingProvider>,
    artifact_id: String,
}

impl ComputePipeline {
    #[inline]
    pub fn new(
        reader: Arc<dyn FileReader>,
        chunker: Arc<dyn Chunker>,
        provider: Arc<dyn EmbeddingProvider>,
        artifact_id: String,
    ) -> Self {
        Self {
            reader,
            chunker,
            provider,
            artifact_id,
        }
    }

    pub fn run(
        self,
        items: Vec<PathAndCacheKey>,
    ) -> impl Stream<Item = Result<PipelineEvent>> + Send {
        try_stream! {
            let total = items.len();

            for (i, item) in items.into_iter().enumerate() {
                let contents = match self.reader.read(&item.path).await {
                    Ok(contents) => contents,
                    Err(e) => {
                        warn!("Failed to read {}, skipping: {}", item.path, e);
                        continue;
                    }
                };

                let chunks = match self.chunker.chunk(
                    &item.path,
                    &contents,
                    self.provider.max_chunk_size(),
                    &item.cache_key,
                ) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!("Failed to chunk {}, skipping: {}", item.path, e);
                        continue;
                    }
                };

                if chunks.iter().any(|c| c.content.is_empty()) {
                    warn!("Empty chunk in {}, skipping", item.path);
                    continue;
                }

                if chunks.len() > MAX_CHUNKS_PER_FILE {
                    warn!(
                        "{} chunks into {} pieces, over the {} limit, skipping",
                        item.path,
                        chunks.len(),
                        MAX_CHUNKS_PER_FILE
                    );
                    continue;
                }

                let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
                let embeddings = match self.provider.embed(&texts).await {
                    Ok(embeddings) => embeddings,
                    Err(e) => {
                        warn!("Failed to embed {}, skipping: {}", item.path, e);
                        continue;
                    }
                };

                if embeddings.len() != chunks.len() {
                    Err(anyhow::anyhow!(
                        "Embedding provider returned {} vectors for {} chunks",
                        embeddings.len(),
                        chunks.len()
                    ))?;
                }

                let chunk_count = chunks.len();
                for (j, (chunk, vector)) in chunks.into_iter().zip(embeddings).enumerate() {
                    let record = CacheRecord {
                        uuid: Uuid::new_v4().to_string(),
                        cache_key: item.cache_key.clone(),
                        path: item.path.clone(),
                        artifact_id: self.artifact_id.clone(),
                        vector,
                        start_line: i64::from(chunk.start_line),
                        end_line: i64::from(chunk.end_line),
                        contents: chunk.content,
                    };

                    let progress =
                        (i as f64 + j as f64 / chunk_count as f64) / total as f64;

                    yield PipelineEvent::Chunk {
                        progress,
                        record,
                        desc: format!("Indexing {}", item.path),
                    };
                }

                yield PipelineEvent::FileDone { item };
            }
        }
    }
}
