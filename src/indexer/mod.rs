// Refresh coordinator
// Drives the four-phase update protocol over the embedding cache and the
// per-tag vector tables, streaming progress back to the caller.

pub mod pipeline;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunks::{Chunker, FileReader};
use crate::config::Config;
use crate::database::lancedb::{ChunkRow, VectorStore};
use crate::database::sqlite::{CacheQueries, CacheRecord, EmbeddingCache};
use crate::embeddings::EmbeddingProvider;
use crate::indexer::pipeline::{ComputePipeline, PipelineEvent};
use crate::remote::RemoteEmbeddingsCache;
use crate::tags::{BranchAndDir, IndexTag};

/// Label under which the remote cache stores precomputed embeddings.
pub const EMBEDDINGS_LABEL: &str = "embeddings";

/// Share of the progress range consumed by the compute phase; the add-tag,
/// table-delete and cache-delete phases split the rest evenly.
const COMPUTE_PROGRESS_SHARE: f64 = 0.9;
const TAIL_PHASES: f64 = 3.0;

/// One file version, as named by the upstream refresh producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathAndCacheKey {
    pub path: String,
    pub cache_key: String,
}

impl PathAndCacheKey {
    #[inline]
    pub fn new(path: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cache_key: cache_key.into(),
        }
    }
}

/// The four disjoint operation classes produced by the upstream diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshIndexResults {
    /// Not yet embedded under this artifact; compute and add to the tag.
    pub compute: Vec<PathAndCacheKey>,
    /// Already in the cache; add to this tag's table without recomputing.
    pub add_tag: Vec<PathAndCacheKey>,
    /// Remove from this tag's table only.
    pub remove_tag: Vec<PathAndCacheKey>,
    /// Remove from the tag's table and from the cache.
    pub del: Vec<PathAndCacheKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexResultType {
    Compute,
    AddTag,
    RemoveTag,
    Delete,
}

/// Completion callback from the upstream refresh producer. Invoked exactly
/// once per item per applicable result type, after the corresponding store
/// write is durable.
pub type MarkComplete = Box<dyn Fn(&[PathAndCacheKey], IndexResultType) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingStatus {
    Indexing,
    Done,
}

/// One progress event from an [`VectorIndex::update`] stream. `progress` is
/// monotone non-decreasing and bounded by 1.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingProgressUpdate {
    pub progress: f64,
    pub desc: String,
    pub status: IndexingStatus,
}

/// The per-workspace, per-provider vector index engine.
///
/// Owns the durable embedding cache handle (opened once, migrations applied
/// at open) and coordinates it with the per-tag vector tables. Collaborators
/// are injected as capabilities; none of them is subclassed or owned beyond
/// the trait surface.
pub struct VectorIndex {
    vector_db_path: PathBuf,
    cache: EmbeddingCache,
    provider: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
    reader: Arc<dyn FileReader>,
    remote_cache: Option<Arc<dyn RemoteEmbeddingsCache>>,
}

impl VectorIndex {
    #[inline]
    pub async fn new(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
        chunker: Arc<dyn Chunker>,
        reader: Arc<dyn FileReader>,
        remote_cache: Option<Arc<dyn RemoteEmbeddingsCache>>,
    ) -> Result<Self> {
        let cache = EmbeddingCache::open(config.cache_db_path()).await?;

        Ok(Self {
            vector_db_path: config.vector_db_path(),
            cache,
            provider,
            chunker,
            reader,
            remote_cache,
        })
    }

    #[inline]
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    #[inline]
    pub fn artifact_id(&self) -> String {
        self.provider.artifact_id()
    }

    /// Full tag for a caller-facing `(branch, directory)` pair under this
    /// index's artifact.
    #[inline]
    pub fn tag(&self, tag: &BranchAndDir) -> IndexTag {
        IndexTag::from_branch_and_dir(tag, self.artifact_id())
    }

    /// Drive one incremental refresh for `tag`.
    ///
    /// The returned stream is lazy: the engine advances only while the caller
    /// polls it, and dropping the stream cancels the update at its next
    /// suspension point. Callers must serialize updates over the same tag.
    ///
    /// Within the stream, cache writes precede vector-table writes for the
    /// same file, `mark_complete` for an item follows its vector-table write,
    /// and rows of one file are fully flushed before the next file's marker.
    pub fn update(
        &self,
        tag: IndexTag,
        results: RefreshIndexResults,
        mark_complete: MarkComplete,
        repo_name: Option<String>,
    ) -> impl Stream<Item = Result<IndexingProgressUpdate>> + Send + '_ {
        try_stream! {
            let table_name = tag.table_name();
            let artifact_id = self.artifact_id();
            let store = VectorStore::open(&self.vector_db_path).await?;

            info!(
                "Updating index {}: {} compute, {} add-tag, {} remove-tag, {} delete",
                table_name,
                results.compute.len(),
                results.add_tag.len(),
                results.remove_tag.len(),
                results.del.len()
            );

            let RefreshIndexResults { compute, add_tag, remove_tag, del } = results;
            let compute_total = compute.len();
            let mut remaining = compute;
            let mut last_progress = 0.0_f64;

            // Ask the remote cache for precomputed embeddings first; whatever
            // it answers never reaches the local pipeline. Failures degrade to
            // computing the full set locally.
            if let Some(remote) = &self.remote_cache {
                if remote.connected() && !remaining.is_empty() {
                    let keys: Vec<String> =
                        remaining.iter().map(|i| i.cache_key.clone()).collect();

                    match remote
                        .get(&keys, EMBEDDINGS_LABEL, repo_name.as_deref().unwrap_or(""))
                        .await
                    {
                        Ok(files) => {
                            let mut answered = 0_usize;
                            for (cache_key, chunks) in files {
                                let Some(pos) =
                                    remaining.iter().position(|i| i.cache_key == cache_key)
                                else {
                                    warn!(
                                        "Remote cache returned unknown cache-key {}, dropping",
                                        cache_key
                                    );
                                    continue;
                                };
                                let item = remaining.remove(pos);

                                let mut rows = Vec::with_capacity(chunks.len());
                                for chunk in chunks {
                                    let record = CacheRecord {
                                        uuid: Uuid::new_v4().to_string(),
                                        cache_key: item.cache_key.clone(),
                                        path: item.path.clone(),
                                        artifact_id: artifact_id.clone(),
                                        vector: chunk.vector,
                                        start_line: chunk.start_line,
                                        end_line: chunk.end_line,
                                        contents: chunk.contents,
                                    };
                                    CacheQueries::insert(self.cache.pool(), &record).await?;
                                    rows.push(ChunkRow::from(&record));
                                }

                                store.add_rows(&table_name, &rows).await?;
                                mark_complete(
                                    std::slice::from_ref(&item),
                                    IndexResultType::Compute,
                                );

                                answered += 1;
                                let progress = answered as f64 / compute_total as f64
                                    * COMPUTE_PROGRESS_SHARE;
                                last_progress = last_progress.max(progress);
                                yield IndexingProgressUpdate {
                                    progress: last_progress,
                                    desc: format!("Indexing {}", item.path),
                                    status: IndexingStatus::Indexing,
                                };
                            }
                            debug!(
                                "Remote cache answered {}/{} compute items",
                                answered, compute_total
                            );
                        }
                        Err(e) => {
                            warn!("Remote embeddings cache unavailable, computing locally: {}", e);
                        }
                    }
                }
            }

            // Local compute over whatever the remote did not answer. Each
            // record is durably cached before the tag's table sees its row, so
            // a failure after the cache write leaves recoverable state.
            if !remaining.is_empty() {
                let compute_base = last_progress;
                let pipeline = ComputePipeline::new(
                    Arc::clone(&self.reader),
                    Arc::clone(&self.chunker),
                    Arc::clone(&self.provider),
                    artifact_id.clone(),
                );

                let events = pipeline.run(remaining);
                futures::pin_mut!(events);

                let mut batch: Vec<ChunkRow> = Vec::new();
                while let Some(event) = events.next().await {
                    match event? {
                        PipelineEvent::Chunk { progress, record, desc } => {
                            CacheQueries::insert(self.cache.pool(), &record).await?;
                            batch.push(ChunkRow::from(&record));

                            let scaled = compute_base
                                + progress * (COMPUTE_PROGRESS_SHARE - compute_base);
                            last_progress = last_progress.max(scaled);
                            yield IndexingProgressUpdate {
                                progress: last_progress,
                                desc,
                                status: IndexingStatus::Indexing,
                            };
                        }
                        PipelineEvent::FileDone { item } => {
                            store.add_rows(&table_name, &batch).await?;
                            batch.clear();
                            mark_complete(
                                std::slice::from_ref(&item),
                                IndexResultType::Compute,
                            );
                        }
                    }
                }
            }

            // Add-tag: rebuild rows from the cache, no recomputation.
            let tail_share = (1.0 - COMPUTE_PROGRESS_SHARE) / TAIL_PHASES;
            for (i, item) in add_tag.iter().enumerate() {
                let records = CacheQueries::select_by_key(
                    self.cache.pool(),
                    &artifact_id,
                    &item.cache_key,
                    &item.path,
                )
                .await?;
                let rows: Vec<ChunkRow> = records.iter().map(ChunkRow::from).collect();

                store.add_rows(&table_name, &rows).await?;
                mark_complete(std::slice::from_ref(item), IndexResultType::AddTag);

                let progress = COMPUTE_PROGRESS_SHARE
                    + (i + 1) as f64 / add_tag.len() as f64 * tail_share;
                last_progress = last_progress.max(progress);
                yield IndexingProgressUpdate {
                    progress: last_progress,
                    desc: format!("Adding {}", item.path),
                    status: IndexingStatus::Indexing,
                };
            }

            // Remove-tag and delete share the table-deletion step.
            let table_deletes: Vec<PathAndCacheKey> =
                remove_tag.iter().chain(del.iter()).cloned().collect();
            if !table_deletes.is_empty() && store.has_table(&table_name).await? {
                for (i, item) in table_deletes.iter().enumerate() {
                    store
                        .delete_where(&table_name, &item.cache_key, &item.path)
                        .await?;

                    let progress = COMPUTE_PROGRESS_SHARE + tail_share
                        + (i + 1) as f64 / table_deletes.len() as f64 * tail_share;
                    last_progress = last_progress.max(progress);
                    yield IndexingProgressUpdate {
                        progress: last_progress,
                        desc: format!("Removing {}", item.path),
                        status: IndexingStatus::Indexing,
                    };
                }
            }
            mark_complete(&remove_tag, IndexResultType::RemoveTag);

            // Only delete drops the system of record.
            for (i, item) in del.iter().enumerate() {
                CacheQueries::delete_by_key(
                    self.cache.pool(),
                    &artifact_id,
                    &item.cache_key,
                    &item.path,
                )
                .await?;

                let progress = COMPUTE_PROGRESS_SHARE + 2.0 * tail_share
                    + (i + 1) as f64 / del.len() as f64 * tail_share;
                last_progress = last_progress.max(progress);
                yield IndexingProgressUpdate {
                    progress: last_progress,
                    desc: format!("Deleting {}", item.path),
                    status: IndexingStatus::Indexing,
                };
            }
            mark_complete(&del, IndexResultType::Delete);

            yield IndexingProgressUpdate {
                progress: 1.0,
                desc: "Completed indexing".to_string(),
                status: IndexingStatus::Done,
            };
        }
    }
}
