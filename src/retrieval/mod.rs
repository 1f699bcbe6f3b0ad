
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chunks::Chunk;
use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::{CacheQueries, CacheRecord, EmbeddingCache};
use crate::embeddings::EmbeddingProvider;
use crate::tags::{BranchAndDir, IndexTag};

/// Per-tag result budget when a directory filter is applied; the filter is a
/// post-filter inside the store, so more candidates are requested than the
/// caller asked for.
pub const DIRECTORY_FILTER_LIMIT: usize = 300;

/// Nearest-neighbor retrieval over a set of tags, joined back to chunk text.
pub struct Retriever {
    vector_db_path: PathBuf,
    cache: EmbeddingCache,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    #[inline]
    pub fn new(config: &Config, cache: EmbeddingCache, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            vector_db_path: config.vector_db_path(),
            cache,
            provider,
        }
    }

    /// Return up to `n` chunks nearest to `query_text` across `tags`,
    /// ordered by ascending distance.
    ///
    /// Tags without a table contribute nothing; an empty `tags` list returns
    /// an empty result. With `filter_directory` set, each tag is searched
    /// with a `path LIKE '<dir>%'` predicate.
    pub async fn retrieve(
        &self,
        query_text: &str,
        n: usize,
        tags: &[BranchAndDir],
        filter_directory: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let query_vectors = self.provider.embed(&[query_text.to_string()]).await?;
        let query_vector = query_vectors
            .first()
            .ok_or_else(|| anyhow!("Embedding provider returned no vector for the query"))?;

        let store = VectorStore::open(&self.vector_db_path).await?;
        let artifact_id = self.provider.artifact_id();

        let mut hits = Vec::new();
        for pair in tags {
            let tag = IndexTag::from_branch_and_dir(pair, artifact_id.clone());
            let table_name = tag.table_name();

            if !store.has_table(&table_name).await? {
                warn!("No vector table for tag {}, skipping", table_name);
                continue;
            }

            let (limit, prefix) = match filter_directory {
                Some(dir) => (DIRECTORY_FILTER_LIMIT, Some(dir)),
                None => (n, None),
            };

            hits.extend(store.search(&table_name, query_vector, limit, prefix).await?);
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n);

        debug!("Retrieval kept {} hits across {} tags", hits.len(), tags.len());

        let uuids: Vec<String> = hits.iter().map(|h| h.uuid.clone()).collect();
        let records = CacheQueries::select_by_uuids(self.cache.pool(), &uuids).await?;
        let by_uuid: HashMap<&str, &CacheRecord> =
            records.iter().map(|r| (r.uuid.as_str(), r)).collect();

        let mut chunks = Vec::with_capacity(hits.len());
        for hit in &hits {
            // A row whose cache record is gone is expected mid-refresh; it
            // cannot be returned without its text.
            let Some(record) = by_uuid.get(hit.uuid.as_str()) else {
                warn!("No cache record for vector row {}, skipping", hit.uuid);
                continue;
            };

            chunks.push(Chunk {
                filepath: record.path.clone(),
                content: record.contents.clone(),
                start_line: record.start_line as u32,
                end_line: record.end_line as u32,
                digest: record.cache_key.clone(),
                index: 0,
            });
        }

        Ok(chunks)
    }
}
