use super::*;
use crate::chunks::Chunk;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;

struct MockProvider;

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn id(&self) -> &str {
        "mock-embedder"
    }

    fn max_chunk_size(&self) -> usize {
        128
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 1.0, 0.0, 0.0])
            .collect())
    }
}

struct LineChunker;

impl Chunker for LineChunker {
    fn chunk(
        &self,
        path: &str,
        contents: &str,
        _max_chunk_size: usize,
        digest: &str,
    ) -> Result<Vec<Chunk>> {
        Ok(contents
            .lines()
            .enumerate()
            .map(|(i, line)| Chunk {
                filepath: path.to_string(),
                content: line.to_string(),
                start_line: i as u32 + 1,
                end_line: i as u32 + 1,
                digest: digest.to_string(),
                index: i as u32,
            })
            .collect())
    }
}

struct MemoryReader {
    files: HashMap<String, String>,
}

#[async_trait]
impl FileReader for MemoryReader {
    async fn read(&self, path: &str) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {path}"))
    }
}

async fn create_test_index(files: &[(&str, &str)]) -> (VectorIndex, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    let reader = Arc::new(MemoryReader {
        files: files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect(),
    });

    let index = VectorIndex::new(
        &config,
        Arc::new(MockProvider),
        Arc::new(LineChunker),
        reader,
        None,
    )
    .await
    .expect("should build index");

    (index, temp_dir)
}

fn test_tag(index: &VectorIndex) -> IndexTag {
    index.tag(&crate::tags::BranchAndDir {
        branch: "main".to_string(),
        directory: "/workspace".to_string(),
    })
}

type Completions = Arc<Mutex<Vec<(Vec<PathAndCacheKey>, IndexResultType)>>>;

/// Records completions, ignoring the empty batch calls the remove-tag and
/// delete steps emit when they have no items.
fn completion_recorder() -> (Completions, MarkComplete) {
    let log: Completions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let mark_complete: MarkComplete = Box::new(move |items, kind| {
        if !items.is_empty() {
            sink.lock()
                .expect("completion log is never poisoned")
                .push((items.to_vec(), kind));
        }
    });
    (log, mark_complete)
}

async fn drive(
    stream: impl futures::Stream<Item = Result<IndexingProgressUpdate>> + Send,
) -> Vec<IndexingProgressUpdate> {
    use futures::StreamExt;
    Box::pin(stream)
        .map(|event| event.expect("update step succeeds"))
        .collect()
        .await
}

#[tokio::test]
async fn empty_results_produce_only_the_terminal_event() {
    let (index, _temp_dir) = create_test_index(&[]).await;
    let (log, mark_complete) = completion_recorder();

    let events = drive(index.update(
        test_tag(&index),
        RefreshIndexResults::default(),
        mark_complete,
        None,
    ))
    .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].progress, 1.0);
    assert_eq!(events[0].status, IndexingStatus::Done);
    assert!(log.lock().expect("log available").is_empty());
}

#[tokio::test]
async fn progress_is_monotone_and_bounded() {
    let (index, _temp_dir) =
        create_test_index(&[("a.rs", "one\ntwo\nthree\n"), ("b.rs", "four\n")]).await;
    let (_log, mark_complete) = completion_recorder();

    let results = RefreshIndexResults {
        compute: vec![
            PathAndCacheKey::new("a.rs", "k1"),
            PathAndCacheKey::new("b.rs", "k2"),
        ],
        ..RefreshIndexResults::default()
    };

    let events = drive(index.update(test_tag(&index), results, mark_complete, None)).await;

    assert!(events.len() > 1);
    assert!(events
        .windows(2)
        .all(|w| w[0].progress <= w[1].progress));
    assert!(events.iter().all(|e| e.progress <= 1.0));
    assert_eq!(events.last().expect("terminal event").progress, 1.0);
    assert_eq!(
        events.last().expect("terminal event").status,
        IndexingStatus::Done
    );
}

#[tokio::test]
async fn remove_tag_without_a_table_still_marks_complete() {
    let (index, _temp_dir) = create_test_index(&[]).await;
    let (log, mark_complete) = completion_recorder();

    let item = PathAndCacheKey::new("gone.rs", "k1");
    let results = RefreshIndexResults {
        remove_tag: vec![item.clone()],
        ..RefreshIndexResults::default()
    };

    let events = drive(index.update(test_tag(&index), results, mark_complete, None)).await;

    assert_eq!(events.last().expect("terminal event").progress, 1.0);
    let log = log.lock().expect("log available");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], (vec![item], IndexResultType::RemoveTag));
}

#[tokio::test]
async fn add_tag_with_no_cached_records_marks_complete_without_a_table() {
    let (index, _temp_dir) = create_test_index(&[]).await;
    let (log, mark_complete) = completion_recorder();

    let item = PathAndCacheKey::new("never-computed.rs", "k1");
    let results = RefreshIndexResults {
        add_tag: vec![item.clone()],
        ..RefreshIndexResults::default()
    };

    let tag = test_tag(&index);
    let table_name = tag.table_name();
    drive(index.update(tag, results, mark_complete, None)).await;

    let log = log.lock().expect("log available");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], (vec![item], IndexResultType::AddTag));

    // No rows were available, so no table came into existence.
    let store = VectorStore::open(&index.vector_db_path)
        .await
        .expect("should open store");
    assert!(!store.has_table(&table_name).await.expect("should list"));
}

#[tokio::test]
async fn unpolled_update_does_no_work() {
    let (index, _temp_dir) = create_test_index(&[("a.rs", "one\n")]).await;
    let (log, mark_complete) = completion_recorder();

    let results = RefreshIndexResults {
        compute: vec![PathAndCacheKey::new("a.rs", "k1")],
        ..RefreshIndexResults::default()
    };

    let stream = index.update(test_tag(&index), results, mark_complete, None);
    drop(stream);

    let records =
        CacheQueries::select_by_key(index.cache().pool(), &index.artifact_id(), "k1", "a.rs")
            .await
            .expect("should query cache");
    assert!(records.is_empty());
    assert!(log.lock().expect("log available").is_empty());
}
