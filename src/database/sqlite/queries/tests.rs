use super::*;
use crate::database::sqlite::EmbeddingCache;
use anyhow::Result;
use tempfile::TempDir;

async fn create_test_cache() -> Result<(TempDir, EmbeddingCache)> {
    let temp_dir = TempDir::new()?;
    let cache = EmbeddingCache::open(temp_dir.path().join("index.sqlite")).await?;
    Ok((temp_dir, cache))
}

fn test_record(uuid: &str, cache_key: &str, path: &str) -> CacheRecord {
    CacheRecord {
        uuid: uuid.to_string(),
        cache_key: cache_key.to_string(),
        path: path.to_string(),
        artifact_id: "vectordb::p1".to_string(),
        vector: vec![0.1, 0.2, 0.3],
        start_line: 1,
        end_line: 4,
        contents: format!("contents of {path}"),
    }
}

#[tokio::test]
async fn insert_and_select_by_key() -> Result<()> {
    let (_temp_dir, cache) = create_test_cache().await?;

    CacheQueries::insert(cache.pool(), &test_record("u1", "k1", "a.rs")).await?;
    CacheQueries::insert(cache.pool(), &test_record("u2", "k1", "a.rs")).await?;
    CacheQueries::insert(cache.pool(), &test_record("u3", "k2", "b.rs")).await?;

    let records = CacheQueries::select_by_key(cache.pool(), "vectordb::p1", "k1", "a.rs").await?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.cache_key == "k1" && r.path == "a.rs"));
    assert_eq!(records[0].vector, vec![0.1, 0.2, 0.3]);

    Ok(())
}

#[tokio::test]
async fn select_by_key_isolates_artifacts() -> Result<()> {
    let (_temp_dir, cache) = create_test_cache().await?;

    let mut record = test_record("u1", "k1", "a.rs");
    CacheQueries::insert(cache.pool(), &record).await?;

    record.uuid = "u2".to_string();
    record.artifact_id = "vectordb::p2".to_string();
    CacheQueries::insert(cache.pool(), &record).await?;

    let p1 = CacheQueries::select_by_key(cache.pool(), "vectordb::p1", "k1", "a.rs").await?;
    let p2 = CacheQueries::select_by_key(cache.pool(), "vectordb::p2", "k1", "a.rs").await?;

    assert_eq!(p1.len(), 1);
    assert_eq!(p2.len(), 1);
    assert_ne!(p1[0].uuid, p2[0].uuid);

    Ok(())
}

#[tokio::test]
async fn select_by_uuids_returns_matching_subset() -> Result<()> {
    let (_temp_dir, cache) = create_test_cache().await?;

    for uuid in ["u1", "u2", "u3"] {
        CacheQueries::insert(cache.pool(), &test_record(uuid, "k1", "a.rs")).await?;
    }

    let uuids = vec!["u1".to_string(), "u3".to_string(), "missing".to_string()];
    let records = CacheQueries::select_by_uuids(cache.pool(), &uuids).await?;

    let mut found: Vec<&str> = records.iter().map(|r| r.uuid.as_str()).collect();
    found.sort_unstable();
    assert_eq!(found, vec!["u1", "u3"]);

    Ok(())
}

#[tokio::test]
async fn select_by_uuids_with_empty_input() -> Result<()> {
    let (_temp_dir, cache) = create_test_cache().await?;

    let records = CacheQueries::select_by_uuids(cache.pool(), &[]).await?;
    assert!(records.is_empty());

    Ok(())
}

#[tokio::test]
async fn delete_by_key_removes_all_chunks_of_the_file_version() -> Result<()> {
    let (_temp_dir, cache) = create_test_cache().await?;

    CacheQueries::insert(cache.pool(), &test_record("u1", "k1", "a.rs")).await?;
    CacheQueries::insert(cache.pool(), &test_record("u2", "k1", "a.rs")).await?;
    CacheQueries::insert(cache.pool(), &test_record("u3", "k2", "a.rs")).await?;

    let deleted = CacheQueries::delete_by_key(cache.pool(), "vectordb::p1", "k1", "a.rs").await?;
    assert_eq!(deleted, 2);

    let remaining = CacheQueries::select_by_key(cache.pool(), "vectordb::p1", "k2", "a.rs").await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].uuid, "u3");

    Ok(())
}

#[tokio::test]
async fn duplicate_uuid_insert_fails() -> Result<()> {
    let (_temp_dir, cache) = create_test_cache().await?;

    CacheQueries::insert(cache.pool(), &test_record("u1", "k1", "a.rs")).await?;
    let result = CacheQueries::insert(cache.pool(), &test_record("u1", "k9", "z.rs")).await;

    assert!(result.is_err());
    Ok(())
}
