use super::*;
use crate::config::RemoteCacheConfig;

#[test]
fn from_config_is_none_when_disabled() {
    let config = Config {
        embedding: Default::default(),
        remote_cache: RemoteCacheConfig::default(),
        base_dir: Default::default(),
    };

    assert!(HttpRemoteCache::from_config(&config)
        .expect("disabled config is valid")
        .is_none());
}

#[test]
fn from_config_builds_client_when_enabled() {
    let config = Config {
        embedding: Default::default(),
        remote_cache: RemoteCacheConfig {
            enabled: true,
            url: Some("https://cache.example.com".to_string()),
            timeout_seconds: 5,
        },
        base_dir: Default::default(),
    };

    let client = HttpRemoteCache::from_config(&config)
        .expect("config is valid")
        .expect("client should be built");
    assert!(client.connected());
}

#[test]
fn request_serialization_shape() {
    let keys = vec!["k1".to_string(), "k2".to_string()];
    let request = CacheGetRequest {
        label: "embeddings",
        repo_name: "acme/widgets",
        keys: &keys,
    };

    let json = serde_json::to_string(&request).expect("can serialize json");
    assert!(json.contains("\"label\":\"embeddings\""));
    assert!(json.contains("\"repoName\":\"acme/widgets\""));
    assert!(json.contains("\"keys\":[\"k1\",\"k2\"]"));
}

#[test]
fn response_parsing() {
    let json = r#"{
        "files": {
            "k1": [
                {"vector": [0.1, 0.2], "startLine": 1, "endLine": 5, "contents": "fn a() {}"},
                {"vector": [0.3, 0.4], "startLine": 6, "endLine": 9, "contents": "fn b() {}"}
            ]
        }
    }"#;

    let response: CacheGetResponse = serde_json::from_str(json).expect("can parse json");
    let chunks = response.files.get("k1").expect("k1 present");

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].start_line, 1);
    assert_eq!(chunks[0].end_line, 5);
    assert_eq!(chunks[1].contents, "fn b() {}");
}
