use std::{env, sync::Once};

use rustybot::{
    build_service, build_store, config,
    embedding::{EmbeddingClient, EmbeddingClientFactory, EmbeddingProvider},
    processing::{Document, IngestRequest, ProfileConfig, SearchRequest},
    qdrant::QdrantService,
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("STORAGE_BACKEND", "qdrant");
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("QDRANT_COLLECTION_PREFIX", "rusty-bot-live");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_collections_are_created() {
    init_config_once();
    let config = config::get_config();
    build_store(config)
        .await
        .expect("Qdrant should be reachable and accept collection setup");

    let url = config.qdrant_url.as_deref().expect("QDRANT_URL set");
    let service = QdrantService::new(url, config.qdrant_api_key.clone())
        .expect("valid Qdrant url");
    let collections = service.list_collections().await.expect("list collections");
    for suffix in ["profiles", "chunks"] {
        let expected = format!("{}-{suffix}", config.qdrant_collection_prefix);
        assert!(collections.contains(&expected), "missing collection {expected}");
    }
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let config = config::get_config();
    let provider = EmbeddingProvider::from_config(config).expect("provider");
    let client = provider.client_for(None).expect("client");
    let vectors = client
        .generate_embeddings(vec!["rusty-bot live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(vectors[0].len(), config.embedding_dimension, "embedding dimension mismatch");
}

#[tokio::test]
#[ignore = "Requires live Qdrant and Ollama"]
async fn live_ingest_search_delete() {
    init_config_once();
    let service = build_service(config::get_config()).await.expect("service");

    let outcome = service
        .ingest(IngestRequest {
            profile: ProfileConfig {
                name: "Live bot".into(),
                model: "llama3".into(),
                owner: "live-test".into(),
                ..ProfileConfig::default()
            },
            documents: vec![Document::new(
                "live.txt",
                "text/plain",
                b"Rust ownership rules prevent data races at compile time.".to_vec(),
            )],
            credential: None,
        })
        .await
        .expect("ingest");

    let hits = service
        .search(SearchRequest {
            profile_id: outcome.profile.id,
            query_text: "data races".into(),
            top_k: Some(1),
            credential: None,
        })
        .await
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.file_name, "live.txt");

    assert!(service.delete_profile(outcome.profile.id).await.expect("delete"));
    assert!(service.get_profile(outcome.profile.id).await.expect("get").is_none());
}
