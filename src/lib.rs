#![deny(missing_docs)]

//! Core library for the Rusty Bot document ingestion and retrieval service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Profile and chunk persistence.
pub mod store;

use std::sync::Arc;

/// Build the configured profile store, creating Qdrant collections when needed.
pub async fn build_store(
    config: &config::Config,
) -> Result<Arc<dyn store::ProfileStore>, store::StoreError> {
    match config.storage_backend {
        config::StorageBackend::Memory => {
            tracing::info!("Using in-memory profile store");
            Ok(Arc::new(store::MemoryStore::new()))
        }
        config::StorageBackend::Qdrant => {
            let url = config.qdrant_url.as_deref().ok_or_else(|| {
                store::StoreError::Qdrant(qdrant::QdrantError::InvalidUrl(
                    "QDRANT_URL is required for the qdrant backend".to_string(),
                ))
            })?;
            let service = qdrant::QdrantService::new(url, config.qdrant_api_key.clone())?;
            let store = store::QdrantStore::new(
                service,
                &config.qdrant_collection_prefix,
                config.embedding_dimension,
            );
            store.ensure_collections().await?;
            Ok(Arc::new(store))
        }
    }
}

/// Assemble the ingestion service from configuration.
pub async fn build_service(
    config: &config::Config,
) -> anyhow::Result<processing::IngestionService> {
    let store = build_store(config).await?;
    let provider = embedding::EmbeddingProvider::from_config(config)?;
    Ok(processing::IngestionService::new(
        store,
        Arc::new(provider),
        processing::PipelineSettings::from_config(config),
    ))
}
