//! Ingestion service coordinating extraction, segmentation, embedding, and persistence.

use crate::{
    config::Config,
    embedding::{BatchEmbedder, EmbeddingClientFactory, RetryPolicy},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::Segmenter,
        extract::extract_text_blocking,
        normalize::normalize,
        types::{
            Document, IngestError, IngestOutcome, IngestRequest, NormalizeError, ProfileConfig,
            SearchError, SearchRequest, TextSegment,
        },
    },
    store::{ChatbotProfile, NewChunk, NewProfile, ProfileStore, RankedChunk, StoreError},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Highest sampling temperature accepted for a profile.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Tunables for the ingestion and search pipelines.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum segment length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive segments.
    pub chunk_overlap: usize,
    /// Texts per provider request.
    pub batch_size: usize,
    /// Provider requests in flight per ingestion.
    pub concurrency: usize,
    /// Backoff applied to retryable provider failures.
    pub retry: RetryPolicy,
    /// Results returned when a search does not ask for a count.
    pub search_default_limit: usize,
    /// Upper bound on results per search.
    pub search_max_limit: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
            batch_size: 96,
            concurrency: 4,
            retry: RetryPolicy::default(),
            search_default_limit: 5,
            search_max_limit: 50,
        }
    }
}

impl PipelineSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            batch_size: config.embedding_batch_size,
            concurrency: config.embedding_concurrency,
            retry: RetryPolicy {
                max_attempts: config.embedding_max_retries,
                base_delay: Duration::from_millis(config.embedding_retry_base_ms),
                ..RetryPolicy::default()
            },
            search_default_limit: config.search_default_limit,
            search_max_limit: config.search_max_limit,
        }
    }
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Create a profile from uploaded documents.
    async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError>;

    /// Add documents to an existing profile.
    async fn append_documents(
        &self,
        profile_id: Uuid,
        documents: Vec<Document>,
        credential: Option<String>,
    ) -> Result<IngestOutcome, IngestError>;

    /// Embed a query and return the closest stored chunks.
    async fn search(&self, request: SearchRequest) -> Result<Vec<RankedChunk>, SearchError>;

    /// Look up a profile.
    async fn get_profile(&self, profile_id: Uuid) -> Result<Option<ChatbotProfile>, StoreError>;

    /// Delete a profile and its chunks.
    async fn delete_profile(&self, profile_id: Uuid) -> Result<bool, StoreError>;

    /// Enumerate profiles, optionally restricted to one owner.
    async fn list_profiles(&self, owner: Option<&str>) -> Result<Vec<ChatbotProfile>, StoreError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Coordinates the full pipeline: extraction, segmentation, batched embedding, normalization,
/// and an all-or-nothing write.
///
/// The service owns long-lived handles to the store, the embedding provider, and the metrics
/// registry so that both the HTTP surface and the CLI reuse the same components. Construct it
/// once near process start and share it through an `Arc`.
pub struct IngestionService {
    store: Arc<dyn ProfileStore>,
    embeddings: Arc<dyn EmbeddingClientFactory>,
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
}

struct PreparedChunks {
    file_names: Vec<String>,
    chunks: Vec<NewChunk>,
}

impl IngestionService {
    /// Assemble a service from its collaborators.
    pub fn new(
        store: Arc<dyn ProfileStore>,
        embeddings: Arc<dyn EmbeddingClientFactory>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            embeddings,
            settings,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Create a profile from `request.documents`. Nothing is persisted unless every document
    /// was extracted, segmented, embedded, and normalized.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        let IngestRequest {
            profile,
            documents,
            credential,
        } = request;
        validate_profile(&profile)?;
        self.validate_documents(&documents, credential.as_deref())?;

        let document_count = documents.len();
        tracing::info!(
            name = %profile.name,
            owner = %profile.owner,
            documents = document_count,
            "Ingesting documents into new profile"
        );

        let prepared = self.prepare(documents, credential.as_deref()).await?;
        let chunk_count = prepared.chunks.len();
        let new_profile = NewProfile {
            name: profile.name.trim().to_string(),
            model: profile.model.trim().to_string(),
            system_prompt: profile
                .system_prompt
                .filter(|prompt| !prompt.trim().is_empty()),
            temperature: profile.temperature,
            owner: profile.owner,
            file_names: prepared.file_names,
            embedding_model: self.embeddings.model().to_string(),
            dimension: self.embeddings.dimension(),
        };

        let stored = self
            .store
            .create_profile_with_chunks(new_profile, prepared.chunks)
            .await?;

        self.metrics
            .record_ingestion(true, document_count as u64, chunk_count as u64);
        tracing::info!(
            profile_id = %stored.id,
            documents = document_count,
            chunks = chunk_count,
            "Profile persisted"
        );

        Ok(IngestOutcome {
            profile: stored,
            chunks_written: chunk_count,
            documents: document_count,
        })
    }

    /// Run the ingestion pipeline for `documents` and append the result to an existing profile.
    pub async fn append_documents(
        &self,
        profile_id: Uuid,
        documents: Vec<Document>,
        credential: Option<String>,
    ) -> Result<IngestOutcome, IngestError> {
        self.validate_documents(&documents, credential.as_deref())?;
        if self.store.get_profile(profile_id).await?.is_none() {
            return Err(StoreError::ProfileNotFound(profile_id).into());
        }

        let document_count = documents.len();
        tracing::info!(profile_id = %profile_id, documents = document_count, "Appending documents");

        let prepared = self.prepare(documents, credential.as_deref()).await?;
        let chunk_count = prepared.chunks.len();
        let stored = self
            .store
            .append_chunks(profile_id, prepared.file_names, prepared.chunks)
            .await?;

        self.metrics
            .record_ingestion(false, document_count as u64, chunk_count as u64);
        tracing::info!(
            profile_id = %profile_id,
            added = chunk_count,
            total = stored.chunk_count,
            "Documents appended"
        );

        Ok(IngestOutcome {
            profile: stored,
            chunks_written: chunk_count,
            documents: document_count,
        })
    }

    /// Rank the chunks of a profile against an already embedded query vector.
    pub async fn rank(
        &self,
        profile_id: Uuid,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<RankedChunk>, SearchError> {
        if top_k == 0 {
            return Err(SearchError::Validation(
                "top_k must be greater than zero".to_string(),
            ));
        }

        let profile = self
            .store
            .get_profile(profile_id)
            .await?
            .filter(|profile| profile.chunk_count > 0)
            .ok_or(SearchError::ProfileNotFound(profile_id))?;

        if query.len() != profile.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: profile.dimension,
                actual: query.len(),
            });
        }

        let ranked = match self.store.nearest(profile_id, query, top_k).await {
            Err(StoreError::ProfileNotFound(id)) => return Err(SearchError::ProfileNotFound(id)),
            other => other?,
        };
        tracing::debug!(profile_id = %profile_id, top_k, hits = ranked.len(), "Ranked chunks");
        Ok(ranked)
    }

    /// Embed `request.query_text` and rank the profile's chunks against it.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<RankedChunk>, SearchError> {
        let SearchRequest {
            profile_id,
            query_text,
            top_k,
            credential,
        } = request;

        let query_text = query_text.trim();
        if query_text.is_empty() {
            return Err(SearchError::Validation("query must not be empty".to_string()));
        }
        let limit = self.resolve_limit(top_k)?;

        let client = self.embeddings.client_for(credential.as_deref())?;
        let embedder = BatchEmbedder::new(client, 1, 1, self.settings.retry)
            .with_expected_dimension(self.embeddings.dimension());
        let outcome = embedder
            .embed_batch_detailed(&[query_text.to_string()])
            .await?;
        self.metrics.record_retries(outcome.retries as u64);

        let vector = outcome
            .vectors
            .into_iter()
            .next()
            .ok_or(SearchError::DegenerateQuery)?;
        let vector = normalize(&vector).map_err(|_| SearchError::DegenerateQuery)?;

        let hits = self.rank(profile_id, &vector, limit).await?;
        self.metrics.record_search();
        tracing::info!(profile_id = %profile_id, limit, hits = hits.len(), "Search completed");
        Ok(hits)
    }

    /// Look up a profile.
    pub async fn get_profile(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<ChatbotProfile>, StoreError> {
        self.store.get_profile(profile_id).await
    }

    /// Delete a profile and its chunks.
    pub async fn delete_profile(&self, profile_id: Uuid) -> Result<bool, StoreError> {
        let deleted = self.store.delete_profile(profile_id).await?;
        if deleted {
            tracing::info!(profile_id = %profile_id, "Profile deleted");
        }
        Ok(deleted)
    }

    /// Enumerate profiles, optionally restricted to one owner.
    pub async fn list_profiles(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<ChatbotProfile>, StoreError> {
        self.store.list_profiles(owner).await
    }

    /// Retrieve the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn resolve_limit(&self, requested: Option<usize>) -> Result<usize, SearchError> {
        match requested {
            Some(0) => Err(SearchError::Validation(
                "top_k must be greater than zero".to_string(),
            )),
            Some(limit) => Ok(limit.min(self.settings.search_max_limit.max(1))),
            None => Ok(self
                .settings
                .search_default_limit
                .clamp(1, self.settings.search_max_limit.max(1))),
        }
    }

    fn validate_documents(
        &self,
        documents: &[Document],
        credential: Option<&str>,
    ) -> Result<(), IngestError> {
        if documents.is_empty() {
            return Err(IngestError::Validation(
                "at least one document is required".to_string(),
            ));
        }
        let has_credential = credential.is_some_and(|value| !value.trim().is_empty());
        if self.embeddings.requires_credential() && !has_credential {
            return Err(IngestError::Validation(
                "an embedding provider credential is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Extract, segment, embed, and normalize every document, in order.
    async fn prepare(
        &self,
        documents: Vec<Document>,
        credential: Option<&str>,
    ) -> Result<PreparedChunks, IngestError> {
        let segmenter = Segmenter::new(self.settings.chunk_size, self.settings.chunk_overlap)?;
        let client = self.embeddings.client_for(credential)?;

        let mut file_names = Vec::with_capacity(documents.len());
        let mut segments: Vec<TextSegment> = Vec::new();
        for (document_index, document) in documents.into_iter().enumerate() {
            file_names.push(document.file_name.clone());
            let file_name = document.file_name.clone();
            let text = extract_text_blocking(document).await?;
            let before = segments.len();
            segments.extend(segmenter.segments(&text).enumerate().map(|(ordinal, segment)| {
                TextSegment {
                    document_index,
                    ordinal,
                    text: segment.to_string(),
                }
            }));
            tracing::debug!(
                file = %file_name,
                chars = text.chars().count(),
                segments = segments.len() - before,
                "Document segmented"
            );
        }

        if segments.is_empty() {
            return Err(IngestError::Validation(
                "the uploaded documents contain no extractable text".to_string(),
            ));
        }

        let texts: Vec<String> = segments.iter().map(|segment| segment.text.clone()).collect();
        let embedder = BatchEmbedder::new(
            client,
            self.settings.batch_size,
            self.settings.concurrency,
            self.settings.retry,
        )
        .with_expected_dimension(self.embeddings.dimension());
        let outcome = embedder.embed_batch_detailed(&texts).await?;
        self.metrics.record_retries(outcome.retries as u64);
        tracing::debug!(
            segments = segments.len(),
            sub_batches = outcome.sub_batches,
            retries = outcome.retries,
            "Segments embedded"
        );

        let chunks = segments
            .into_iter()
            .zip(outcome.vectors)
            .map(|(segment, vector)| {
                let file_name = file_names[segment.document_index].clone();
                match normalize(&vector) {
                    Ok(vector) => Ok(NewChunk {
                        document_index: segment.document_index,
                        file_name,
                        text: segment.text,
                        vector,
                    }),
                    Err(NormalizeError::Degenerate { .. }) => {
                        tracing::warn!(file = %file_name, ordinal = segment.ordinal, "Degenerate embedding");
                        Err(IngestError::DegenerateVector {
                            file_name,
                            ordinal: segment.ordinal,
                        })
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PreparedChunks { file_names, chunks })
    }
}

fn validate_profile(profile: &ProfileConfig) -> Result<(), IngestError> {
    if profile.name.trim().is_empty() {
        return Err(IngestError::Validation("profile name is required".to_string()));
    }
    if profile.model.trim().is_empty() {
        return Err(IngestError::Validation("model identifier is required".to_string()));
    }
    if let Some(temperature) = profile.temperature
        && !(0.0..=MAX_TEMPERATURE).contains(&temperature)
    {
        return Err(IngestError::Validation(format!(
            "temperature must be between 0 and {MAX_TEMPERATURE}, got {temperature}"
        )));
    }
    Ok(())
}

#[async_trait]
impl ProcessingApi for IngestionService {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        IngestionService::ingest(self, request).await
    }

    async fn append_documents(
        &self,
        profile_id: Uuid,
        documents: Vec<Document>,
        credential: Option<String>,
    ) -> Result<IngestOutcome, IngestError> {
        IngestionService::append_documents(self, profile_id, documents, credential).await
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<RankedChunk>, SearchError> {
        IngestionService::search(self, request).await
    }

    async fn get_profile(&self, profile_id: Uuid) -> Result<Option<ChatbotProfile>, StoreError> {
        IngestionService::get_profile(self, profile_id).await
    }

    async fn delete_profile(&self, profile_id: Uuid) -> Result<bool, StoreError> {
        IngestionService::delete_profile(self, profile_id).await
    }

    async fn list_profiles(&self, owner: Option<&str>) -> Result<Vec<ChatbotProfile>, StoreError> {
        IngestionService::list_profiles(self, owner).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        IngestionService::metrics_snapshot(self)
    }
}
