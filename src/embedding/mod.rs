//! Embedding client abstraction and provider adapters.
//!
//! A provider request embeds one sub-batch; [`batch::BatchEmbedder`] layers sub-batching,
//! retries, and bounded concurrency on top. Credentials are bound per request through
//! [`EmbeddingClientFactory::client_for`] so a single process can serve callers that bring
//! their own provider keys.

pub mod batch;
mod ollama;
mod openai;

use crate::config::{Config, EmbeddingProviderKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use batch::{BatchEmbedder, BatchOutcome, RetryPolicy};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// Errors raised by embedding providers.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingClientError {
    /// The provider rejected the supplied credential.
    #[error("embedding provider rejected the credential: {0}")]
    Auth(String),
    /// The provider throttled the request; retry after backing off.
    #[error("embedding provider rate limit exceeded: {0}")]
    RateLimited(String),
    /// The request never produced a usable HTTP response.
    #[error("embedding provider unreachable: {0}")]
    Transport(String),
    /// The provider answered with a payload that breaks the embedding contract.
    #[error("embedding provider returned an invalid response: {0}")]
    Response(String),
}

impl EmbeddingClientError {
    /// Whether the failed sub-batch may be reissued.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transport(_))
    }
}

/// Interface implemented by embedding backends.
///
/// One call corresponds to one provider request; implementations must return exactly one
/// vector per input, in input order.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Hands out embedding clients bound to a caller-supplied credential.
pub trait EmbeddingClientFactory: Send + Sync {
    /// Build a client for one request. `credential` overrides any configured default.
    fn client_for(
        &self,
        credential: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError>;

    /// Whether a request without its own credential would be rejected.
    fn requires_credential(&self) -> bool;

    /// Model identifier recorded alongside persisted vectors.
    fn model(&self) -> &str;

    /// Dimensionality every returned vector must have.
    fn dimension(&self) -> usize;
}

/// Process-wide embedding provider handle.
///
/// Owns the pooled HTTP client and provider settings; per-request clients share the pool.
#[derive(Clone)]
pub struct EmbeddingProvider {
    kind: EmbeddingProviderKind,
    http: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    default_api_key: Option<String>,
}

impl EmbeddingProvider {
    /// Construct a provider handle from explicit settings.
    pub fn new(
        kind: EmbeddingProviderKind,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        default_api_key: Option<String>,
    ) -> Result<Self, EmbeddingClientError> {
        let http = reqwest::Client::builder()
            .user_agent("rusty-bot/0.1")
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| EmbeddingClientError::Transport(err.to_string()))?;
        Ok(Self {
            kind,
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            default_api_key: default_api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// Construct a provider handle from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingClientError> {
        let provider = Self::new(
            config.embedding_provider,
            config.embedding_endpoint(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            config.default_api_key.clone(),
        )?;
        tracing::info!(
            provider = ?provider.kind,
            model = %provider.model,
            dimension = provider.dimension,
            has_default_key = provider.default_api_key.is_some(),
            "Embedding provider initialized"
        );
        Ok(provider)
    }
}

impl EmbeddingClientFactory for EmbeddingProvider {
    fn client_for(
        &self,
        credential: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
        let credential = credential
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_api_key.clone());

        match self.kind {
            EmbeddingProviderKind::OpenAI => {
                let api_key = credential.ok_or_else(|| {
                    EmbeddingClientError::Auth("no API key supplied for OpenAI".to_string())
                })?;
                Ok(Arc::new(OpenAiClient::new(
                    self.http.clone(),
                    &self.base_url,
                    &self.model,
                    api_key,
                )))
            }
            EmbeddingProviderKind::Ollama => Ok(Arc::new(OllamaClient::new(
                self.http.clone(),
                &self.base_url,
                &self.model,
            ))),
            EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingClient::new(self.dimension))),
        }
    }

    fn requires_credential(&self) -> bool {
        self.kind.requires_credential() && self.default_api_key.is_none()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedding client that hashes bytes into vector slots.
///
/// Useful for offline runs and tests; vectors carry no semantic meaning.
pub struct HashingClient {
    dimension: usize,
}

impl HashingClient {
    /// Construct a hashing client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Encode a single text. Empty text yields the zero vector.
    pub fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() || dimension == 0 {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::Response(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        tracing::trace!(
            texts = texts.len(),
            dimension = self.dimension,
            "Hashing embeddings"
        );
        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}
