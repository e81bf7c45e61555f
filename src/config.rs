use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty Bot server and CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend that persists chatbot profiles and their chunks.
    pub storage_backend: StorageBackend,
    /// Base URL of the Qdrant instance, required when `storage_backend` is Qdrant.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Prefix for the Qdrant collections holding profiles and chunks.
    pub qdrant_collection_prefix: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProviderKind,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional override for the provider base URL.
    pub embedding_base_url: Option<String>,
    /// Credential used when a request does not carry its own.
    pub default_api_key: Option<String>,
    /// Maximum number of texts per provider request.
    pub embedding_batch_size: usize,
    /// Maximum number of provider requests in flight per ingestion.
    pub embedding_concurrency: usize,
    /// Attempts per sub-batch, including the first one.
    pub embedding_max_retries: usize,
    /// Base delay for exponential backoff between attempts, in milliseconds.
    pub embedding_retry_base_ms: u64,
    /// Maximum segment length in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between adjacent segments.
    pub text_splitter_chunk_overlap: usize,
    /// Result count used when a query omits `top_k`.
    pub search_default_limit: usize,
    /// Upper bound applied to `top_k`.
    pub search_max_limit: usize,
    /// Request body limit for multipart uploads.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported persistence backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store; contents vanish on restart.
    Memory,
    /// Qdrant collections accessed over HTTP.
    Qdrant,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Hosted OpenAI embeddings API (or a compatible endpoint).
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic in-process hashing embedder for offline use.
    Hashing,
}

impl EmbeddingProviderKind {
    /// Whether the provider rejects requests that carry no credential.
    pub fn requires_credential(self) -> bool {
        matches!(self, Self::OpenAI)
    }

    /// Default endpoint used when `EMBEDDING_BASE_URL` is unset.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Ollama => "http://127.0.0.1:11434",
            Self::Hashing => "",
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend = match load_env_optional("STORAGE_BACKEND") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("STORAGE_BACKEND".to_string()))?,
            None => StorageBackend::Memory,
        };
        let qdrant_url = load_env_optional("QDRANT_URL");
        if storage_backend == StorageBackend::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".to_string()));
        }

        let embedding_provider = match load_env_optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            None => EmbeddingProviderKind::OpenAI,
        };

        let config = Self {
            storage_backend,
            qdrant_url,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_collection_prefix: load_env_optional("QDRANT_COLLECTION_PREFIX")
                .unwrap_or_else(|| "rusty-bot".to_string()),
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", 1536)?,
            embedding_base_url: load_env_optional("EMBEDDING_BASE_URL"),
            default_api_key: load_env_optional("OPENAI_API_KEY"),
            embedding_batch_size: parse_or("EMBEDDING_BATCH_SIZE", 96)?,
            embedding_concurrency: parse_or("EMBEDDING_CONCURRENCY", 4)?,
            embedding_max_retries: parse_or("EMBEDDING_MAX_RETRIES", 3)?,
            embedding_retry_base_ms: parse_or("EMBEDDING_RETRY_BASE_MS", 500)?,
            text_splitter_chunk_size: parse_or("TEXT_SPLITTER_CHUNK_SIZE", 1000)?,
            text_splitter_chunk_overlap: parse_or("TEXT_SPLITTER_CHUNK_OVERLAP", 0)?,
            search_default_limit: parse_or("SEARCH_DEFAULT_LIMIT", 5)?,
            search_max_limit: parse_or("SEARCH_MAX_LIMIT", 50)?,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        if self.embedding_concurrency == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_CONCURRENCY".into()));
        }
        if self.embedding_max_retries == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_MAX_RETRIES".into()));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }
        if self.search_max_limit == 0 {
            return Err(ConfigError::InvalidValue("SEARCH_MAX_LIMIT".into()));
        }
        Ok(())
    }

    /// Base URL for the embedding provider, honoring `EMBEDDING_BASE_URL`.
    pub fn embedding_endpoint(&self) -> String {
        self.embedding_base_url
            .clone()
            .unwrap_or_else(|| self.embedding_provider.default_base_url().to_string())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

impl std::str::FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hashing" | "local" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        storage = ?config.storage_backend,
        qdrant_url = ?config.qdrant_url,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_aliases() {
        assert_eq!(
            "OpenAI".parse::<EmbeddingProviderKind>(),
            Ok(EmbeddingProviderKind::OpenAI)
        );
        assert_eq!(
            "local".parse::<EmbeddingProviderKind>(),
            Ok(EmbeddingProviderKind::Hashing)
        );
        assert!("bogus".parse::<EmbeddingProviderKind>().is_err());
        assert_eq!(" qdrant ".parse::<StorageBackend>(), Ok(StorageBackend::Qdrant));
    }

    #[test]
    fn only_openai_requires_credential() {
        assert!(EmbeddingProviderKind::OpenAI.requires_credential());
        assert!(!EmbeddingProviderKind::Ollama.requires_credential());
        assert!(!EmbeddingProviderKind::Hashing.requires_credential());
    }
}
