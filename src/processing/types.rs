//! Core data types and error definitions for the processing pipeline.

use crate::{
    embedding::EmbeddingClientError,
    store::{ChatbotProfile, StoreError},
};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Stable, machine-readable error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed caller input.
    ValidationError,
    /// A document could not be turned into text.
    ExtractionError,
    /// Segmentation parameters are unusable.
    InvalidConfiguration,
    /// An embedding had zero norm.
    DegenerateVector,
    /// The embedding provider rejected the credential.
    ProviderAuthError,
    /// The embedding provider kept throttling after all retries.
    ProviderRateLimitError,
    /// The embedding provider stayed unreachable after all retries.
    ProviderTransportError,
    /// The embedding provider broke its response contract.
    ProviderResponseError,
    /// The profile does not exist or holds no chunks.
    ProfileNotFound,
    /// The persistence layer failed.
    StorageError,
}

impl ErrorKind {
    /// Wire representation of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::ExtractionError => "extraction_error",
            Self::InvalidConfiguration => "invalid_configuration",
            Self::DegenerateVector => "degenerate_vector",
            Self::ProviderAuthError => "provider_auth_error",
            Self::ProviderRateLimitError => "provider_rate_limit_error",
            Self::ProviderTransportError => "provider_transport_error",
            Self::ProviderResponseError => "provider_response_error",
            Self::ProfileNotFound => "profile_not_found",
            Self::StorageError => "storage_error",
        }
    }

    fn from_embedding(error: &EmbeddingClientError) -> Self {
        match error {
            EmbeddingClientError::Auth(_) => Self::ProviderAuthError,
            EmbeddingClientError::RateLimited(_) => Self::ProviderRateLimitError,
            EmbeddingClientError::Transport(_) => Self::ProviderTransportError,
            EmbeddingClientError::Response(_) => Self::ProviderResponseError,
        }
    }

    /// Category of a storage failure.
    pub fn from_store(error: &StoreError) -> Self {
        match error {
            StoreError::ProfileNotFound(_) => Self::ProfileNotFound,
            StoreError::DimensionMismatch { .. } => Self::ValidationError,
            StoreError::Qdrant(_) | StoreError::Conflict(_) | StoreError::Corrupt(_) => {
                Self::StorageError
            }
        }
    }
}

/// Errors raised while turning an uploaded file into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The PDF could not be parsed (corrupt, encrypted, or not a PDF at all).
    #[error("failed to parse PDF '{file_name}': {reason}")]
    Pdf {
        /// Name of the offending file.
        file_name: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// A text upload was not valid UTF-8.
    #[error("'{file_name}' is not valid UTF-8 text: {source}")]
    InvalidUtf8 {
        /// Name of the offending file.
        file_name: String,
        /// Decoder error with the failing byte offset.
        #[source]
        source: std::str::Utf8Error,
    },
    /// The extraction task died before producing a result.
    #[error("extraction of '{file_name}' aborted: {reason}")]
    Aborted {
        /// Name of the offending file.
        file_name: String,
        /// Why the task stopped.
        reason: String,
    },
}

impl ExtractionError {
    /// Name of the document that failed.
    pub fn file_name(&self) -> &str {
        match self {
            Self::Pdf { file_name, .. }
            | Self::InvalidUtf8 { file_name, .. }
            | Self::Aborted { file_name, .. } => file_name,
        }
    }
}

/// Errors produced by segmentation parameters.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Segments must hold at least one character.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new text in every segment.
    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        chunk_size: usize,
    },
}

/// Errors produced by vector normalization.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The vector has zero or non-finite norm.
    #[error("embedding of dimension {dimension} has zero or non-finite norm")]
    Degenerate {
        /// Length of the rejected vector.
        dimension: usize,
    },
}

/// Errors emitted by the ingestion pipeline. Any of them aborts the whole request.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Caller input failed validation.
    #[error("{0}")]
    Validation(String),
    /// A document could not be extracted.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Segmentation parameters are invalid.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// A segment's embedding could not be normalized.
    #[error("embedding for segment {ordinal} of '{file_name}' is degenerate")]
    DegenerateVector {
        /// Source file of the segment.
        file_name: String,
        /// Segment position within its document.
        ordinal: usize,
    },
    /// The embedding provider failed after retries.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The store rejected the write.
    #[error("Failed to persist profile: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Stable error category for client responses.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Extraction(_) => ErrorKind::ExtractionError,
            Self::Chunking(_) => ErrorKind::InvalidConfiguration,
            Self::DegenerateVector { .. } => ErrorKind::DegenerateVector,
            Self::Embedding(error) => ErrorKind::from_embedding(error),
            Self::Store(error) => ErrorKind::from_store(error),
        }
    }
}

/// Errors emitted while ranking stored chunks.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Caller input failed validation.
    #[error("{0}")]
    Validation(String),
    /// The profile does not exist or holds no chunks.
    #[error("profile {0} not found or has no stored chunks")]
    ProfileNotFound(Uuid),
    /// The embedding provider failed to embed the query.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The query embedding had zero norm.
    #[error("query embedding is degenerate")]
    DegenerateQuery,
    /// The query vector length differs from the stored vectors.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the stored vectors.
        expected: usize,
        /// Dimension of the query vector.
        actual: usize,
    },
    /// The store failed to answer.
    #[error("Failed to query store: {0}")]
    Store(#[from] StoreError),
}

impl SearchError {
    /// Stable error category for client responses.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::DimensionMismatch { .. } => ErrorKind::ValidationError,
            Self::ProfileNotFound(_) => ErrorKind::ProfileNotFound,
            Self::Embedding(error) => ErrorKind::from_embedding(error),
            Self::DegenerateQuery => ErrorKind::DegenerateVector,
            Self::Store(error) => ErrorKind::from_store(error),
        }
    }
}

/// How an uploaded file is turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Portable Document Format.
    Pdf,
    /// Anything else, decoded as UTF-8.
    Text,
}

impl MediaType {
    /// Classify a declared media type such as `application/pdf`.
    pub fn from_declared(declared: &str) -> Self {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/pdf" {
            Self::Pdf
        } else {
            Self::Text
        }
    }

    /// Classify by file extension, for uploads without a declared type.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => Self::Pdf,
            _ => Self::Text,
        }
    }
}

/// One uploaded file; lives only for the duration of an ingestion request.
#[derive(Debug, Clone)]
pub struct Document {
    /// Original file name.
    pub file_name: String,
    /// Declared media type.
    pub media_type: MediaType,
    /// Raw bytes.
    pub content: Vec<u8>,
}

impl Document {
    /// Build a document from a declared media type string.
    pub fn new(file_name: impl Into<String>, declared_type: &str, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: MediaType::from_declared(declared_type),
            content,
        }
    }
}

/// One segment of an extracted document, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Index of the source document within the request.
    pub document_index: usize,
    /// Position of the segment within its document.
    pub ordinal: usize,
    /// Segment text.
    pub text: String,
}

/// Caller-supplied chatbot settings.
#[derive(Debug, Clone, Default)]
pub struct ProfileConfig {
    /// Display name (required).
    pub name: String,
    /// Language model identifier (required).
    pub model: String,
    /// Optional system instruction.
    pub system_prompt: Option<String>,
    /// Optional sampling temperature in `0.0..=2.0`.
    pub temperature: Option<f32>,
    /// Caller identity recorded as owner.
    pub owner: String,
}

/// Parameters for creating a profile from uploaded documents.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Profile settings.
    pub profile: ProfileConfig,
    /// Files to ingest, in order.
    pub documents: Vec<Document>,
    /// Embedding-provider credential for this request.
    pub credential: Option<String>,
}

/// Summary of a completed ingestion or append.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Profile after the write.
    pub profile: ChatbotProfile,
    /// Chunks written by this request.
    pub chunks_written: usize,
    /// Documents processed by this request.
    pub documents: usize,
}

/// Parameters supplied to the search pipeline.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Profile whose knowledge base is searched.
    pub profile_id: Uuid,
    /// Natural language query text to embed.
    pub query_text: String,
    /// Maximum number of results; defaults applied downstream.
    pub top_k: Option<usize>,
    /// Embedding-provider credential for this request.
    pub credential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_media_types() {
        assert_eq!(MediaType::from_declared("application/pdf"), MediaType::Pdf);
        assert_eq!(
            MediaType::from_declared("Application/PDF; charset=binary"),
            MediaType::Pdf
        );
        assert_eq!(MediaType::from_declared("text/plain"), MediaType::Text);
        assert_eq!(MediaType::from_declared(""), MediaType::Text);
        assert_eq!(MediaType::from_path(Path::new("a/b/Report.PDF")), MediaType::Pdf);
        assert_eq!(MediaType::from_path(Path::new("notes.md")), MediaType::Text);
    }

    #[test]
    fn error_kinds_are_stable() {
        let error = IngestError::Embedding(EmbeddingClientError::RateLimited("429".into()));
        assert_eq!(error.kind().as_str(), "provider_rate_limit_error");
        let error = IngestError::Store(StoreError::ProfileNotFound(Uuid::nil()));
        assert_eq!(error.kind(), ErrorKind::ProfileNotFound);
        let error = SearchError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(error.kind(), ErrorKind::ValidationError);
        assert_eq!(
            IngestError::Chunking(ChunkingError::InvalidChunkSize)
                .kind()
                .as_str(),
            "invalid_configuration"
        );
    }
}
