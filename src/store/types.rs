//! Persisted records and storage errors.

use crate::qdrant::QdrantError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by profile stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No committed profile exists under the identifier.
    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),
    /// A chunk's vector length differs from the profile's dimension.
    #[error("chunk dimension {actual} does not match profile dimension {expected}")]
    DimensionMismatch {
        /// Dimension recorded on the profile.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Qdrant rejected or failed a request.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Another writer committed to the profile while an append was in flight.
    #[error("profile {0} was changed by a concurrent append")]
    Conflict(Uuid),
    /// A stored record could not be decoded.
    #[error("stored record is malformed: {0}")]
    Corrupt(String),
}

/// Named chatbot configuration that owns a knowledge base of stored chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatbotProfile {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Language model the chatbot answers with.
    pub model: String,
    /// Optional system instruction.
    pub system_prompt: Option<String>,
    /// Optional sampling temperature for the language model.
    pub temperature: Option<f32>,
    /// Caller identity that created the profile.
    pub owner: String,
    /// Names of the files ingested into the profile, in ingestion order.
    pub file_names: Vec<String>,
    /// Embedding model that produced the stored vectors.
    pub embedding_model: String,
    /// Dimension shared by every stored vector.
    pub dimension: usize,
    /// Number of stored chunks.
    pub chunk_count: usize,
    /// Creation time, RFC3339.
    pub created_at: String,
}

/// Profile fields supplied at creation time.
#[derive(Debug, Clone)]
pub struct NewProfile {
    /// Display name.
    pub name: String,
    /// Language model identifier.
    pub model: String,
    /// Optional system instruction.
    pub system_prompt: Option<String>,
    /// Optional sampling temperature.
    pub temperature: Option<f32>,
    /// Caller identity.
    pub owner: String,
    /// Names of the ingested files.
    pub file_names: Vec<String>,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Vector dimension.
    pub dimension: usize,
}

/// Segment text and its normalized vector, ready to persist.
#[derive(Debug, Clone)]
pub struct NewChunk {
    /// Index of the source document within its ingestion request.
    pub document_index: usize,
    /// Source file name.
    pub file_name: String,
    /// Segment text.
    pub text: String,
    /// Unit-length embedding.
    pub vector: Vec<f32>,
}

/// Persisted segment plus embedding, owned by one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Stable identifier.
    pub id: Uuid,
    /// Owning profile.
    pub profile_id: Uuid,
    /// Insertion order within the profile, starting at zero.
    pub ordinal: u64,
    /// Index of the source document within its ingestion request.
    pub document_index: usize,
    /// Source file name.
    pub file_name: String,
    /// Segment text.
    pub text: String,
    /// SHA-256 of the segment text, hex encoded.
    pub chunk_hash: String,
    /// Unit-length embedding.
    pub vector: Vec<f32>,
}

/// Stored chunk with its cosine distance to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    /// Matching chunk.
    pub chunk: StoredChunk,
    /// Cosine distance to the query; smaller is closer.
    pub distance: f32,
}
