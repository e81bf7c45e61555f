//! Persistence of chatbot profiles and their stored chunks.
//!
//! A store makes each ingestion or append all-or-nothing: readers either see every chunk a
//! request produced together with the updated profile, or none of them.

pub mod memory;
pub mod qdrant;
mod types;

pub use memory::MemoryStore;
pub use qdrant::QdrantStore;
pub use types::{ChatbotProfile, NewChunk, NewProfile, RankedChunk, StoreError, StoredChunk};

use crate::processing::ranking::rank_chunks;
use crate::qdrant::compute_chunk_hash;
use async_trait::async_trait;
use uuid::Uuid;

/// Storage backend for profiles and their chunks.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Persist a new profile together with all of its chunks in one unit.
    async fn create_profile_with_chunks(
        &self,
        profile: NewProfile,
        chunks: Vec<NewChunk>,
    ) -> Result<ChatbotProfile, StoreError>;

    /// Add chunks to an existing profile in one unit, extending its file list.
    async fn append_chunks(
        &self,
        profile_id: Uuid,
        file_names: Vec<String>,
        chunks: Vec<NewChunk>,
    ) -> Result<ChatbotProfile, StoreError>;

    /// Look up a committed profile.
    async fn get_profile(&self, profile_id: Uuid) -> Result<Option<ChatbotProfile>, StoreError>;

    /// Committed chunks of a profile in insertion order.
    async fn fetch_chunks(&self, profile_id: Uuid) -> Result<Vec<StoredChunk>, StoreError>;

    /// The `top_k` chunks closest to `query` by cosine distance.
    async fn nearest(
        &self,
        profile_id: Uuid,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<RankedChunk>, StoreError> {
        let chunks = self.fetch_chunks(profile_id).await?;
        Ok(rank_chunks(chunks, query, top_k))
    }

    /// Remove a profile and its chunks. Returns whether the profile existed.
    async fn delete_profile(&self, profile_id: Uuid) -> Result<bool, StoreError>;

    /// Committed profiles, optionally restricted to one owner.
    async fn list_profiles(&self, owner: Option<&str>) -> Result<Vec<ChatbotProfile>, StoreError>;
}

/// Assign identifiers, ordinals, and hashes to chunks about to be written.
pub(crate) fn materialize(
    profile_id: Uuid,
    start_ordinal: usize,
    chunks: Vec<NewChunk>,
) -> Vec<StoredChunk> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(offset, chunk)| StoredChunk {
            id: Uuid::new_v4(),
            profile_id,
            ordinal: (start_ordinal + offset) as u64,
            document_index: chunk.document_index,
            file_name: chunk.file_name,
            chunk_hash: compute_chunk_hash(&chunk.text),
            text: chunk.text,
            vector: chunk.vector,
        })
        .collect()
}

/// Every chunk must match the profile's dimension.
pub(crate) fn check_dimensions(expected: usize, chunks: &[NewChunk]) -> Result<(), StoreError> {
    match chunks.iter().find(|chunk| chunk.vector.len() != expected) {
        Some(chunk) => Err(StoreError::DimensionMismatch {
            expected,
            actual: chunk.vector.len(),
        }),
        None => Ok(()),
    }
}
