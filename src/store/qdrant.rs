//! Qdrant-backed profile store.
//!
//! Chunks live in `{prefix}-chunks` and profiles in `{prefix}-profiles`. A profile point is
//! written only after all of its chunks were accepted and it records how many chunks are
//! committed; every chunk read is filtered by `ordinal < chunk_count`. Chunks of a request that
//! failed half-way are therefore never visible, and are deleted on a best-effort basis.
//!
//! Appends to one profile are serialized within the process. Before committing, an append
//! re-reads the profile and aborts with [`StoreError::Conflict`] when another writer moved its
//! chunk count in the meantime.

use super::{
    ChatbotProfile, NewChunk, NewProfile, ProfileStore, RankedChunk, StoreError, StoredChunk,
    check_dimensions, materialize,
};
use crate::processing::ranking::compare_ranked;
use crate::qdrant::{
    Distance, QdrantService,
    filters::{all_chunks_filter, chunks_from_ordinal_filter, committed_chunks_filter, owner_filter},
    payload::{
        chunk_from_point, chunk_point, current_timestamp_rfc3339, profile_from_payload,
        profile_point,
    },
    scroller::stream_points,
};
use async_trait::async_trait;
use futures_util::{StreamExt, pin_mut};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

const UPSERT_PAGE_SIZE: usize = 256;
/// Extra candidates fetched so score ties at the cut-off are broken by ordinal.
const TIE_SLACK: usize = 16;

/// Profile store persisting into two Qdrant collections.
pub struct QdrantStore {
    service: QdrantService,
    profiles_collection: String,
    chunks_collection: String,
    dimension: usize,
    append_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl QdrantStore {
    /// Wrap a Qdrant client; collection names derive from `prefix`.
    pub fn new(service: QdrantService, prefix: &str, dimension: usize) -> Self {
        Self {
            service,
            profiles_collection: format!("{prefix}-profiles"),
            chunks_collection: format!("{prefix}-chunks"),
            dimension,
            append_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create both collections and their payload indexes when missing.
    pub async fn ensure_collections(&self) -> Result<(), StoreError> {
        self.service
            .create_collection_if_not_exists(&self.profiles_collection, 1, Distance::Dot)
            .await?;
        self.service
            .ensure_payload_indexes(&self.profiles_collection, &[("owner", "keyword")])
            .await?;
        self.service
            .create_collection_if_not_exists(
                &self.chunks_collection,
                self.dimension as u64,
                Distance::Cosine,
            )
            .await?;
        self.service
            .ensure_payload_indexes(
                &self.chunks_collection,
                &[("profile_id", "keyword"), ("ordinal", "integer")],
            )
            .await?;
        tracing::info!(
            profiles = %self.profiles_collection,
            chunks = %self.chunks_collection,
            dimension = self.dimension,
            "Qdrant collections ready"
        );
        Ok(())
    }

    fn check_store_dimension(&self, dimension: usize) -> Result<(), StoreError> {
        if dimension == self.dimension {
            Ok(())
        } else {
            Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: dimension,
            })
        }
    }

    async fn write_chunks(&self, chunks: &[StoredChunk]) -> Result<(), StoreError> {
        let timestamp = current_timestamp_rfc3339();
        for page in chunks.chunks(UPSERT_PAGE_SIZE) {
            let points = page
                .iter()
                .map(|chunk| chunk_point(chunk, &timestamp))
                .collect();
            self.service
                .upsert_points(&self.chunks_collection, points)
                .await?;
        }
        Ok(())
    }

    async fn write_profile(&self, profile: &ChatbotProfile) -> Result<(), StoreError> {
        let point = profile_point(profile).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.service
            .upsert_points(&self.profiles_collection, vec![point])
            .await?;
        Ok(())
    }

    /// Remove every chunk of a profile that was never committed. Failures are logged.
    async fn discard_profile_chunks(&self, profile_id: Uuid) {
        if let Err(error) = self
            .service
            .delete_points_by_filter(&self.chunks_collection, all_chunks_filter(profile_id))
            .await
        {
            tracing::warn!(profile_id = %profile_id, error = %error, "Failed to discard uncommitted chunks");
        }
    }

    /// Remove the chunks written by one failed append. Failures are logged; leftovers stay
    /// invisible until the next append clears them.
    async fn discard_appended(&self, profile_id: Uuid, chunks: &[StoredChunk]) {
        let ids: Vec<String> = chunks.iter().map(|chunk| chunk.id.to_string()).collect();
        if let Err(error) = self
            .service
            .delete_points_by_id(&self.chunks_collection, &ids)
            .await
        {
            tracing::warn!(profile_id = %profile_id, chunks = ids.len(), error = %error, "Failed to discard appended chunks");
        }
    }

    /// Wait for exclusive append access to one profile.
    async fn lock_profile(&self, profile_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .append_locks
            .lock()
            .await
            .entry(profile_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Fail unless the committed chunk count is still `expected`.
    async fn ensure_unchanged(&self, profile_id: Uuid, expected: usize) -> Result<(), StoreError> {
        let current = self.require_profile(profile_id).await?;
        if current.chunk_count == expected {
            Ok(())
        } else {
            tracing::warn!(
                profile_id = %profile_id,
                expected,
                found = current.chunk_count,
                "Profile changed during append"
            );
            Err(StoreError::Conflict(profile_id))
        }
    }

    async fn require_profile(&self, profile_id: Uuid) -> Result<ChatbotProfile, StoreError> {
        self.get_profile(profile_id)
            .await?
            .ok_or(StoreError::ProfileNotFound(profile_id))
    }
}

#[async_trait]
impl ProfileStore for QdrantStore {
    async fn create_profile_with_chunks(
        &self,
        profile: NewProfile,
        chunks: Vec<NewChunk>,
    ) -> Result<ChatbotProfile, StoreError> {
        self.check_store_dimension(profile.dimension)?;
        check_dimensions(profile.dimension, &chunks)?;

        let id = Uuid::new_v4();
        let chunks = materialize(id, 0, chunks);
        let record = ChatbotProfile {
            id,
            name: profile.name,
            model: profile.model,
            system_prompt: profile.system_prompt,
            temperature: profile.temperature,
            owner: profile.owner,
            file_names: profile.file_names,
            embedding_model: profile.embedding_model,
            dimension: profile.dimension,
            chunk_count: chunks.len(),
            created_at: current_timestamp_rfc3339(),
        };

        if let Err(error) = self.write_chunks(&chunks).await {
            self.discard_profile_chunks(id).await;
            return Err(error);
        }
        if let Err(error) = self.write_profile(&record).await {
            self.discard_profile_chunks(id).await;
            return Err(error);
        }

        tracing::debug!(profile_id = %id, chunks = record.chunk_count, "Profile committed to Qdrant");
        Ok(record)
    }

    async fn append_chunks(
        &self,
        profile_id: Uuid,
        file_names: Vec<String>,
        chunks: Vec<NewChunk>,
    ) -> Result<ChatbotProfile, StoreError> {
        let _guard = self.lock_profile(profile_id).await;
        let mut profile = self.require_profile(profile_id).await?;
        check_dimensions(profile.dimension, &chunks)?;

        let start = profile.chunk_count;
        // Leftovers of an earlier failed append would collide with the new ordinals.
        self.service
            .delete_points_by_filter(
                &self.chunks_collection,
                chunks_from_ordinal_filter(profile_id, start),
            )
            .await?;

        let chunks = materialize(profile_id, start, chunks);
        let added = chunks.len();
        let written = match self.write_chunks(&chunks).await {
            Ok(()) => self.ensure_unchanged(profile_id, start).await,
            Err(error) => Err(error),
        };
        if let Err(error) = written {
            self.discard_appended(profile_id, &chunks).await;
            return Err(error);
        }

        profile.chunk_count = start + added;
        profile.file_names.extend(file_names);
        if let Err(error) = self.write_profile(&profile).await {
            self.discard_appended(profile_id, &chunks).await;
            return Err(error);
        }

        tracing::debug!(profile_id = %profile_id, added, total = profile.chunk_count, "Chunks appended in Qdrant");
        Ok(profile)
    }

    async fn get_profile(&self, profile_id: Uuid) -> Result<Option<ChatbotProfile>, StoreError> {
        let point = self
            .service
            .get_point(&self.profiles_collection, &profile_id.to_string())
            .await?;
        point
            .map(|point| profile_from_payload(point.payload).map_err(StoreError::Corrupt))
            .transpose()
    }

    async fn fetch_chunks(&self, profile_id: Uuid) -> Result<Vec<StoredChunk>, StoreError> {
        let profile = self.require_profile(profile_id).await?;
        let filter = committed_chunks_filter(profile_id, profile.chunk_count);

        let stream = stream_points(&self.service, &self.chunks_collection, Some(filter), true);
        pin_mut!(stream);
        let mut chunks = Vec::with_capacity(profile.chunk_count);
        while let Some(point) = stream.next().await {
            chunks.push(chunk_from_point(point?).map_err(StoreError::Corrupt)?);
        }
        chunks.sort_by_key(|chunk| chunk.ordinal);
        Ok(chunks)
    }

    async fn nearest(
        &self,
        profile_id: Uuid,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<RankedChunk>, StoreError> {
        let profile = self.require_profile(profile_id).await?;
        let filter = committed_chunks_filter(profile_id, profile.chunk_count);
        let candidates = top_k.saturating_add(TIE_SLACK).min(profile.chunk_count);
        let points = self
            .service
            .query_points(&self.chunks_collection, query, Some(filter), candidates, true)
            .await?;

        let mut ranked = points
            .into_iter()
            .map(|point| {
                let distance = (1.0 - point.score).clamp(0.0, 2.0);
                chunk_from_point(point)
                    .map(|chunk| RankedChunk { chunk, distance })
                    .map_err(StoreError::Corrupt)
            })
            .collect::<Result<Vec<_>, _>>()?;
        ranked.sort_by(compare_ranked);
        ranked.truncate(top_k);
        Ok(ranked)
    }

    async fn delete_profile(&self, profile_id: Uuid) -> Result<bool, StoreError> {
        let existed = self.get_profile(profile_id).await?.is_some();
        self.service
            .delete_points_by_id(&self.profiles_collection, &[profile_id.to_string()])
            .await?;
        self.service
            .delete_points_by_filter(&self.chunks_collection, all_chunks_filter(profile_id))
            .await?;
        self.append_locks.lock().await.remove(&profile_id);
        Ok(existed)
    }

    async fn list_profiles(&self, owner: Option<&str>) -> Result<Vec<ChatbotProfile>, StoreError> {
        let stream = stream_points(
            &self.service,
            &self.profiles_collection,
            owner_filter(owner),
            false,
        );
        pin_mut!(stream);
        let mut profiles = Vec::new();
        while let Some(point) = stream.next().await {
            profiles.push(profile_from_payload(point?.payload).map_err(StoreError::Corrupt)?);
        }
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(profiles)
    }
}
