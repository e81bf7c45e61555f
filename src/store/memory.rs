//! In-process profile store.
//!
//! Each profile lives behind its own lock; the map lock is only taken to publish or remove a
//! fully built entry, so requests for different profiles never wait on each other's writes.

use super::{
    ChatbotProfile, NewChunk, NewProfile, ProfileStore, StoreError, StoredChunk,
    check_dimensions, materialize,
};
use crate::qdrant::payload::current_timestamp_rfc3339;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

struct ProfileEntry {
    profile: ChatbotProfile,
    chunks: Vec<StoredChunk>,
}

/// Profile store kept entirely in memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<Uuid, Arc<RwLock<ProfileEntry>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, profile_id: Uuid) -> Option<Arc<RwLock<ProfileEntry>>> {
        self.profiles.read().await.get(&profile_id).cloned()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn create_profile_with_chunks(
        &self,
        profile: NewProfile,
        chunks: Vec<NewChunk>,
    ) -> Result<ChatbotProfile, StoreError> {
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

        let entry = ProfileEntry {
            profile: record.clone(),
            chunks,
        };
        self.profiles
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(entry)));

        tracing::debug!(profile_id = %id, chunks = record.chunk_count, "Profile committed to memory store");
        Ok(record)
    }

    async fn append_chunks(
        &self,
        profile_id: Uuid,
        file_names: Vec<String>,
        chunks: Vec<NewChunk>,
    ) -> Result<ChatbotProfile, StoreError> {
        let entry = self
            .entry(profile_id)
            .await
            .ok_or(StoreError::ProfileNotFound(profile_id))?;
        let mut entry = entry.write().await;

        check_dimensions(entry.profile.dimension, &chunks)?;
        let appended = materialize(profile_id, entry.chunks.len(), chunks);
        let added = appended.len();
        entry.chunks.extend(appended);
        entry.profile.chunk_count = entry.chunks.len();
        entry.profile.file_names.extend(file_names);

        tracing::debug!(profile_id = %profile_id, added, total = entry.profile.chunk_count, "Chunks appended to memory store");
        Ok(entry.profile.clone())
    }

    async fn get_profile(&self, profile_id: Uuid) -> Result<Option<ChatbotProfile>, StoreError> {
        match self.entry(profile_id).await {
            Some(entry) => Ok(Some(entry.read().await.profile.clone())),
            None => Ok(None),
        }
    }

    async fn fetch_chunks(&self, profile_id: Uuid) -> Result<Vec<StoredChunk>, StoreError> {
        let entry = self
            .entry(profile_id)
            .await
            .ok_or(StoreError::ProfileNotFound(profile_id))?;
        let chunks = entry.read().await.chunks.clone();
        Ok(chunks)
    }

    async fn delete_profile(&self, profile_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.profiles.write().await.remove(&profile_id).is_some())
    }

    async fn list_profiles(&self, owner: Option<&str>) -> Result<Vec<ChatbotProfile>, StoreError> {
        let entries: Vec<_> = self.profiles.read().await.values().cloned().collect();
        let mut profiles = Vec::with_capacity(entries.len());
        for entry in entries {
            let profile = entry.read().await.profile.clone();
            if owner.is_none_or(|owner| profile.owner == owner) {
                profiles.push(profile);
            }
        }
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_profile(owner: &str, dimension: usize) -> NewProfile {
        NewProfile {
            name: "Docs bot".into(),
            model: "gpt-4o-mini".into(),
            system_prompt: None,
            temperature: Some(0.2),
            owner: owner.into(),
            file_names: vec!["a.txt".into()],
            embedding_model: "test-model".into(),
            dimension,
        }
    }

    fn chunk(text: &str, vector: Vec<f32>) -> NewChunk {
        NewChunk {
            document_index: 0,
            file_name: "a.txt".into(),
            text: text.into(),
            vector,
        }
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let store = MemoryStore::new();
        let profile = store
            .create_profile_with_chunks(
                new_profile("alice", 2),
                vec![chunk("one", vec![1.0, 0.0]), chunk("two", vec![0.0, 1.0])],
            )
            .await
            .expect("create");

        assert_eq!(profile.chunk_count, 2);
        let fetched = store.get_profile(profile.id).await.expect("get");
        assert_eq!(fetched, Some(profile.clone()));

        let chunks = store.fetch_chunks(profile.id).await.expect("chunks");
        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn rejected_create_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let error = store
            .create_profile_with_chunks(
                new_profile("alice", 2),
                vec![chunk("one", vec![1.0, 0.0]), chunk("bad", vec![1.0])],
            )
            .await
            .unwrap_err();

        assert!(matches!(error, StoreError::DimensionMismatch { .. }));
        assert!(store.list_profiles(None).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn append_continues_ordinals_and_files() {
        let store = MemoryStore::new();
        let profile = store
            .create_profile_with_chunks(new_profile("alice", 2), vec![chunk("one", vec![1.0, 0.0])])
            .await
            .expect("create");

        let updated = store
            .append_chunks(
                profile.id,
                vec!["b.txt".into()],
                vec![chunk("two", vec![0.0, 1.0]), chunk("three", vec![0.6, 0.8])],
            )
            .await
            .expect("append");

        assert_eq!(updated.chunk_count, 3);
        assert_eq!(updated.file_names, vec!["a.txt".to_string(), "b.txt".to_string()]);
        let ordinals: Vec<u64> = store
            .fetch_chunks(profile.id)
            .await
            .expect("chunks")
            .iter()
            .map(|chunk| chunk.ordinal)
            .collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn rejected_append_keeps_existing_state() {
        let store = MemoryStore::new();
        let profile = store
            .create_profile_with_chunks(new_profile("alice", 2), vec![chunk("one", vec![1.0, 0.0])])
            .await
            .expect("create");

        let error = store
            .append_chunks(
                profile.id,
                vec!["b.txt".into()],
                vec![chunk("two", vec![0.0, 1.0]), chunk("bad", vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap_err();

        assert!(matches!(error, StoreError::DimensionMismatch { expected: 2, actual: 3 }));
        let current = store.get_profile(profile.id).await.expect("get").expect("exists");
        assert_eq!(current, profile);
        assert_eq!(store.fetch_chunks(profile.id).await.expect("chunks").len(), 1);
    }

    #[tokio::test]
    async fn append_to_unknown_profile_fails() {
        let store = MemoryStore::new();
        let missing = Uuid::new_v4();
        let error = store
            .append_chunks(missing, Vec::new(), vec![chunk("x", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::ProfileNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn nearest_ranks_by_cosine_distance() {
        let store = MemoryStore::new();
        let profile = store
            .create_profile_with_chunks(
                new_profile("alice", 2),
                vec![
                    chunk("east", vec![1.0, 0.0]),
                    chunk("north", vec![0.0, 1.0]),
                    chunk("northeast", vec![0.70710677, 0.70710677]),
                ],
            )
            .await
            .expect("create");

        let hits = store.nearest(profile.id, &[0.0, 1.0], 2).await.expect("rank");
        assert_eq!(hits[0].chunk.text, "north");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[1].chunk.text, "northeast");
    }

    #[tokio::test]
    async fn delete_and_list_by_owner() {
        let store = MemoryStore::new();
        let alice = store
            .create_profile_with_chunks(new_profile("alice", 1), vec![chunk("a", vec![1.0])])
            .await
            .expect("create");
        store
            .create_profile_with_chunks(new_profile("bob", 1), vec![chunk("b", vec![1.0])])
            .await
            .expect("create");

        let owned = store.list_profiles(Some("alice")).await.expect("list");
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, alice.id);
        assert_eq!(store.list_profiles(None).await.expect("list").len(), 2);

        assert!(store.delete_profile(alice.id).await.expect("delete"));
        assert!(!store.delete_profile(alice.id).await.expect("delete"));
        assert!(store.get_profile(alice.id).await.expect("get").is_none());
        assert!(matches!(
            store.fetch_chunks(alice.id).await,
            Err(StoreError::ProfileNotFound(_))
        ));
    }
}
