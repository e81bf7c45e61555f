//! Helpers for constructing, decoding, and hashing Qdrant payloads.

use crate::store::{ChatbotProfile, StoredChunk};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use super::types::PointRecord;

/// Build the point stored for a chunk.
pub(crate) fn chunk_point(chunk: &StoredChunk, timestamp_rfc3339: &str) -> Value {
    json!({
        "id": chunk.id.to_string(),
        "vector": chunk.vector,
        "payload": {
            "profile_id": chunk.profile_id.to_string(),
            "ordinal": chunk.ordinal,
            "document_index": chunk.document_index,
            "file_name": chunk.file_name,
            "text": chunk.text,
            "chunk_hash": chunk.chunk_hash,
            "timestamp": timestamp_rfc3339,
        }
    })
}

/// Build the point stored for a profile. The vector is a one-dimensional placeholder; the
/// profile collection is only ever read by id or scrolled.
pub(crate) fn profile_point(profile: &ChatbotProfile) -> Result<Value, serde_json::Error> {
    Ok(json!({
        "id": profile.id.to_string(),
        "vector": [1.0],
        "payload": serde_json::to_value(profile)?,
    }))
}

/// Decode a profile from its stored payload.
pub(crate) fn profile_from_payload(payload: Map<String, Value>) -> Result<ChatbotProfile, String> {
    serde_json::from_value(Value::Object(payload)).map_err(|err| err.to_string())
}

/// Decode a chunk point returned with its vector.
pub(crate) fn chunk_from_point(point: PointRecord) -> Result<StoredChunk, String> {
    let id = Uuid::parse_str(&point.id).map_err(|err| format!("chunk id '{}': {err}", point.id))?;
    let payload = &point.payload;
    let profile_id = payload
        .get("profile_id")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| format!("chunk {id} has no profile_id"))?;
    let ordinal = payload
        .get("ordinal")
        .and_then(Value::as_u64)
        .ok_or_else(|| format!("chunk {id} has no ordinal"))?;
    let document_index = payload
        .get("document_index")
        .and_then(Value::as_u64)
        .unwrap_or_default() as usize;
    let text = string_field(payload, "text").ok_or_else(|| format!("chunk {id} has no text"))?;
    let vector = point
        .vector
        .ok_or_else(|| format!("chunk {id} was returned without its vector"))?;

    Ok(StoredChunk {
        id,
        profile_id,
        ordinal,
        document_index,
        file_name: string_field(payload, "file_name").unwrap_or_default(),
        chunk_hash: string_field(payload, "chunk_hash")
            .unwrap_or_else(|| compute_chunk_hash(&text)),
        text,
        vector,
    })
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> StoredChunk {
        StoredChunk {
            id: Uuid::new_v4(),
            profile_id: Uuid::new_v4(),
            ordinal: 2,
            document_index: 1,
            file_name: "guide.pdf".into(),
            text: "sample".into(),
            chunk_hash: compute_chunk_hash("sample"),
            vector: vec![0.6, 0.8],
        }
    }

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        let h2 = compute_chunk_hash("Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_chunk_hash("Hello world!"));
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        let pattern = regex::Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$")
            .expect("valid regex");
        assert!(pattern.is_match(&ts), "unexpected timestamp {ts}");
    }

    #[test]
    fn chunk_point_carries_scoping_fields() {
        let chunk = sample_chunk();
        let point = chunk_point(&chunk, "2025-01-01T00:00:00Z");
        assert_eq!(point["id"], chunk.id.to_string());
        assert_eq!(point["payload"]["profile_id"], chunk.profile_id.to_string());
        assert_eq!(point["payload"]["ordinal"], 2);
        assert_eq!(point["payload"]["file_name"], "guide.pdf");
        assert_eq!(point["payload"]["timestamp"], "2025-01-01T00:00:00Z");
    }

    #[test]
    fn chunk_decodes_from_point() {
        let chunk = sample_chunk();
        let encoded = chunk_point(&chunk, "2025-01-01T00:00:00Z");
        let record = PointRecord {
            id: chunk.id.to_string(),
            score: 0.0,
            payload: encoded["payload"].as_object().cloned().expect("object"),
            vector: Some(chunk.vector.clone()),
        };
        assert_eq!(chunk_from_point(record).expect("decodes"), chunk);
    }

    #[test]
    fn chunk_without_vector_is_rejected() {
        let chunk = sample_chunk();
        let encoded = chunk_point(&chunk, "2025-01-01T00:00:00Z");
        let record = PointRecord {
            id: chunk.id.to_string(),
            score: 0.0,
            payload: encoded["payload"].as_object().cloned().expect("object"),
            vector: None,
        };
        assert!(chunk_from_point(record).unwrap_err().contains("without its vector"));
    }
}
