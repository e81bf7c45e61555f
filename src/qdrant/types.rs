//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Distance function configured on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    /// Cosine similarity; Qdrant reports `score = cos(a, b)`.
    Cosine,
    /// Raw dot product.
    Dot,
}

impl Distance {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "Cosine",
            Self::Dot => "Dot",
        }
    }
}

/// Point returned by search, scroll, or retrieval endpoints.
#[derive(Debug, Clone)]
pub struct PointRecord {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score; zero for non-search endpoints.
    pub score: f32,
    /// Payload associated with the vector.
    pub payload: Map<String, Value>,
    /// Stored vector, when requested.
    pub vector: Option<Vec<f32>>,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResponse {
    pub(crate) result: ListCollectionsResult,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResult {
    pub(crate) collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionDescription {
    pub(crate) name: String,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<RawPoint>),
    Object {
        #[serde(default)]
        points: Vec<RawPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct GetPointResponse {
    pub(crate) result: Option<RawPoint>,
}

#[derive(Deserialize)]
pub(crate) struct RawPoint {
    pub(crate) id: Value,
    #[serde(default)]
    pub(crate) score: Option<f32>,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
    #[serde(default)]
    pub(crate) vector: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<RawPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}
