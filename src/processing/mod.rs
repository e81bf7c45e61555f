//! Document processing pipeline: extraction, segmentation, normalization, and ranking.

pub mod chunking;
pub mod extract;
pub mod normalize;
pub mod ranking;
mod service;
pub mod types;

pub use service::{IngestionService, MAX_TEMPERATURE, PipelineSettings, ProcessingApi};
pub use types::{
    ChunkingError, Document, ErrorKind, ExtractionError, IngestError, IngestOutcome,
    IngestRequest, MediaType, NormalizeError, ProfileConfig, SearchError, SearchRequest,
    TextSegment,
};
