use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and retrieval activity.
#[derive(Default)]
pub struct PipelineMetrics {
    profiles_created: AtomicU64,
    documents_ingested: AtomicU64,
    chunks_stored: AtomicU64,
    searches_served: AtomicU64,
    embedding_retries: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful ingestion request.
    ///
    /// `new_profile` is false for appends into an existing profile.
    pub fn record_ingestion(&self, new_profile: bool, documents: u64, chunks: u64) {
        if new_profile {
            self.profiles_created.fetch_add(1, Ordering::Relaxed);
        }
        self.documents_ingested
            .fetch_add(documents, Ordering::Relaxed);
        self.chunks_stored.fetch_add(chunks, Ordering::Relaxed);
    }

    /// Record a served similarity query.
    pub fn record_search(&self) {
        self.searches_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record sub-batch retries issued against the embedding provider.
    pub fn record_retries(&self, retries: u64) {
        if retries > 0 {
            self.embedding_retries
                .fetch_add(retries, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            profiles_created: self.profiles_created.load(Ordering::Relaxed),
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_stored: self.chunks_stored.load(Ordering::Relaxed),
            searches_served: self.searches_served.load(Ordering::Relaxed),
            embedding_retries: self.embedding_retries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Chatbot profiles created since startup.
    pub profiles_created: u64,
    /// Documents that passed extraction and were persisted.
    pub documents_ingested: u64,
    /// Chunks persisted across all profiles.
    pub chunks_stored: u64,
    /// Similarity queries answered.
    pub searches_served: u64,
    /// Sub-batch retries issued against the embedding provider.
    pub embedding_retries: u64,
}
