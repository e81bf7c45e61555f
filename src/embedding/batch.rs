//! Order-preserving batch embedding with per-sub-batch retries.
//!
//! Inputs are cut into sub-batches of at most `batch_size` texts. Up to `concurrency`
//! sub-batches are in flight at once; each carries its position so results are reassembled in
//! input order regardless of completion order. Retryable failures (rate limits, transport) are
//! retried for the failing sub-batch only. Once a sub-batch gives up, sub-batches that have not
//! started yet are skipped, in-flight siblings are allowed to settle, and the failure with the
//! lowest position is returned.

use super::{EmbeddingClient, EmbeddingClientError};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Backoff schedule applied to retryable sub-batch failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts per sub-batch, including the first one.
    pub max_attempts: usize,
    /// Delay before the first retry; doubled for each subsequent retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

/// Vectors plus bookkeeping from a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
    /// Number of sub-batches issued.
    pub sub_batches: usize,
    /// Retries issued across all sub-batches.
    pub retries: usize,
}

enum SubBatchResult {
    Embedded(Vec<Vec<f32>>),
    Failed(EmbeddingClientError),
    Skipped,
}

/// Splits text batches to respect provider limits and reassembles ordered results.
pub struct BatchEmbedder {
    client: Arc<dyn EmbeddingClient>,
    batch_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
    expected_dimension: Option<usize>,
}

impl BatchEmbedder {
    /// Wrap a provider client. Zero sizes are raised to one.
    pub fn new(
        client: Arc<dyn EmbeddingClient>,
        batch_size: usize,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            expected_dimension: None,
        }
    }

    /// Reject vectors whose length differs from `dimension`.
    pub fn with_expected_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    /// Embed `texts`, returning one vector per text in the same order.
    pub async fn embed_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        self.embed_batch_detailed(texts)
            .await
            .map(|outcome| outcome.vectors)
    }

    /// Same as [`Self::embed_batch`] but also reports sub-batch and retry counts.
    pub async fn embed_batch_detailed(
        &self,
        texts: &[String],
    ) -> Result<BatchOutcome, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(BatchOutcome::default());
        }

        // Owned sub-batches keep the stream future `Send`.
        let sub_batches: Vec<Vec<String>> =
            texts.chunks(self.batch_size).map(<[String]>::to_vec).collect();
        let total = sub_batches.len();
        let halted = AtomicBool::new(false);
        let retries = AtomicUsize::new(0);

        tracing::debug!(
            texts = texts.len(),
            sub_batches = total,
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            "Embedding batch"
        );

        let positioned = sub_batches.into_iter().enumerate();
        let mut results: Vec<(usize, SubBatchResult)> = stream::iter(positioned)
            .map(|(position, batch)| {
                let halted = &halted;
                let retries = &retries;
                async move {
                    if halted.load(Ordering::Acquire) {
                        return (position, SubBatchResult::Skipped);
                    }
                    match self.embed_sub_batch(position, &batch, retries).await {
                        Ok(vectors) => (position, SubBatchResult::Embedded(vectors)),
                        Err(error) => {
                            halted.store(true, Ordering::Release);
                            (position, SubBatchResult::Failed(error))
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.sort_by_key(|(position, _)| *position);
        let retries = retries.load(Ordering::Relaxed);

        let mut vectors = Vec::with_capacity(texts.len());
        let mut skipped = 0usize;
        let mut first_failure = None;
        for (_, result) in results {
            match result {
                SubBatchResult::Embedded(batch) => vectors.extend(batch),
                SubBatchResult::Skipped => skipped += 1,
                SubBatchResult::Failed(error) => {
                    if first_failure.is_none() {
                        first_failure = Some(error);
                    }
                }
            }
        }

        if let Some(error) = first_failure {
            tracing::error!(
                error = %error,
                sub_batches = total,
                skipped,
                retries,
                "Embedding batch failed"
            );
            return Err(error);
        }

        if let Some(first) = vectors.first().map(Vec::len)
            && vectors.iter().any(|vector| vector.len() != first)
        {
            return Err(EmbeddingClientError::Response(
                "provider returned vectors of differing dimensions".to_string(),
            ));
        }

        Ok(BatchOutcome {
            vectors,
            sub_batches: total,
            retries,
        })
    }

    async fn embed_sub_batch(
        &self,
        position: usize,
        batch: &[String],
        retries: &AtomicUsize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let mut attempt = 1;
        loop {
            let result = self
                .client
                .generate_embeddings(batch.to_vec())
                .await
                .and_then(|vectors| self.check_sub_batch(batch.len(), vectors));

            match result {
                Ok(vectors) => {
                    tracing::trace!(position, attempt, size = batch.len(), "Sub-batch embedded");
                    return Ok(vectors);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        position,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying embedding sub-batch"
                    );
                    retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::warn!(position, attempt, error = %error, "Embedding sub-batch gave up");
                    return Err(error);
                }
            }
        }
    }

    fn check_sub_batch(
        &self,
        expected: usize,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if vectors.len() != expected {
            return Err(EmbeddingClientError::Response(format!(
                "expected {expected} vectors, received {}",
                vectors.len()
            )));
        }
        if let Some(empty) = vectors.iter().position(Vec::is_empty) {
            return Err(EmbeddingClientError::Response(format!(
                "vector {empty} in sub-batch is empty"
            )));
        }
        if let Some(dimension) = self.expected_dimension
            && let Some(actual) = vectors
                .iter()
                .map(Vec::len)
                .find(|len| *len != dimension)
        {
            return Err(EmbeddingClientError::Response(format!(
                "embedding dimension mismatch: expected {dimension}, got {actual}"
            )));
        }
        Ok(vectors)
    }
}
