//! Ingestion coordinator: drives the document → chunk → vector pipeline.
//!
//! ```text
//! DocumentStore ──► TaskTracker.begin ──► TextChunker ──► EmbeddingProvider
//!      │                 │ (claim)                           (batched,
//!      │                 │                                    retried)
//!      │                 ▼                                       │
//!      └──────► cancellation re-check ◄─────────────────────────┘
//!                        │
//!                        ▼
//!              VectorStore.replace_chunks (atomic)
//!                        │
//!                        ▼
//!              TaskTracker.complete / fail
//! ```
//!
//! The coordinator owns no data; it holds the per-document execution lock
//! (a [`WorkClaim`]) for the duration of a run and records every failure on
//! the task record before reporting it to the caller.

pub mod retry;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chunking::{TextChunk, TextChunker};
use crate::config::EngineConfig;
use crate::documents::{DocumentSnapshot, DocumentStore};
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::stores::{NewChunk, VectorStore};
use crate::tasks::{ClaimDecision, TaskTracker, WorkClaim, FAILURE_CANCELLED, FAILURE_TIMEOUT};
use crate::types::{DocumentId, LoomError};

pub use retry::RetryPolicy;

/// Result of one `ensure_vectorized` call.
///
/// Pipeline failures surface here *and* on the task record; only collaborator
/// failures that occur before a claim exists (e.g. the document is already
/// gone) propagate as `Err`.
#[derive(Debug)]
pub enum IngestionOutcome {
    /// Task is `Completed` and the content fingerprint is unchanged.
    UpToDate,
    /// Another worker holds the document's execution lock; no writes done.
    AlreadyRunning,
    /// Pipeline ran to completion.
    Completed(IngestionReport),
    /// Pipeline failed; the task record carries the same detail.
    Failed { message: String },
}

/// Telemetry for a completed ingestion run.
#[derive(Clone, Debug)]
pub struct IngestionReport {
    pub document_id: DocumentId,
    pub chunk_count: usize,
    pub total_tokens: usize,
    pub embedding_batches: usize,
    /// Batches that needed at least one transient retry.
    pub retried_batches: usize,
    pub fingerprint: String,
    pub duration_ms: u64,
}

/// Drives vectorization for documents, serialized per document through the
/// [`TaskTracker`].
#[derive(Clone)]
pub struct IngestionCoordinator {
    documents: Arc<dyn DocumentStore>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    tracker: Arc<TaskTracker>,
    chunker: TextChunker,
    retry: RetryPolicy,
    embed_batch_size: usize,
    task_timeout: Duration,
}

impl IngestionCoordinator {
    /// Create a new builder for constructing a coordinator.
    pub fn builder() -> IngestionCoordinatorBuilder {
        IngestionCoordinatorBuilder::default()
    }

    /// Ensures the document's chunks reflect its current content.
    ///
    /// Idempotent: a `Completed` task with a matching fingerprint returns
    /// [`IngestionOutcome::UpToDate`] without touching the store, and a
    /// concurrent run returns [`IngestionOutcome::AlreadyRunning`] without
    /// blocking.
    pub async fn ensure_vectorized(
        &self,
        document_id: DocumentId,
    ) -> Result<IngestionOutcome, LoomError> {
        // One snapshot covers the whole run: the fingerprint recorded on
        // completion is the fingerprint of the content that was chunked,
        // even if the document is edited while we work.
        let snapshot = self.documents.snapshot(document_id).await?;

        let claim = match self.tracker.begin(document_id, &snapshot.fingerprint) {
            ClaimDecision::UpToDate => {
                debug!(%document_id, "content unchanged, skipping vectorization");
                return Ok(IngestionOutcome::UpToDate);
            }
            ClaimDecision::AlreadyRunning => {
                debug!(%document_id, "vectorization already in flight");
                return Ok(IngestionOutcome::AlreadyRunning);
            }
            ClaimDecision::Claimed(claim) => claim,
        };

        let started = Instant::now();
        let run = tokio::time::timeout(
            self.task_timeout,
            self.run_pipeline(&claim, document_id, &snapshot),
        )
        .await;

        match run {
            Err(_elapsed) => {
                warn!(%document_id, "vectorization exceeded task timeout");
                self.tracker.fail(&claim, FAILURE_TIMEOUT)?;
                Ok(IngestionOutcome::Failed {
                    message: FAILURE_TIMEOUT.to_string(),
                })
            }
            Ok(Ok(mut report)) => {
                self.tracker
                    .complete(&claim, report.chunk_count, &snapshot.fingerprint)?;
                report.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    %document_id,
                    chunks = report.chunk_count,
                    tokens = report.total_tokens,
                    duration_ms = report.duration_ms,
                    "document vectorized"
                );
                Ok(IngestionOutcome::Completed(report))
            }
            Ok(Err(err)) => {
                // A document deleted mid-run is a cancellation, not a fault.
                let message = match &err {
                    LoomError::DocumentNotFound(_) => FAILURE_CANCELLED.to_string(),
                    other => other.to_string(),
                };
                warn!(%document_id, error = %message, "vectorization failed");
                self.tracker.fail(&claim, &message)?;
                Ok(IngestionOutcome::Failed { message })
            }
        }
    }

    /// Vectorizes a batch of documents with at most `concurrency` running at
    /// once. Per-document serialization still comes from the tracker, so
    /// overlapping ids degrade to `AlreadyRunning` rather than racing.
    pub async fn process_pending(
        &self,
        document_ids: Vec<DocumentId>,
        concurrency: usize,
    ) -> Vec<(DocumentId, Result<IngestionOutcome, LoomError>)> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (position, document_id) in document_ids.iter().copied().enumerate() {
            let coordinator = self.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("ingestion semaphore closed");
                (position, document_id, coordinator.ensure_vectorized(document_id).await)
            });
        }

        let mut results: Vec<Option<(DocumentId, Result<IngestionOutcome, LoomError>)>> =
            (0..document_ids.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, document_id, outcome)) => {
                    results[position] = Some((document_id, outcome));
                }
                Err(err) => warn!(error = %err, "ingestion worker panicked"),
            }
        }

        results.into_iter().flatten().collect()
    }

    /// Deletion cascade: removes the document's chunks and task record.
    pub async fn handle_document_deleted(
        &self,
        document_id: DocumentId,
    ) -> Result<usize, LoomError> {
        let removed = self.store.delete_chunks(document_id).await?;
        self.tracker.remove(document_id);
        info!(%document_id, removed, "cascaded document deletion");
        Ok(removed)
    }

    async fn run_pipeline(
        &self,
        claim: &WorkClaim,
        document_id: DocumentId,
        snapshot: &DocumentSnapshot,
    ) -> Result<IngestionReport, LoomError> {
        let chunks = self.chunker.chunk(&snapshot.content);
        self.tracker.record_progress(claim, 0, chunks.len())?;
        debug!(%document_id, chunks = chunks.len(), "document chunked");

        let mut new_chunks: Vec<NewChunk> = Vec::with_capacity(chunks.len());
        let mut embedding_batches = 0usize;
        let mut retried_batches = 0usize;
        let total = chunks.len();

        for batch in chunks.chunks(self.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let (vectors, retries) = self.embed_with_retry(&texts).await?;
            embedding_batches += 1;
            if retries > 0 {
                retried_batches += 1;
            }

            for (chunk, embedding) in batch.iter().zip(vectors) {
                new_chunks.push(self.build_chunk(chunk, embedding));
            }
            self.tracker
                .record_progress(claim, new_chunks.len(), total)?;
        }

        // The document may have been deleted while we were embedding; bail
        // before anything becomes visible to searchers.
        self.documents.content_fingerprint(document_id).await?;

        let total_tokens = new_chunks.iter().map(|chunk| chunk.token_count).sum();
        self.store.replace_chunks(document_id, new_chunks).await?;

        Ok(IngestionReport {
            document_id,
            chunk_count: total,
            total_tokens,
            embedding_batches,
            retried_batches,
            fingerprint: snapshot.fingerprint.clone(),
            duration_ms: 0,
        })
    }

    fn build_chunk(&self, chunk: &TextChunk, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            metadata: json!({
                "chunk_size": chunk.content.chars().count(),
                "position": chunk.index,
            }),
            content: chunk.content.clone(),
            embedding,
            token_count: chunk.token_count,
        }
    }

    /// Embeds one batch under the retry policy, returning the vectors and how
    /// many transient retries were spent.
    async fn embed_with_retry(
        &self,
        texts: &[String],
    ) -> Result<(Vec<Vec<f32>>, u32), LoomError> {
        let mut attempt = 1u32;
        loop {
            match self.provider.embed_batch(texts).await {
                Ok(vectors) => {
                    if vectors.len() != texts.len() {
                        return Err(EmbeddingError::permanent(format!(
                            "provider returned {} vectors for {} texts",
                            vectors.len(),
                            texts.len()
                        ))
                        .into());
                    }
                    return Ok((vectors, attempt - 1));
                }
                Err(err) if err.is_transient() => match self.retry.backoff_after(attempt) {
                    Some(delay) => {
                        warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err,
                            "transient embedding failure, backing off");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        return Err(EmbeddingError::permanent(format!(
                            "transient failure persisted after {attempt} attempts: {err}"
                        ))
                        .into());
                    }
                },
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Builder for [`IngestionCoordinator`].
#[derive(Default)]
pub struct IngestionCoordinatorBuilder {
    documents: Option<Arc<dyn DocumentStore>>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn VectorStore>>,
    tracker: Option<Arc<TaskTracker>>,
    chunker: Option<TextChunker>,
    retry: Option<RetryPolicy>,
    embed_batch_size: Option<usize>,
    task_timeout: Option<Duration>,
}

impl IngestionCoordinatorBuilder {
    #[must_use]
    pub fn documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn tracker(mut self, tracker: Arc<TaskTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Seeds chunker, retry policy, batch size, and task timeout from an
    /// [`EngineConfig`]. Individual setters called afterwards still win.
    #[must_use]
    pub fn config(self, config: &EngineConfig) -> Self {
        self.chunker(TextChunker::new(config.chunker.clone()))
            .retry(config.retry.clone())
            .embed_batch_size(config.embed_batch_size)
            .task_timeout(config.task_timeout)
    }

    /// Defaults to [`TextChunker::default`].
    #[must_use]
    pub fn chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Defaults to [`RetryPolicy::default`].
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Texts per embedding-gateway call. Defaults to 16.
    #[must_use]
    pub fn embed_batch_size(mut self, embed_batch_size: usize) -> Self {
        self.embed_batch_size = Some(embed_batch_size);
        self
    }

    /// Hard per-run timeout. Defaults to 10 minutes.
    #[must_use]
    pub fn task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = Some(task_timeout);
        self
    }

    /// Build the coordinator.
    ///
    /// # Panics
    ///
    /// Panics if any of `documents`, `provider`, `store`, or `tracker` was
    /// not provided.
    pub fn build(self) -> IngestionCoordinator {
        IngestionCoordinator {
            documents: self.documents.expect("coordinator requires a document store"),
            provider: self
                .provider
                .expect("coordinator requires an embedding provider"),
            store: self.store.expect("coordinator requires a vector store"),
            tracker: self.tracker.expect("coordinator requires a task tracker"),
            chunker: self.chunker.unwrap_or_default(),
            retry: self.retry.unwrap_or_default(),
            embed_batch_size: self.embed_batch_size.unwrap_or(16),
            task_timeout: self.task_timeout.unwrap_or(Duration::from_secs(600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_collaborators() {
        let result = std::panic::catch_unwind(|| IngestionCoordinatorBuilder::default().build());
        assert!(result.is_err());
    }

    #[test]
    fn builder_config_seeds_pipeline_knobs() {
        let config = EngineConfig::default()
            .with_embed_batch_size(4)
            .with_task_timeout(Duration::from_secs(30))
            .with_retry(RetryPolicy::none());

        let coordinator = IngestionCoordinator::builder()
            .documents(Arc::new(crate::documents::MemoryDocumentStore::new()))
            .provider(Arc::new(crate::embeddings::MockEmbeddingProvider::new(4)))
            .store(Arc::new(crate::stores::MemoryVectorStore::new(4)))
            .tracker(Arc::new(TaskTracker::new(config.lock_timeout)))
            .config(&config)
            .build();

        assert_eq!(coordinator.embed_batch_size, 4);
        assert_eq!(coordinator.task_timeout, Duration::from_secs(30));
        assert_eq!(coordinator.retry.max_attempts, 1);
    }
}
