//! In-memory vector store with exact cosine ranking.
//!
//! The whole index lives behind a single `parking_lot::RwLock`, so a chunk
//! replacement is one write-lock critical section: readers either run before
//! the swap and see the full old set, or after it and see the full new set.
//! Chunk ids come from a monotonically increasing counter that is never
//! reset, which keeps superseded ids unreachable and makes the ascending-id
//! tie-break stable across re-vectorization.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use super::{ChunkRecord, NewChunk, ScopeFilter, SearchHit, VectorStore, cosine_similarity};
use crate::types::{ChunkId, DocumentId, LoomError};

#[derive(Debug, Default)]
struct IndexState {
    by_document: HashMap<DocumentId, Vec<ChunkRecord>>,
    next_chunk_id: u64,
}

/// Exact-ranking in-memory backend.
#[derive(Debug)]
pub struct MemoryVectorStore {
    dimension: usize,
    state: RwLock<IndexState>,
}

impl MemoryVectorStore {
    /// Creates a store whose index accepts only vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Configured index dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), LoomError> {
        if vector.len() != self.dimension {
            return Err(LoomError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn replace_chunks(
        &self,
        document_id: DocumentId,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<ChunkId>, LoomError> {
        for chunk in &chunks {
            self.check_dimension(&chunk.embedding)?;
        }

        let now = Utc::now();
        let mut state = self.state.write();

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, chunk)| {
                let id = ChunkId(state.next_chunk_id);
                state.next_chunk_id += 1;
                ChunkRecord {
                    id,
                    document_id,
                    content: chunk.content,
                    embedding: chunk.embedding,
                    chunk_index,
                    token_count: chunk.token_count,
                    metadata: chunk.metadata,
                    created_at: now,
                }
            })
            .collect();

        let ids: Vec<ChunkId> = records.iter().map(|record| record.id).collect();
        let replaced = if records.is_empty() {
            state.by_document.remove(&document_id).is_some()
        } else {
            state.by_document.insert(document_id, records).is_some()
        };
        drop(state);

        debug!(%document_id, chunks = ids.len(), replaced, "replaced chunk set");
        Ok(ids)
    }

    async fn delete_chunks(&self, document_id: DocumentId) -> Result<usize, LoomError> {
        let removed = self
            .state
            .write()
            .by_document
            .remove(&document_id)
            .map(|chunks| chunks.len())
            .unwrap_or(0);
        debug!(%document_id, removed, "deleted chunk set");
        Ok(removed)
    }

    async fn document_chunks(&self, document_id: DocumentId) -> Result<Vec<ChunkRecord>, LoomError> {
        let state = self.state.read();
        let mut chunks = state
            .by_document
            .get(&document_id)
            .cloned()
            .ok_or(LoomError::ChunksNotFound(document_id))?;
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        Ok(chunks)
    }

    async fn document_ids(&self) -> Result<Vec<DocumentId>, LoomError> {
        let state = self.state.read();
        let mut ids: Vec<DocumentId> = state.by_document.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn query(
        &self,
        filter: &ScopeFilter,
        query_vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, LoomError> {
        self.check_dimension(query_vector)?;
        if filter.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read();
        let mut hits: Vec<SearchHit> = state
            .by_document
            .iter()
            .filter(|(document_id, _)| filter.allows(**document_id))
            .flat_map(|(_, chunks)| chunks.iter())
            .filter_map(|chunk| {
                let similarity = cosine_similarity(&chunk.embedding, query_vector);
                (similarity >= threshold).then(|| SearchHit {
                    chunk_id: chunk.id,
                    document_id: chunk.document_id,
                    content: chunk.content.clone(),
                    similarity,
                    metadata: chunk.metadata.clone(),
                })
            })
            .collect();
        drop(state);

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, LoomError> {
        let state = self.state.read();
        Ok(state.by_document.values().map(|chunks| chunks.len()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            content: format!("chunk {embedding:?}"),
            embedding,
            token_count: 2,
            metadata: json!({}),
        }
    }

    async fn store_with(
        dimension: usize,
        docs: Vec<(DocumentId, Vec<Vec<f32>>)>,
    ) -> MemoryVectorStore {
        let store = MemoryVectorStore::new(dimension);
        for (doc, vectors) in docs {
            let chunks = vectors.into_iter().map(chunk).collect();
            store.replace_chunks(doc, chunks).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn ranking_is_descending_by_similarity() {
        let doc = DocumentId(1);
        let store = store_with(
            2,
            vec![(
                doc,
                vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]],
            )],
        )
        .await;

        let hits = store
            .query(&ScopeFilter::unrestricted(), &[1.0, 0.0], 10, 0.0)
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert!(hits[0].similarity >= hits[1].similarity);
        assert!(hits[1].similarity >= hits[2].similarity);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn ties_break_by_ascending_chunk_id() {
        let doc = DocumentId(1);
        let store = store_with(
            2,
            vec![(doc, vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]])],
        )
        .await;

        // All three are parallel to the query, so similarity ties at 1.0.
        let hits = store
            .query(&ScopeFilter::unrestricted(), &[1.0, 0.0], 10, 0.0)
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].chunk_id < w[1].chunk_id));
    }

    #[tokio::test]
    async fn threshold_and_limit_are_enforced() {
        let doc = DocumentId(1);
        let store = store_with(
            2,
            vec![(
                doc,
                vec![
                    vec![1.0, 0.0],
                    vec![0.95, 0.3122],
                    vec![0.0, 1.0],
                    vec![-1.0, 0.0],
                ],
            )],
        )
        .await;

        let hits = store
            .query(&ScopeFilter::unrestricted(), &[1.0, 0.0], 1, 0.9)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "limit caps qualifying results");

        let hits = store
            .query(&ScopeFilter::unrestricted(), &[1.0, 0.0], 10, 0.9)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2, "only similarities >= 0.9 qualify");
        assert!(hits.iter().all(|hit| hit.similarity >= 0.9));
    }

    #[tokio::test]
    async fn scope_filter_is_applied_before_ranking() {
        let store = store_with(
            2,
            vec![
                (DocumentId(1), vec![vec![1.0, 0.0]]),
                (DocumentId(2), vec![vec![0.99, 0.141]]),
            ],
        )
        .await;

        // Document 1 holds the best match overall; restricting the scope to
        // document 2 must still fill the single-result limit from it.
        let filter = ScopeFilter::documents([DocumentId(2)].into());
        let hits = store.query(&filter, &[1.0, 0.0], 1, 0.0).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, DocumentId(2));
    }

    #[tokio::test]
    async fn replace_supersedes_old_chunk_ids() {
        let doc = DocumentId(1);
        let store = MemoryVectorStore::new(2);

        let old_ids = store
            .replace_chunks(doc, vec![chunk(vec![1.0, 0.0]), chunk(vec![0.0, 1.0])])
            .await
            .unwrap();
        let new_ids = store
            .replace_chunks(doc, vec![chunk(vec![0.5, 0.5])])
            .await
            .unwrap();

        assert!(new_ids.iter().all(|id| !old_ids.contains(id)));
        let chunks = store.document_chunks(doc).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, new_ids[0]);

        let hits = store
            .query(&ScopeFilter::unrestricted(), &[1.0, 0.0], 10, -1.0)
            .await
            .unwrap();
        assert!(hits.iter().all(|hit| !old_ids.contains(&hit.chunk_id)));
    }

    #[tokio::test]
    async fn empty_replace_clears_the_document() {
        let doc = DocumentId(1);
        let store = MemoryVectorStore::new(2);
        store
            .replace_chunks(doc, vec![chunk(vec![1.0, 0.0])])
            .await
            .unwrap();

        let ids = store.replace_chunks(doc, Vec::new()).await.unwrap();
        assert!(ids.is_empty());
        assert!(matches!(
            store.document_chunks(doc).await,
            Err(LoomError::ChunksNotFound(_))
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ordinals_are_contiguous() {
        let doc = DocumentId(1);
        let store = MemoryVectorStore::new(2);
        let chunks = (0..5).map(|_| chunk(vec![1.0, 0.0])).collect();
        store.replace_chunks(doc, chunks).await.unwrap();

        let stored = store.document_chunks(doc).await.unwrap();
        for (expected, record) in stored.iter().enumerate() {
            assert_eq!(record.chunk_index, expected);
        }
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = MemoryVectorStore::new(4);

        let err = store
            .replace_chunks(DocumentId(1), vec![chunk(vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoomError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));

        let err = store
            .query(&ScopeFilter::unrestricted(), &[1.0, 0.0], 10, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LoomError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn delete_reports_removed_count() {
        let doc = DocumentId(1);
        let store = MemoryVectorStore::new(2);
        store
            .replace_chunks(doc, vec![chunk(vec![1.0, 0.0]), chunk(vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.delete_chunks(doc).await.unwrap(), 2);
        assert_eq!(store.delete_chunks(doc).await.unwrap(), 0);
    }
}
