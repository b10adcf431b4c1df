//! Vector storage: persisted chunks, their embeddings, and similarity query
//! primitives.
//!
//! The [`VectorStore`] trait abstracts the backend so the coordinator and
//! search engine never touch index internals; the shipped
//! [`MemoryVectorStore`] ranks by exact cosine similarity over an in-memory
//! index. Two guarantees every backend must uphold:
//!
//! * `replace_chunks` is atomic — a concurrent reader observes the complete
//!   old chunk set or the complete new one, never a mixture.
//! * `query` applies the scope predicate *before* ranking and truncation, so
//!   a limited result set is never under-filled by post-filtering.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{ChunkId, DocumentId, LoomError};

pub use memory::MemoryVectorStore;

/// A chunk ready for insertion; ids, ordinals, and timestamps are assigned by
/// the store at replace time.
#[derive(Clone, Debug)]
pub struct NewChunk {
    pub content: String,
    pub embedding: Vec<f32>,
    pub token_count: usize,
    pub metadata: serde_json::Value,
}

/// A persisted chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Zero-based reading-order position; contiguous per document.
    pub chunk_index: usize,
    pub token_count: usize,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One ranked similarity-search result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    pub similarity: f32,
    pub metadata: serde_json::Value,
}

/// Document-level access predicate, resolved once per search call and applied
/// inside the store's query path before ranking.
#[derive(Clone, Debug)]
pub struct ScopeFilter {
    allowed: Option<HashSet<DocumentId>>,
}

impl ScopeFilter {
    /// Admits every document. Intended for store-level tooling and tests;
    /// the search engine always constructs a restricted filter.
    pub fn unrestricted() -> Self {
        Self { allowed: None }
    }

    /// Admits exactly the given documents.
    pub fn documents(allowed: HashSet<DocumentId>) -> Self {
        Self {
            allowed: Some(allowed),
        }
    }

    pub fn allows(&self, document_id: DocumentId) -> bool {
        match &self.allowed {
            Some(allowed) => allowed.contains(&document_id),
            None => true,
        }
    }

    /// `true` when the filter can never admit any chunk.
    pub fn is_empty(&self) -> bool {
        matches!(&self.allowed, Some(allowed) if allowed.is_empty())
    }
}

/// Storage backend for chunks and their vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Atomically discards the document's existing chunks and inserts the new
    /// set, returning the assigned chunk ids in ordinal order. An empty set
    /// clears the document.
    async fn replace_chunks(
        &self,
        document_id: DocumentId,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<ChunkId>, LoomError>;

    /// Removes all chunks for a document (deletion cascade), returning how
    /// many were removed.
    async fn delete_chunks(&self, document_id: DocumentId) -> Result<usize, LoomError>;

    /// All chunks for a document in ordinal order; `ChunksNotFound` when the
    /// document has none.
    async fn document_chunks(&self, document_id: DocumentId) -> Result<Vec<ChunkRecord>, LoomError>;

    /// Distinct documents that currently hold chunks.
    async fn document_ids(&self) -> Result<Vec<DocumentId>, LoomError>;

    /// Scope-filtered similarity query: results with cosine similarity to
    /// `query_vector` of at least `threshold`, ranked by descending
    /// similarity with ties broken by ascending chunk id, capped at `limit`.
    async fn query(
        &self,
        filter: &ScopeFilter,
        query_vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, LoomError>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<usize, LoomError>;
}

/// Cosine similarity, equivalently `1 - cosine_distance`. Zero-magnitude
/// vectors score 0 rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn scope_filter_membership() {
        let filter = ScopeFilter::documents([DocumentId(1), DocumentId(2)].into());
        assert!(filter.allows(DocumentId(1)));
        assert!(!filter.allows(DocumentId(3)));
        assert!(!filter.is_empty());

        let empty = ScopeFilter::documents(HashSet::new());
        assert!(empty.is_empty());
        assert!(!empty.allows(DocumentId(1)));

        assert!(ScopeFilter::unrestricted().allows(DocumentId(99)));
    }
}
