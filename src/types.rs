//! Shared identifiers and the crate-wide error taxonomy.
//!
//! Documents are external entities referenced by opaque numeric ids; the
//! engine never creates or mutates them. Chunk ids are allocated by the
//! vector store and are never reused, which is what makes the ascending-id
//! tie-break in search results stable across re-vectorization.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::embeddings::EmbeddingError;

/// Opaque identifier of a document owned by the external document store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a user in the external account system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stored chunk, allocated monotonically by the vector store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by the vectorization and retrieval engine.
///
/// `AlreadyRunning` is a coordination signal rather than a failure: the
/// coordinator converts it into [`IngestionOutcome::AlreadyRunning`]
/// (see [`crate::ingestion`]) instead of propagating it, so callers only see
/// it when talking to the task tracker directly.
#[derive(Debug, thiserror::Error)]
pub enum LoomError {
    /// The document does not exist in the external document store.
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    /// The vector store holds no chunks for the document.
    #[error("no chunks stored for document {0}")]
    ChunksNotFound(DocumentId),

    /// Text could not be split into chunks.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Embedding gateway failure, transient or permanent.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// A vector's length does not match the configured index dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Another worker currently holds the document's execution lock.
    #[error("vectorization already running for document {0}")]
    AlreadyRunning(DocumentId),

    /// The work claim was reclaimed by another worker after a lock timeout.
    #[error("work claim for document {0} is no longer valid")]
    ClaimExpired(DocumentId),

    /// Search parameters failed validation.
    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    /// Backend storage failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_document() {
        let err = LoomError::DocumentNotFound(DocumentId(42));
        assert_eq!(err.to_string(), "document 42 not found");

        let err = LoomError::AlreadyRunning(DocumentId(7));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn dimension_mismatch_reports_both_sizes() {
        let err = LoomError::DimensionMismatch {
            expected: 1024,
            actual: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("1024") && msg.contains('8'));
    }
}
