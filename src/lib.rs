//! ```text
//! Document text ──► chunking::TextChunker ──► TextChunk ordinals
//!                        │
//!                        ▼
//! ingestion::IngestionCoordinator ──► embeddings::EmbeddingProvider
//!        │       (claim + batch + retry)        (HTTP gateway / mock)
//!        │
//!        ├─► tasks::TaskTracker  (per-document lock + lifecycle)
//!        └─► stores::VectorStore (atomic chunk replace)
//!
//! Stored vectors ──► search::SearchEngine ──► scoped, ranked SearchHits
//!                         │
//!                         └─► documents::DocumentStore (owner / visibility)
//! ```
//!
pub mod chunking;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod ingestion;
pub mod search;
pub mod stores;
pub mod tasks;
pub mod types;

pub use chunking::{ChunkerConfig, TextChunk, TextChunker};
pub use config::EngineConfig;
pub use documents::{
    DocumentSnapshot, DocumentStatus, DocumentStore, DocumentVisibility, MemoryDocumentStore,
};
pub use embeddings::{EmbeddingError, EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use ingestion::{IngestionCoordinator, IngestionOutcome, IngestionReport, RetryPolicy};
pub use search::{Scope, SearchEngine, SearchQuery};
pub use stores::{ChunkRecord, MemoryVectorStore, NewChunk, ScopeFilter, SearchHit, VectorStore};
pub use tasks::{ClaimDecision, TaskRecord, TaskTracker, VectorizationState, WorkClaim};
pub use types::{ChunkId, DocumentId, LoomError, UserId};
