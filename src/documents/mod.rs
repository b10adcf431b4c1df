//! Document store collaborator.
//!
//! The engine never owns documents; it reads their content, content
//! fingerprint, owner, and visibility through the [`DocumentStore`] trait and
//! reacts to deletion through the coordinator's cascade hook. The shipped
//! [`MemoryDocumentStore`] backs tests and demos.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::types::{DocumentId, LoomError, UserId};

/// Publication status of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Draft,
    Published,
    Archived,
}

/// Visibility attributes consulted by public-scope search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentVisibility {
    pub is_public: bool,
    pub status: DocumentStatus,
}

impl DocumentVisibility {
    /// Whether public-scope search may surface this document's chunks.
    pub fn publicly_searchable(&self) -> bool {
        self.is_public && self.status == DocumentStatus::Published
    }
}

/// Content and its fingerprint read as one consistent pair.
///
/// The ingestion pipeline works from a snapshot rather than separate reads,
/// so a concurrent edit can never pair one version's content with another
/// version's fingerprint.
#[derive(Clone, Debug)]
pub struct DocumentSnapshot {
    pub content: String,
    pub fingerprint: String,
}

/// Read-only interface to the external document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current text content. `DocumentNotFound` when the document is gone.
    async fn content(&self, id: DocumentId) -> Result<String, LoomError>;

    /// Opaque hash of the current content; equal fingerprints mean equal
    /// content for skip-logic purposes.
    async fn content_fingerprint(&self, id: DocumentId) -> Result<String, LoomError>;

    /// Content together with the fingerprint of that same content.
    /// Implementations must read both from one version of the document.
    async fn snapshot(&self, id: DocumentId) -> Result<DocumentSnapshot, LoomError>;

    /// Owning user.
    async fn owner(&self, id: DocumentId) -> Result<UserId, LoomError>;

    /// Public flag and publication status.
    async fn visibility(&self, id: DocumentId) -> Result<DocumentVisibility, LoomError>;
}

/// Computes the fingerprint used by [`MemoryDocumentStore`].
pub fn fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

#[derive(Clone, Debug)]
struct DocumentEntry {
    content: String,
    owner: UserId,
    visibility: DocumentVisibility,
}

/// In-memory document store for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    entries: RwLock<HashMap<DocumentId, DocumentEntry>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document.
    pub fn upsert(
        &self,
        id: DocumentId,
        owner: UserId,
        content: impl Into<String>,
        visibility: DocumentVisibility,
    ) {
        self.entries.write().insert(
            id,
            DocumentEntry {
                content: content.into(),
                owner,
                visibility,
            },
        );
    }

    /// Replaces a document's content, keeping owner and visibility.
    pub fn update_content(&self, id: DocumentId, content: impl Into<String>) -> bool {
        match self.entries.write().get_mut(&id) {
            Some(entry) => {
                entry.content = content.into();
                true
            }
            None => false,
        }
    }

    /// Removes a document, returning whether it existed.
    pub fn remove(&self, id: DocumentId) -> bool {
        self.entries.write().remove(&id).is_some()
    }

    fn with_entry<T>(
        &self,
        id: DocumentId,
        f: impl FnOnce(&DocumentEntry) -> T,
    ) -> Result<T, LoomError> {
        self.entries
            .read()
            .get(&id)
            .map(f)
            .ok_or(LoomError::DocumentNotFound(id))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn content(&self, id: DocumentId) -> Result<String, LoomError> {
        self.with_entry(id, |entry| entry.content.clone())
    }

    async fn content_fingerprint(&self, id: DocumentId) -> Result<String, LoomError> {
        self.with_entry(id, |entry| fingerprint(&entry.content))
    }

    async fn snapshot(&self, id: DocumentId) -> Result<DocumentSnapshot, LoomError> {
        // One read-lock acquisition covers both fields.
        self.with_entry(id, |entry| DocumentSnapshot {
            content: entry.content.clone(),
            fingerprint: fingerprint(&entry.content),
        })
    }

    async fn owner(&self, id: DocumentId) -> Result<UserId, LoomError> {
        self.with_entry(id, |entry| entry.owner)
    }

    async fn visibility(&self, id: DocumentId) -> Result<DocumentVisibility, LoomError> {
        self.with_entry(id, |entry| entry.visibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_DRAFT: DocumentVisibility = DocumentVisibility {
        is_public: false,
        status: DocumentStatus::Draft,
    };

    #[tokio::test]
    async fn fingerprint_tracks_content_changes() {
        let store = MemoryDocumentStore::new();
        let doc = DocumentId(1);
        store.upsert(doc, UserId(1), "first version", PRIVATE_DRAFT);
        let before = store.content_fingerprint(doc).await.unwrap();

        assert!(store.update_content(doc, "second version"));
        let after = store.content_fingerprint(doc).await.unwrap();

        assert_ne!(before, after);
        assert!(store.update_content(doc, "first version"));
        assert_eq!(store.content_fingerprint(doc).await.unwrap(), before);
    }

    #[tokio::test]
    async fn snapshot_pairs_content_with_its_own_fingerprint() {
        let store = MemoryDocumentStore::new();
        let doc = DocumentId(1);
        store.upsert(doc, UserId(1), "snapshot body", PRIVATE_DRAFT);

        let snapshot = store.snapshot(doc).await.unwrap();
        assert_eq!(snapshot.content, "snapshot body");
        assert_eq!(snapshot.fingerprint, fingerprint(&snapshot.content));
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let err = store.content(DocumentId(404)).await.unwrap_err();
        assert!(matches!(err, LoomError::DocumentNotFound(DocumentId(404))));
    }

    #[test]
    fn public_searchability_requires_published() {
        let public_draft = DocumentVisibility {
            is_public: true,
            status: DocumentStatus::Draft,
        };
        let public_published = DocumentVisibility {
            is_public: true,
            status: DocumentStatus::Published,
        };
        let private_published = DocumentVisibility {
            is_public: false,
            status: DocumentStatus::Published,
        };

        assert!(public_published.publicly_searchable());
        assert!(!public_draft.publicly_searchable());
        assert!(!private_published.publicly_searchable());
    }
}
