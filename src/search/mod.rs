//! Scoped semantic search over the vector store.
//!
//! A [`Scope`] names who is asking (owner, the public, or an explicit set of
//! documents). The engine resolves the scope to a concrete document set once
//! per call, hands the resulting [`ScopeFilter`] to the store, and the store
//! applies it before ranking and truncation. Scope resolution failing open is
//! never possible: a document whose metadata cannot be read is excluded.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::documents::DocumentStore;
use crate::stores::{ScopeFilter, SearchHit, VectorStore};
use crate::types::{DocumentId, LoomError, UserId};

/// Who a search runs as.
#[derive(Clone, Debug)]
pub enum Scope {
    /// Only documents owned by this user.
    Owner(UserId),
    /// Only documents that are public *and* published.
    Public,
    /// Exactly these documents, regardless of owner or visibility. Callers
    /// are expected to have authorized the ids themselves.
    Documents(HashSet<DocumentId>),
}

/// A validated similarity query.
#[derive(Clone, Debug)]
pub struct SearchQuery {
    vector: Vec<f32>,
    limit: usize,
    threshold: f32,
}

impl SearchQuery {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const DEFAULT_THRESHOLD: f32 = 0.7;

    /// Query with the default limit and threshold.
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            limit: Self::DEFAULT_LIMIT,
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    /// Maximum number of hits. Must be at least 1.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Minimum cosine similarity. Must lie in `[0.0, 1.0]`.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn validate(&self) -> Result<(), LoomError> {
        if self.vector.is_empty() {
            return Err(LoomError::InvalidQuery(
                "query vector must not be empty".into(),
            ));
        }
        if self.limit == 0 {
            return Err(LoomError::InvalidQuery("limit must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.threshold) || self.threshold.is_nan() {
            return Err(LoomError::InvalidQuery(format!(
                "threshold must lie in [0.0, 1.0], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Executes scoped searches against a vector store, consulting the document
/// store for ownership and visibility.
#[derive(Clone)]
pub struct SearchEngine {
    documents: Arc<dyn DocumentStore>,
    store: Arc<dyn VectorStore>,
}

impl SearchEngine {
    pub fn new(documents: Arc<dyn DocumentStore>, store: Arc<dyn VectorStore>) -> Self {
        Self { documents, store }
    }

    /// Runs `query` restricted to `scope`.
    pub async fn search(
        &self,
        scope: Scope,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, LoomError> {
        query.validate()?;

        let filter = self.resolve_scope(scope).await?;
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        self.store
            .query(&filter, query.vector(), query.limit(), query.threshold())
            .await
    }

    /// Shorthand for [`Scope::Owner`].
    pub async fn search_owned(
        &self,
        user: UserId,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, LoomError> {
        self.search(Scope::Owner(user), query).await
    }

    /// Shorthand for [`Scope::Public`].
    pub async fn search_public(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, LoomError> {
        self.search(Scope::Public, query).await
    }

    /// Shorthand for [`Scope::Documents`].
    pub async fn search_documents(
        &self,
        document_ids: HashSet<DocumentId>,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, LoomError> {
        self.search(Scope::Documents(document_ids), query).await
    }

    /// Resolves a scope to the concrete set of admissible documents, using
    /// the store's vectorized documents as the candidate universe. Documents
    /// deleted since vectorization simply drop out of the set.
    async fn resolve_scope(&self, scope: Scope) -> Result<ScopeFilter, LoomError> {
        let filter = match scope {
            Scope::Documents(ids) => ScopeFilter::documents(ids),
            Scope::Owner(user) => {
                let mut allowed = HashSet::new();
                for id in self.store.document_ids().await? {
                    match self.documents.owner(id).await {
                        Ok(owner) if owner == user => {
                            allowed.insert(id);
                        }
                        Ok(_) => {}
                        Err(LoomError::DocumentNotFound(_)) => {}
                        Err(err) => return Err(err),
                    }
                }
                ScopeFilter::documents(allowed)
            }
            Scope::Public => {
                let mut allowed = HashSet::new();
                for id in self.store.document_ids().await? {
                    match self.documents.visibility(id).await {
                        Ok(visibility) if visibility.publicly_searchable() => {
                            allowed.insert(id);
                        }
                        Ok(_) => {}
                        Err(LoomError::DocumentNotFound(_)) => {}
                        Err(err) => return Err(err),
                    }
                }
                ScopeFilter::documents(allowed)
            }
        };
        debug!(empty = filter.is_empty(), "resolved search scope");
        Ok(filter)
    }
}
