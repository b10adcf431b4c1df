//! Engine configuration.
//!
//! Defaults mirror the shipped gateway (1024-dimension embeddings, batch of
//! 16, 5-minute lock lease, 10-minute task timeout). `from_env` layers
//! environment overrides on top of the defaults, loading `.env` first.

use std::time::Duration;

use crate::chunking::ChunkerConfig;
use crate::ingestion::RetryPolicy;
use crate::search::SearchQuery;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Embedding dimension every stored and queried vector must match.
    pub dimension: usize,
    pub chunker: ChunkerConfig,
    pub retry: RetryPolicy,
    /// Texts sent per embedding-gateway call.
    pub embed_batch_size: usize,
    /// Lease duration after which a worker's lock may be reclaimed.
    pub lock_timeout: Duration,
    /// Hard wall-clock bound on a single vectorization run.
    pub task_timeout: Duration,
    pub default_search_limit: usize,
    pub default_search_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: 1024,
            chunker: ChunkerConfig::default(),
            retry: RetryPolicy::default(),
            embed_batch_size: 16,
            lock_timeout: Duration::from_secs(300),
            task_timeout: Duration::from_secs(600),
            default_search_limit: SearchQuery::DEFAULT_LIMIT,
            default_search_threshold: SearchQuery::DEFAULT_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `VECTORLOOM_*` environment variables where set.
    /// Unparseable values fall back to the default rather than erroring.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            dimension: env_parse("VECTORLOOM_DIMENSION", defaults.dimension),
            embed_batch_size: env_parse("VECTORLOOM_EMBED_BATCH_SIZE", defaults.embed_batch_size),
            lock_timeout: Duration::from_secs(env_parse(
                "VECTORLOOM_LOCK_TIMEOUT_SECS",
                defaults.lock_timeout.as_secs(),
            )),
            task_timeout: Duration::from_secs(env_parse(
                "VECTORLOOM_TASK_TIMEOUT_SECS",
                defaults.task_timeout.as_secs(),
            )),
            default_search_limit: env_parse(
                "VECTORLOOM_SEARCH_LIMIT",
                defaults.default_search_limit,
            ),
            default_search_threshold: env_parse(
                "VECTORLOOM_SEARCH_THRESHOLD",
                defaults.default_search_threshold,
            ),
            ..defaults
        }
    }

    /// A [`SearchQuery`] carrying this configuration's limit and threshold
    /// defaults instead of the type-level ones.
    pub fn search_query(&self, vector: Vec<f32>) -> SearchQuery {
        SearchQuery::new(vector)
            .with_limit(self.default_search_limit)
            .with_threshold(self.default_search_threshold)
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_embed_batch_size(mut self, embed_batch_size: usize) -> Self {
        self.embed_batch_size = embed_batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    #[must_use]
    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
