//! Per-document vectorization task records and their state machine.
//!
//! The tracker is the concurrency authority for ingestion: a worker may only
//! run the pipeline for a document while it holds the [`WorkClaim`] issued by
//! [`TaskTracker::begin`], and only the claim holder can move the task out of
//! `Processing`. This serializes execution per document while leaving
//! distinct documents free to run in parallel.
//!
//! State machine:
//!
//! ```text
//!            begin (claim)                 complete
//!  Pending ───────────────► Processing ───────────────► Completed
//!     ▲                      │    ▲  │                      │
//!     │              fail    │    │  └── record_progress    │ begin with a
//!  (created on first         ▼    │                         │ changed
//!   observation)           Failed ┘ begin (retry /          ▼ fingerprint
//!                                   changed content)    Processing …
//! ```
//!
//! A `Processing` task whose claim has outlived the configured lock timeout
//! is presumed abandoned (worker crash); the next `begin` forcibly fails it
//! with reason `timeout` and claims the document itself.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::types::{DocumentId, LoomError};

/// Failure reason recorded when a stale claim is reclaimed.
pub const FAILURE_TIMEOUT: &str = "timeout";
/// Failure reason recorded when the document vanished mid-run.
pub const FAILURE_CANCELLED: &str = "cancelled";

/// Closed set of task states; transitions are checked at compile time by the
/// tracker's methods rather than encoded in strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizationState {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Snapshot of a document's vectorization task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskRecord {
    pub document_id: DocumentId,
    pub state: VectorizationState,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Fingerprint of the last successfully vectorized content.
    pub content_fingerprint: Option<String>,
}

impl TaskRecord {
    fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            state: VectorizationState::Pending,
            total_chunks: 0,
            processed_chunks: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
            content_fingerprint: None,
        }
    }
}

/// Exclusive lease on a document's execution lock.
///
/// Obtained from [`TaskTracker::begin`]; required by every transition out of
/// `Processing`. Dropping a claim without completing or failing leaves the
/// task `Processing` until the lock timeout reclaims it.
#[derive(Clone, Debug)]
pub struct WorkClaim {
    document_id: DocumentId,
    token: Uuid,
}

impl WorkClaim {
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }
}

/// Outcome of asking the tracker whether a document needs work.
#[derive(Debug)]
pub enum ClaimDecision {
    /// Work is needed; the caller now holds the execution lock.
    Claimed(WorkClaim),
    /// Task is `Completed` and the fingerprint matches; nothing to do.
    UpToDate,
    /// Another worker holds a live claim.
    AlreadyRunning,
}

#[derive(Debug)]
struct TaskEntry {
    record: TaskRecord,
    lease: Option<Lease>,
}

#[derive(Debug)]
struct Lease {
    token: Uuid,
    acquired_at: DateTime<Utc>,
}

/// Owns task records and enforces the state machine.
#[derive(Debug)]
pub struct TaskTracker {
    lock_timeout: Duration,
    entries: Mutex<HashMap<DocumentId, TaskEntry>>,
}

impl TaskTracker {
    /// Creates a tracker whose `Processing` leases expire after
    /// `lock_timeout`.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            lock_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether `document_id` needs (re)vectorization for content with
    /// the given fingerprint, claiming the execution lock when it does.
    pub fn begin(&self, document_id: DocumentId, fingerprint: &str) -> ClaimDecision {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(document_id)
            .or_insert_with(|| TaskEntry {
                record: TaskRecord::new(document_id),
                lease: None,
            });

        if entry.record.state == VectorizationState::Processing {
            let stale = entry
                .lease
                .as_ref()
                .is_none_or(|lease| self.lease_expired(lease));
            if !stale {
                return ClaimDecision::AlreadyRunning;
            }
            // Worker presumed dead; record the reclamation before reclaiming.
            warn!(%document_id, "reclaiming stale vectorization lease");
            entry.record.state = VectorizationState::Failed;
            entry.record.error_message = Some(FAILURE_TIMEOUT.to_string());
            entry.record.completed_at = Some(Utc::now());
            entry.lease = None;
        }

        if entry.record.state == VectorizationState::Completed
            && entry.record.content_fingerprint.as_deref() == Some(fingerprint)
        {
            return ClaimDecision::UpToDate;
        }

        let token = Uuid::new_v4();
        entry.record.state = VectorizationState::Processing;
        entry.record.started_at = Some(Utc::now());
        entry.record.completed_at = None;
        entry.record.processed_chunks = 0;
        entry.record.total_chunks = 0;
        entry.lease = Some(Lease {
            token,
            acquired_at: Utc::now(),
        });

        ClaimDecision::Claimed(WorkClaim { document_id, token })
    }

    /// Updates progress counters for a running task.
    pub fn record_progress(
        &self,
        claim: &WorkClaim,
        processed_chunks: usize,
        total_chunks: usize,
    ) -> Result<(), LoomError> {
        self.with_claimed(claim, |record| {
            record.processed_chunks = processed_chunks;
            record.total_chunks = total_chunks;
        })
    }

    /// Marks the claimed task `Completed` with the vectorized fingerprint.
    pub fn complete(
        &self,
        claim: &WorkClaim,
        total_chunks: usize,
        fingerprint: &str,
    ) -> Result<(), LoomError> {
        let fingerprint = fingerprint.to_string();
        self.with_claimed_entry(claim, |entry| {
            entry.record.state = VectorizationState::Completed;
            entry.record.total_chunks = total_chunks;
            entry.record.processed_chunks = total_chunks;
            entry.record.error_message = None;
            entry.record.completed_at = Some(Utc::now());
            entry.record.content_fingerprint = Some(fingerprint);
            entry.lease = None;
        })
    }

    /// Marks the claimed task `Failed` with the captured error detail.
    pub fn fail(&self, claim: &WorkClaim, error: impl Into<String>) -> Result<(), LoomError> {
        let error = error.into();
        self.with_claimed_entry(claim, |entry| {
            entry.record.state = VectorizationState::Failed;
            entry.record.error_message = Some(error);
            entry.record.completed_at = Some(Utc::now());
            entry.lease = None;
        })
    }

    /// Current task record for a document, if one exists.
    pub fn task(&self, document_id: DocumentId) -> Option<TaskRecord> {
        self.entries
            .lock()
            .get(&document_id)
            .map(|entry| entry.record.clone())
    }

    /// Drops the task record entirely (document deletion cascade).
    pub fn remove(&self, document_id: DocumentId) -> bool {
        self.entries.lock().remove(&document_id).is_some()
    }

    fn lease_expired(&self, lease: &Lease) -> bool {
        let age = Utc::now().signed_duration_since(lease.acquired_at);
        age.to_std()
            .map(|age| age >= self.lock_timeout)
            .unwrap_or(false)
    }

    fn with_claimed(
        &self,
        claim: &WorkClaim,
        f: impl FnOnce(&mut TaskRecord),
    ) -> Result<(), LoomError> {
        self.with_claimed_entry(claim, |entry| f(&mut entry.record))
    }

    fn with_claimed_entry(
        &self,
        claim: &WorkClaim,
        f: impl FnOnce(&mut TaskEntry),
    ) -> Result<(), LoomError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&claim.document_id)
            .ok_or(LoomError::ClaimExpired(claim.document_id))?;

        let holds_lock = entry
            .lease
            .as_ref()
            .is_some_and(|lease| lease.token == claim.token);
        if !holds_lock {
            return Err(LoomError::ClaimExpired(claim.document_id));
        }

        f(entry);
        Ok(())
    }
}
