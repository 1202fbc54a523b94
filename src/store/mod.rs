//! Storage abstraction for the pipeline.
//!
//! The [`Store`] trait is everything the collect → filter → generate
//! pipeline needs from persistence. Two backends exist: the SQLite store
//! used by the CLI ([`SqliteStore`](crate::sqlite_store::SqliteStore)) and
//! the in-memory [`InMemoryStore`] used by tests.
//!
//! Uniqueness of `content_hash` is the backend's job: callers never check
//! before inserting, they read the [`InsertOutcome`].

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Complaint, ErrorRecord, Idea, NewComplaint, NewIdea};

pub use memory::InMemoryStore;

/// Result of an insert-if-absent on `content_hash`.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Complaint),
    /// A complaint with the same fingerprint already exists; nothing written.
    Duplicate,
}

/// Totals for `hunt stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSummary {
    pub complaints: i64,
    pub ideas: i64,
    /// Complaints with no idea yet, regardless of failure count.
    pub pending: i64,
    /// Pending complaints that have hit the attempt cap.
    pub exhausted: i64,
    pub favorites: i64,
    pub errors_by_type: Vec<(String, i64)>,
    pub mean_tokens_per_idea: Option<f64>,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_complaint_if_absent`](Store::insert_complaint_if_absent) | Atomic dedup insert |
/// | [`insert_idea`](Store::insert_idea) | Persist a validated idea |
/// | [`insert_error`](Store::insert_error) | Append to the error log |
/// | [`complaints_without_idea`](Store::complaints_without_idea) | Generation work queue |
/// | [`record_generation_failure`](Store::record_generation_failure) | Bump a complaint's failure count |
/// | [`tokens_used_since`](Store::tokens_used_since) | Spend window for the daily budget |
/// | [`summary`](Store::summary) | Totals for reporting |
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_complaint_if_absent(&self, complaint: &NewComplaint) -> Result<InsertOutcome>;

    /// Fails if the complaint already has an idea.
    async fn insert_idea(&self, idea: &NewIdea) -> Result<Idea>;

    async fn insert_error(&self, record: &ErrorRecord) -> Result<()>;

    /// Oldest first, ties in insertion order. Complaints that failed generation `max_failures` times
    /// or more are left out.
    async fn complaints_without_idea(&self, max_failures: u32, limit: usize)
        -> Result<Vec<Complaint>>;

    /// Returns the complaint's failure count after the increment.
    async fn record_generation_failure(&self, complaint_id: Uuid, reason: &str) -> Result<u32>;

    /// Sum of `tokens_used` over ideas generated at or after `since`.
    async fn tokens_used_since(&self, since: DateTime<Utc>) -> Result<u64>;

    async fn summary(&self, max_failures: u32) -> Result<StoreSummary>;
}
