//! In-memory [`Store`] implementation for tests.
//!
//! All state lives behind one `std::sync::RwLock`, so each operation,
//! including the dedup insert, is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Complaint, ErrorRecord, Idea, NewComplaint, NewIdea};

use super::{InsertOutcome, Store, StoreSummary};

#[derive(Default)]
struct Inner {
    complaints: Vec<Complaint>,
    hashes: HashSet<String>,
    ideas: HashMap<Uuid, Idea>,
    errors: Vec<ErrorRecord>,
    failures: HashMap<Uuid, u32>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every error record written so far.
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.inner
            .read()
            .map(|inner| inner.errors.clone())
            .unwrap_or_default()
    }

    pub fn ideas(&self) -> Vec<Idea> {
        self.inner
            .read()
            .map(|inner| inner.ideas.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn complaints(&self) -> Vec<Complaint> {
        self.inner
            .read()
            .map(|inner| inner.complaints.clone())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_complaint_if_absent(&self, complaint: &NewComplaint) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if !inner.hashes.insert(complaint.content_hash.clone()) {
            return Ok(InsertOutcome::Duplicate);
        }
        let stored = Complaint::from_new(Uuid::new_v4(), complaint);
        inner.complaints.push(stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn insert_idea(&self, idea: &NewIdea) -> Result<Idea> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if !inner.complaints.iter().any(|c| c.id == idea.complaint_id) {
            bail!("unknown complaint {}", idea.complaint_id);
        }
        if inner.ideas.contains_key(&idea.complaint_id) {
            bail!("complaint {} already has an idea", idea.complaint_id);
        }
        if idea.scores.as_array().iter().any(|s| !(1..=10).contains(s)) {
            bail!("idea scores must be within 1..=10");
        }
        let stored = Idea {
            id: Uuid::new_v4(),
            complaint_id: idea.complaint_id,
            idea_text: idea.idea_text.clone(),
            scores: idea.scores,
            raw_response: idea.raw_response.clone(),
            tokens_used: idea.tokens_used,
            generated_at: idea.generated_at,
            is_favorite: false,
        };
        inner.ideas.insert(idea.complaint_id, stored.clone());
        Ok(stored)
    }

    async fn insert_error(&self, record: &ErrorRecord) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.errors.push(record.clone());
        Ok(())
    }

    async fn complaints_without_idea(
        &self,
        max_failures: u32,
        limit: usize,
    ) -> Result<Vec<Complaint>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut pending: Vec<Complaint> = inner
            .complaints
            .iter()
            .filter(|c| !inner.ideas.contains_key(&c.id))
            .filter(|c| inner.failures.get(&c.id).copied().unwrap_or(0) < max_failures)
            .cloned()
            .collect();
        // Stable: `complaints` is in insertion order.
        pending.sort_by_key(|c| c.scraped_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn record_generation_failure(&self, complaint_id: Uuid, _reason: &str) -> Result<u32> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let count = inner.failures.entry(complaint_id).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn tokens_used_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .ideas
            .values()
            .filter(|i| i.generated_at >= since)
            .map(|i| u64::from(i.tokens_used))
            .sum())
    }

    async fn summary(&self, max_failures: u32) -> Result<StoreSummary> {
        let inner = self.inner.read().map_err(poisoned)?;
        let pending: Vec<&Complaint> = inner
            .complaints
            .iter()
            .filter(|c| !inner.ideas.contains_key(&c.id))
            .collect();
        let exhausted = pending
            .iter()
            .filter(|c| inner.failures.get(&c.id).copied().unwrap_or(0) >= max_failures)
            .count();

        let mut by_type: BTreeMap<String, i64> = BTreeMap::new();
        for e in &inner.errors {
            *by_type.entry(e.error_type.clone()).or_insert(0) += 1;
        }

        let mean_tokens_per_idea = if inner.ideas.is_empty() {
            None
        } else {
            let total: u64 = inner.ideas.values().map(|i| u64::from(i.tokens_used)).sum();
            Some(total as f64 / inner.ideas.len() as f64)
        };

        Ok(StoreSummary {
            complaints: inner.complaints.len() as i64,
            ideas: inner.ideas.len() as i64,
            pending: pending.len() as i64,
            exhausted: exhausted as i64,
            favorites: inner.ideas.values().filter(|i| i.is_favorite).count() as i64,
            errors_by_type: by_type.into_iter().collect(),
            mean_tokens_per_idea,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdeaScores, SourceKind};
    use chrono::{Duration, Utc};

    fn complaint(hash: &str) -> NewComplaint {
        NewComplaint {
            source_kind: SourceKind::Custom,
            source_url: None,
            content: format!("complaint {hash}"),
            content_hash: hash.to_string(),
            sentiment_score: -0.6,
            scraped_at: Utc::now(),
            source_metadata: serde_json::json!({}),
        }
    }

    fn idea_for(complaint_id: Uuid) -> NewIdea {
        NewIdea {
            complaint_id,
            idea_text: "An app".to_string(),
            scores: IdeaScores {
                market: 5,
                tech: 5,
                competition: 5,
                monetisation: 5,
                feasibility: 5,
                overall: 5,
            },
            raw_response: "{}".to_string(),
            tokens_used: 100,
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_insert_of_same_hash_is_duplicate() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.insert_complaint_if_absent(&complaint("h1")).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert!(matches!(
            store.insert_complaint_if_absent(&complaint("h1")).await.unwrap(),
            InsertOutcome::Duplicate
        ));
        assert_eq!(store.complaints().len(), 1);
    }

    #[tokio::test]
    async fn one_idea_per_complaint() {
        let store = InMemoryStore::new();
        let InsertOutcome::Inserted(c) = store.insert_complaint_if_absent(&complaint("h")).await.unwrap() else {
            panic!("expected insert");
        };
        store.insert_idea(&idea_for(c.id)).await.unwrap();
        assert!(store.insert_idea(&idea_for(c.id)).await.is_err());
        assert!(store.complaints_without_idea(3, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_cap_removes_complaint_from_queue() {
        let store = InMemoryStore::new();
        let InsertOutcome::Inserted(c) = store.insert_complaint_if_absent(&complaint("h")).await.unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(store.record_generation_failure(c.id, "bad json").await.unwrap(), 1);
        assert_eq!(store.complaints_without_idea(2, 10).await.unwrap().len(), 1);
        assert_eq!(store.record_generation_failure(c.id, "bad json").await.unwrap(), 2);
        assert!(store.complaints_without_idea(2, 10).await.unwrap().is_empty());

        let summary = store.summary(2).await.unwrap();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.exhausted, 1);
    }

    #[tokio::test]
    async fn same_second_complaints_keep_insertion_order() {
        let store = InMemoryStore::new();
        let at = Utc::now();
        let mut inserted = Vec::new();
        for hash in ["c", "a", "b"] {
            let mut new = complaint(hash);
            new.scraped_at = at;
            let InsertOutcome::Inserted(c) = store.insert_complaint_if_absent(&new).await.unwrap() else {
                panic!("expected insert");
            };
            inserted.push(c.id);
        }

        let pending: Vec<Uuid> = store
            .complaints_without_idea(3, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(pending, inserted);
    }

    #[tokio::test]
    async fn token_window_skips_older_ideas() {
        let store = InMemoryStore::new();
        let InsertOutcome::Inserted(recent) = store.insert_complaint_if_absent(&complaint("r")).await.unwrap() else {
            panic!("expected insert");
        };
        let InsertOutcome::Inserted(old) = store.insert_complaint_if_absent(&complaint("o")).await.unwrap() else {
            panic!("expected insert");
        };
        store.insert_idea(&idea_for(recent.id)).await.unwrap();
        let mut stale = idea_for(old.id);
        stale.generated_at = Utc::now() - Duration::days(2);
        store.insert_idea(&stale).await.unwrap();

        let since = Utc::now() - Duration::hours(24);
        assert_eq!(store.tokens_used_since(since).await.unwrap(), 100);
    }
}
