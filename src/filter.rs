//! Complaint filter: sentiment gate, then duplicate gate.
//!
//! [`ComplaintFilter::evaluate`] is pure. It scores the text and, if the
//! item is negative enough, returns a [`NewComplaint`] carrying its
//! fingerprint. [`ComplaintFilter::apply`] adds the one storage call, an
//! atomic insert-if-absent, so the duplicate check and the write cannot be
//! split by a concurrent task.

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::config::FilterConfig;
use crate::fingerprint::fingerprint;
use crate::models::{Complaint, NewComplaint, RawItem};
use crate::sentiment::{is_feature_request, SentimentAnalyzer};
use crate::store::{InsertOutcome, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Compound score at or above the threshold.
    Sentiment,
    /// Fingerprint already stored.
    Duplicate,
    /// Nothing left after trimming.
    Empty,
}

/// Outcome of the pure stage.
#[derive(Debug, Clone)]
pub enum Verdict {
    Candidate(NewComplaint),
    Rejected { reason: RejectReason, score: f64 },
}

/// Outcome of the full filter, storage included.
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    Accepted(Complaint),
    Rejected(RejectReason),
}

pub struct ComplaintFilter {
    analyzer: SentimentAnalyzer,
    threshold: f64,
    window: usize,
}

impl ComplaintFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            analyzer: SentimentAnalyzer::new(),
            threshold: config.sentiment_threshold,
            window: config.dedup_token_window,
        }
    }

    pub fn evaluate(&self, item: &RawItem) -> Verdict {
        let content = item.text.trim();
        if content.is_empty() {
            return Verdict::Rejected {
                reason: RejectReason::Empty,
                score: 0.0,
            };
        }

        let scores = self.analyzer.analyze(content);
        if scores.compound >= self.threshold {
            return Verdict::Rejected {
                reason: RejectReason::Sentiment,
                score: scores.compound,
            };
        }

        let mut metadata = item.source_metadata.clone();
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert(
                "sentiment".to_string(),
                serde_json::to_value(scores).unwrap_or(serde_json::Value::Null),
            );
            obj.insert(
                "feature_request".to_string(),
                serde_json::Value::Bool(is_feature_request(content)),
            );
        }

        Verdict::Candidate(NewComplaint {
            source_kind: item.source_kind,
            source_url: item.source_url.clone(),
            content: content.to_string(),
            content_hash: fingerprint(content, self.window),
            sentiment_score: scores.compound,
            scraped_at: item.collected_at,
            source_metadata: metadata,
        })
    }

    pub async fn apply(&self, store: &dyn Store, item: &RawItem) -> Result<FilterOutcome> {
        let candidate = match self.evaluate(item) {
            Verdict::Candidate(c) => c,
            Verdict::Rejected { reason, score } => {
                debug!(reason = ?reason, score, "Item rejected");
                return Ok(FilterOutcome::Rejected(reason));
            }
        };

        match store.insert_complaint_if_absent(&candidate).await? {
            InsertOutcome::Inserted(complaint) => Ok(FilterOutcome::Accepted(complaint)),
            InsertOutcome::Duplicate => {
                debug!(hash = %candidate.content_hash, "Duplicate complaint discarded");
                Ok(FilterOutcome::Rejected(RejectReason::Duplicate))
            }
        }
    }
}
