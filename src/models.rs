//! Core data models used throughout Idea Hunter.
//!
//! These types represent the raw items, complaints, ideas, and error records
//! that flow through the collect → filter → generate pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which family of source produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Reddit,
    PlayStore,
    /// Items from user-registered sources.
    Custom,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Reddit => "reddit",
            SourceKind::PlayStore => "play_store",
            SourceKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "reddit" => SourceKind::Reddit,
            "play_store" => SourceKind::PlayStore,
            _ => SourceKind::Custom,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw item produced by a source adapter before filtering. Never persisted.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub source_kind: SourceKind,
    pub source_url: Option<String>,
    pub text: String,
    pub collected_at: DateTime<Utc>,
    pub source_metadata: serde_json::Value,
}

impl RawItem {
    pub fn new(source_kind: SourceKind, source_url: Option<String>, text: impl Into<String>) -> Self {
        Self {
            source_kind,
            source_url,
            text: text.into(),
            collected_at: Utc::now(),
            source_metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.source_metadata = metadata;
        self
    }
}

/// A complaint that passed the sentiment gate, ready for the duplicate gate.
#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub source_kind: SourceKind,
    pub source_url: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub sentiment_score: f64,
    pub scraped_at: DateTime<Utc>,
    pub source_metadata: serde_json::Value,
}

/// A stored complaint. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct Complaint {
    pub id: Uuid,
    pub source_kind: SourceKind,
    pub source_url: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub sentiment_score: f64,
    pub scraped_at: DateTime<Utc>,
    pub source_metadata: serde_json::Value,
}

impl Complaint {
    pub fn from_new(id: Uuid, new: &NewComplaint) -> Self {
        Self {
            id,
            source_kind: new.source_kind,
            source_url: new.source_url.clone(),
            content: new.content.clone(),
            content_hash: new.content_hash.clone(),
            sentiment_score: new.sentiment_score,
            scraped_at: new.scraped_at,
            source_metadata: new.source_metadata.clone(),
        }
    }
}

/// The six 1–10 scores attached to every idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaScores {
    pub market: u8,
    pub tech: u8,
    pub competition: u8,
    pub monetisation: u8,
    pub feasibility: u8,
    pub overall: u8,
}

impl IdeaScores {
    pub fn as_array(&self) -> [u8; 6] {
        [
            self.market,
            self.tech,
            self.competition,
            self.monetisation,
            self.feasibility,
            self.overall,
        ]
    }
}

/// A validated idea waiting to be written.
#[derive(Debug, Clone)]
pub struct NewIdea {
    pub complaint_id: Uuid,
    pub idea_text: String,
    pub scores: IdeaScores,
    pub raw_response: String,
    pub tokens_used: u32,
    pub generated_at: DateTime<Utc>,
}

/// A stored idea.
#[derive(Debug, Clone, Serialize)]
pub struct Idea {
    pub id: Uuid,
    pub complaint_id: Uuid,
    pub idea_text: String,
    pub scores: IdeaScores,
    pub raw_response: String,
    pub tokens_used: u32,
    pub generated_at: DateTime<Utc>,
    /// Owned by the UI; the pipeline always writes `false`.
    pub is_favorite: bool,
}

/// Append-only diagnostic record for a failed unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub source_kind: SourceKind,
    pub url: Option<String>,
    pub error_message: String,
    pub error_type: String,
    pub occurred_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl ErrorRecord {
    pub fn new(
        source_kind: SourceKind,
        url: Option<String>,
        error_type: &str,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            source_kind,
            url,
            error_message: error_message.into(),
            error_type: error_type.to_string(),
            occurred_at: Utc::now(),
            retry_count: 0,
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}
