//! SQLite-backed [`Store`] implementation.
//!
//! Uniqueness lives in the schema: `complaints.content_hash` and
//! `ideas.complaint_id` are `UNIQUE`, and every score column carries a
//! `CHECK (… BETWEEN 1 AND 10)`. The dedup insert is a single
//! `INSERT … ON CONFLICT(content_hash) DO NOTHING`, so concurrent filter
//! tasks racing on the same fingerprint cannot both win.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Complaint, ErrorRecord, Idea, NewComplaint, NewIdea, SourceKind};
use crate::store::{InsertOutcome, Store, StoreSummary};
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to the configured database and applies the schema.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn complaint_from_row(row: &SqliteRow) -> Result<Complaint> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    Ok(Complaint {
        id: Uuid::parse_str(&id).with_context(|| format!("bad complaint id '{}'", id))?,
        source_kind: SourceKind::parse(row.get::<String, _>("source_kind").as_str()),
        source_url: row.get("source_url"),
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        sentiment_score: row.get("sentiment_score"),
        scraped_at: from_ts(row.get("scraped_at")),
        source_metadata: serde_json::from_str(&metadata_json)
            .unwrap_or_else(|_| serde_json::json!({})),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_complaint_if_absent(&self, complaint: &NewComplaint) -> Result<InsertOutcome> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO complaints (id, source_kind, source_url, content, content_hash,
                                    sentiment_score, scraped_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(complaint.source_kind.as_str())
        .bind(&complaint.source_url)
        .bind(&complaint.content)
        .bind(&complaint.content_hash)
        .bind(complaint.sentiment_score)
        .bind(complaint.scraped_at.timestamp())
        .bind(complaint.source_metadata.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Inserted(Complaint::from_new(id, complaint)))
    }

    async fn insert_idea(&self, idea: &NewIdea) -> Result<Idea> {
        let id = Uuid::new_v4();
        let s = idea.scores;
        sqlx::query(
            r#"
            INSERT INTO ideas (id, complaint_id, idea_text, score_market, score_tech,
                               score_competition, score_monetisation, score_feasibility,
                               score_overall, raw_response, tokens_used, generated_at, is_favorite)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(id.to_string())
        .bind(idea.complaint_id.to_string())
        .bind(&idea.idea_text)
        .bind(i64::from(s.market))
        .bind(i64::from(s.tech))
        .bind(i64::from(s.competition))
        .bind(i64::from(s.monetisation))
        .bind(i64::from(s.feasibility))
        .bind(i64::from(s.overall))
        .bind(&idea.raw_response)
        .bind(i64::from(idea.tokens_used))
        .bind(idea.generated_at.timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert idea for complaint {}", idea.complaint_id))?;

        Ok(Idea {
            id,
            complaint_id: idea.complaint_id,
            idea_text: idea.idea_text.clone(),
            scores: idea.scores,
            raw_response: idea.raw_response.clone(),
            tokens_used: idea.tokens_used,
            generated_at: idea.generated_at,
            is_favorite: false,
        })
    }

    async fn insert_error(&self, record: &ErrorRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO errors (source_kind, url, error_message, error_type, occurred_at, retry_count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.source_kind.as_str())
        .bind(&record.url)
        .bind(&record.error_message)
        .bind(&record.error_type)
        .bind(record.occurred_at.timestamp())
        .bind(i64::from(record.retry_count))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complaints_without_idea(
        &self,
        max_failures: u32,
        limit: usize,
    ) -> Result<Vec<Complaint>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source_kind, c.source_url, c.content, c.content_hash,
                   c.sentiment_score, c.scraped_at, c.metadata_json
            FROM complaints c
            LEFT JOIN ideas i ON i.complaint_id = c.id
            LEFT JOIN generation_attempts g ON g.complaint_id = c.id
            WHERE i.id IS NULL AND COALESCE(g.failures, 0) < ?
            ORDER BY c.scraped_at ASC, c.rowid ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(max_failures))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(complaint_from_row).collect()
    }

    async fn record_generation_failure(&self, complaint_id: Uuid, reason: &str) -> Result<u32> {
        let failures: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO generation_attempts (complaint_id, failures, last_error, updated_at)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(complaint_id) DO UPDATE SET
                failures = failures + 1,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            RETURNING failures
            "#,
        )
        .bind(complaint_id.to_string())
        .bind(reason)
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(failures.max(0) as u32)
    }

    async fn tokens_used_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(tokens_used), 0) FROM ideas WHERE generated_at >= ?",
        )
        .bind(since.timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(total.max(0) as u64)
    }

    async fn summary(&self, max_failures: u32) -> Result<StoreSummary> {
        let complaints: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM complaints")
            .fetch_one(&self.pool)
            .await?;
        let ideas: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ideas")
            .fetch_one(&self.pool)
            .await?;
        let favorites: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ideas WHERE is_favorite = 1")
            .fetch_one(&self.pool)
            .await?;

        let pending_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS pending,
                   COALESCE(SUM(CASE WHEN COALESCE(g.failures, 0) >= ? THEN 1 ELSE 0 END), 0) AS exhausted
            FROM complaints c
            LEFT JOIN ideas i ON i.complaint_id = c.id
            LEFT JOIN generation_attempts g ON g.complaint_id = c.id
            WHERE i.id IS NULL
            "#,
        )
        .bind(i64::from(max_failures))
        .fetch_one(&self.pool)
        .await?;

        let error_rows = sqlx::query(
            "SELECT error_type, COUNT(*) AS cnt FROM errors GROUP BY error_type ORDER BY error_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let mean_tokens_per_idea: Option<f64> =
            sqlx::query_scalar("SELECT AVG(tokens_used) FROM ideas")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreSummary {
            complaints,
            ideas,
            pending: pending_row.get("pending"),
            exhausted: pending_row.get("exhausted"),
            favorites,
            errors_by_type: error_rows
                .iter()
                .map(|r| (r.get("error_type"), r.get("cnt")))
                .collect(),
            mean_tokens_per_idea,
        })
    }
}
