use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Opens the configured database and brings its schema up to date.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotent: every statement is `IF NOT EXISTS`.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS complaints (
            id TEXT PRIMARY KEY,
            source_kind TEXT NOT NULL,
            source_url TEXT,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL UNIQUE,
            sentiment_score REAL NOT NULL CHECK (sentiment_score BETWEEN -1.0 AND 1.0),
            scraped_at INTEGER NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ideas (
            id TEXT PRIMARY KEY,
            complaint_id TEXT NOT NULL UNIQUE,
            idea_text TEXT NOT NULL,
            score_market INTEGER NOT NULL CHECK (score_market BETWEEN 1 AND 10),
            score_tech INTEGER NOT NULL CHECK (score_tech BETWEEN 1 AND 10),
            score_competition INTEGER NOT NULL CHECK (score_competition BETWEEN 1 AND 10),
            score_monetisation INTEGER NOT NULL CHECK (score_monetisation BETWEEN 1 AND 10),
            score_feasibility INTEGER NOT NULL CHECK (score_feasibility BETWEEN 1 AND 10),
            score_overall INTEGER NOT NULL CHECK (score_overall BETWEEN 1 AND 10),
            raw_response TEXT NOT NULL,
            tokens_used INTEGER NOT NULL DEFAULT 0,
            generated_at INTEGER NOT NULL,
            is_favorite INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (complaint_id) REFERENCES complaints(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS errors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_kind TEXT NOT NULL,
            url TEXT,
            error_message TEXT NOT NULL,
            error_type TEXT NOT NULL,
            occurred_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Failed generations per complaint; complaints themselves stay immutable.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generation_attempts (
            complaint_id TEXT PRIMARY KEY,
            failures INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (complaint_id) REFERENCES complaints(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_complaints_scraped_at ON complaints(scraped_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_errors_type ON errors(error_type)")
        .execute(pool)
        .await?;

    Ok(())
}
