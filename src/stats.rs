//! Storage overview and run summaries.
//!
//! `hunt stats` prints what is stored: complaints, ideas, the generation
//! backlog, errors by type and a per-source breakdown. The run summary
//! printer is shared with `hunt run`.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::pipeline::RunStats;
use crate::sqlite_store::SqliteStore;
use crate::store::Store;

struct SourceStats {
    source_kind: String,
    complaints: i64,
    ideas: i64,
    last_scraped: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let summary = store.summary(config.generation.max_attempts).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Idea Hunter — Database Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Complaints:  {}", summary.complaints);
    println!("  Ideas:       {}", summary.ideas);
    println!(
        "  Pending:     {} ({} past the attempt cap)",
        summary.pending, summary.exhausted
    );
    println!("  Favorites:   {}", summary.favorites);
    match summary.mean_tokens_per_idea {
        Some(mean) => println!(
            "  Mean tokens per idea: {:.1} (ceiling {:.0})",
            mean, config.cost_guard.token_ceiling
        ),
        None => println!("  Mean tokens per idea: n/a"),
    }

    if !summary.errors_by_type.is_empty() {
        println!();
        println!("  Errors:");
        for (error_type, count) in &summary.errors_by_type {
            println!("    {:<20} {:>6}", error_type, count);
        }
    }

    let rows = sqlx::query(
        r#"
        SELECT c.source_kind,
               COUNT(DISTINCT c.id) AS complaints,
               COUNT(DISTINCT i.id) AS ideas,
               MAX(c.scraped_at) AS last_scraped
        FROM complaints c
        LEFT JOIN ideas i ON i.complaint_id = c.id
        GROUP BY c.source_kind
        ORDER BY complaints DESC
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    let by_source: Vec<SourceStats> = rows
        .iter()
        .map(|row| SourceStats {
            source_kind: row.get("source_kind"),
            complaints: row.get("complaints"),
            ideas: row.get("ideas"),
            last_scraped: row.get("last_scraped"),
        })
        .collect();

    if !by_source.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<16} {:>10} {:>6}   {}",
            "SOURCE", "COMPLAINTS", "IDEAS", "LAST SCRAPED"
        );
        println!("  {}", "-".repeat(56));
        for s in &by_source {
            let scraped = match s.last_scraped {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<16} {:>10} {:>6}   {}",
                s.source_kind, s.complaints, s.ideas, scraped
            );
        }
    }

    println!();
    store.close().await;
    Ok(())
}

/// Human-readable summary of one run, in the style of the other commands.
pub fn print_run_stats(stats: &RunStats) {
    println!("run {}", stats.final_state.as_str());
    println!("  fetched: {} items", stats.items_fetched);
    println!(
        "  failures: {} fetch, {} parse",
        stats.fetch_failures, stats.parse_failures
    );
    println!("  accepted: {}", stats.accepted);
    println!(
        "  rejected: {} sentiment, {} duplicate, {} empty",
        stats.rejected.sentiment, stats.rejected.duplicate, stats.rejected.empty
    );
    println!(
        "  ideas: {} generated, {} failed (of {} attempted)",
        stats.ideas_generated, stats.generation_failures, stats.generation_attempted
    );
    if let Some(model) = &stats.model {
        println!("  model: {}", model);
    }
    println!(
        "  tokens: {} total, {:.1} mean per idea (~${:.4})",
        stats.total_tokens, stats.mean_tokens_per_idea, stats.estimated_cost_usd
    );
    let guard = if stats.guard_preempted {
        "TRIPPED (pre-emptive stop)"
    } else if stats.guard_tripped {
        "TRIPPED"
    } else {
        "ok"
    };
    println!(
        "  cost guard: {} (ceiling {:.0})",
        guard, stats.guard.ceiling
    );
    println!(
        "  daily spend: ${:.4}{}",
        stats.daily_spend_usd,
        if stats.budget_exhausted { " (budget exhausted)" } else { "" }
    );
    if stats.storage_errors > 0 {
        println!("  storage errors: {}", stats.storage_errors);
    }
    if stats.stopped_early {
        println!("  stopped early on request");
    }
    let elapsed = stats.finished_at - stats.started_at;
    println!("  elapsed: {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
