use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tempfile::TempDir;

use idea_hunter::config::{load_config, Config};
use idea_hunter::models::{ErrorRecord, IdeaScores, NewComplaint, NewIdea, SourceKind};
use idea_hunter::sqlite_store::SqliteStore;
use idea_hunter::store::{InsertOutcome, Store};

async fn open_store() -> (TempDir, Arc<SqliteStore>) {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("hunt.sqlite"));
    let store = Arc::new(SqliteStore::open(&config).await.unwrap());
    (tmp, store)
}

fn complaint(content: &str, hash: &str) -> NewComplaint {
    NewComplaint {
        source_kind: SourceKind::Reddit,
        source_url: Some("https://www.reddit.com/r/apps/comments/p1/".to_string()),
        content: content.to_string(),
        content_hash: hash.to_string(),
        sentiment_score: -0.6,
        scraped_at: Utc::now(),
        source_metadata: serde_json::json!({"subreddit": "apps"}),
    }
}

fn idea(complaint_id: uuid::Uuid, market: u8) -> NewIdea {
    NewIdea {
        complaint_id,
        idea_text: "A budgeting app that syncs reliably".to_string(),
        scores: IdeaScores {
            market,
            tech: 6,
            competition: 7,
            monetisation: 5,
            feasibility: 9,
            overall: 7,
        },
        raw_response: "{}".to_string(),
        tokens_used: 321,
        generated_at: Utc::now(),
    }
}

#[tokio::test]
async fn concurrent_inserts_of_one_fingerprint_store_one_row() {
    let (_tmp, store) = open_store().await;

    let tasks = (0..20).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .insert_complaint_if_absent(&complaint(&format!("copy {}", i), "same-hash"))
                .await
                .unwrap()
        })
    });
    let outcomes: Vec<InsertOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let inserted = outcomes
        .iter()
        .filter(|o| matches!(o, InsertOutcome::Inserted(_)))
        .count();
    assert_eq!(inserted, 1);
    assert_eq!(store.summary(3).await.unwrap().complaints, 1);
}

#[tokio::test]
async fn complaint_round_trips_through_backlog() {
    let (_tmp, store) = open_store().await;

    let InsertOutcome::Inserted(stored) = store
        .insert_complaint_if_absent(&complaint("Sync keeps losing my entries", "h1"))
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };

    let pending = store.complaints_without_idea(3, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, stored.id);
    assert_eq!(pending[0].content, "Sync keeps losing my entries");
    assert_eq!(pending[0].source_kind, SourceKind::Reddit);
    assert_eq!(pending[0].source_metadata["subreddit"], "apps");

    let saved = store.insert_idea(&idea(stored.id, 8)).await.unwrap();
    assert_eq!(saved.scores.market, 8);
    assert!(!saved.is_favorite);
    assert!(store.complaints_without_idea(3, 10).await.unwrap().is_empty());

    let summary = store.summary(3).await.unwrap();
    assert_eq!(summary.ideas, 1);
    assert_eq!(summary.mean_tokens_per_idea, Some(321.0));
}

#[tokio::test]
async fn second_idea_for_a_complaint_is_refused() {
    let (_tmp, store) = open_store().await;
    let InsertOutcome::Inserted(stored) = store
        .insert_complaint_if_absent(&complaint("The export button does nothing", "h2"))
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };

    store.insert_idea(&idea(stored.id, 8)).await.unwrap();
    assert!(store.insert_idea(&idea(stored.id, 7)).await.is_err());
    assert_eq!(store.summary(3).await.unwrap().ideas, 1);
}

#[tokio::test]
async fn out_of_range_scores_are_refused() {
    let (_tmp, store) = open_store().await;
    let InsertOutcome::Inserted(stored) = store
        .insert_complaint_if_absent(&complaint("Notifications arrive hours late", "h3"))
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };

    assert!(store.insert_idea(&idea(stored.id, 11)).await.is_err());
    assert_eq!(store.summary(3).await.unwrap().ideas, 0);
}

#[tokio::test]
async fn failures_accumulate_until_the_cap() {
    let (_tmp, store) = open_store().await;
    let InsertOutcome::Inserted(stored) = store
        .insert_complaint_if_absent(&complaint("Login fails every other day", "h4"))
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };

    assert_eq!(store.record_generation_failure(stored.id, "bad json").await.unwrap(), 1);
    assert_eq!(store.record_generation_failure(stored.id, "bad json").await.unwrap(), 2);
    assert_eq!(store.complaints_without_idea(3, 10).await.unwrap().len(), 1);
    assert_eq!(store.complaints_without_idea(2, 10).await.unwrap().len(), 0);

    store
        .insert_error(
            &ErrorRecord::new(SourceKind::Reddit, None, "GenerationFailed", "bad json")
                .with_retry_count(2),
        )
        .await
        .unwrap();
    let summary = store.summary(2).await.unwrap();
    assert_eq!(summary.exhausted, 1);
    assert_eq!(summary.errors_by_type, vec![("GenerationFailed".to_string(), 1)]);
}

#[test]
fn config_file_with_sources_loads() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("hunt.toml");
    std::fs::write(
        &path,
        r#"
[db]
path = "./data/hunt.sqlite"

[filter]
sentiment_threshold = -0.4

[generation]
provider = "disabled"

[sources.reddit.apps]
subreddits = ["androidapps", "iosapps"]
listings = ["new"]

[sources.play_store.finance]
packages = ["com.example.budget"]
max_rating = 2
enabled = false
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.filter.sentiment_threshold, -0.4);
    assert!(!config.generation.is_enabled());
    assert_eq!(config.sources.reddit["apps"].subreddits.len(), 2);
    assert_eq!(config.sources.reddit["apps"].listings, vec!["new".to_string()]);
    assert!(!config.sources.play_store["finance"].enabled);
    assert_eq!(config.sources.play_store["finance"].max_rating, 2);
}

#[test]
fn unknown_listing_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("hunt.toml");
    std::fs::write(
        &path,
        "[db]\npath = \"x.sqlite\"\n\n[sources.reddit.apps]\nsubreddits = [\"apps\"]\nlistings = [\"best\"]\n",
    )
    .unwrap();
    assert!(load_config(&path).is_err());
}
