mod common;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use idea_hunter::config::{FetchConfig, PlayStoreSourceConfig, RedditSourceConfig};
use idea_hunter::error::{FETCH_FAILED, PARSE_FAILED};
use idea_hunter::fetch::Fetcher;
use idea_hunter::models::{RawItem, SourceKind};
use idea_hunter::source::{Collected, Source};
use idea_hunter::source_play_store::PlayStoreSource;
use idea_hunter::source_reddit::RedditSource;

fn fetcher() -> Arc<Fetcher> {
    let config = FetchConfig {
        backoff_base_seconds: 0.0,
        jitter_ms: 0,
        ..FetchConfig::default()
    };
    Arc::new(Fetcher::new(&config).unwrap())
}

fn reddit_config(base_url: &str, subreddits: &[&str]) -> RedditSourceConfig {
    let subs: Vec<String> = subreddits.iter().map(|s| format!("\"{}\"", s)).collect();
    toml::from_str(&format!(
        "subreddits = [{}]\nbase_url = \"{}\"\nlistings = [\"hot\"]\npages = 2\ncomment_posts = 1\n",
        subs.join(", "),
        base_url
    ))
    .unwrap()
}

fn post(id: &str, title: &str, selftext: &str) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "title": title,
            "selftext": selftext,
            "subreddit": "apps",
            "author": "someone",
            "permalink": format!("/r/apps/comments/{}/x/", id),
            "score": 12,
            "created_utc": 1700000000.0
        }
    })
}

async fn hot_listing(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("after").map(String::as_str) {
        None => Json(json!({
            "kind": "Listing",
            "data": {
                "children": [
                    post("p1", "Why does every budget app crash", "It loses my data every week and support never answers"),
                    {"kind": "t3", "data": {"id": "v1", "title": "Look at this video of my cat", "is_video": true}},
                    post("r1", "[removed]", ""),
                    post("s1", "meh", ""),
                ],
                "after": "t3_p1"
            }
        })),
        Some(_) => Json(json!({
            "kind": "Listing",
            "data": {
                "children": [
                    post("p2", "Calendar sync is broken again", "Events vanish after every update"),
                ],
                "after": null
            }
        })),
    }
}

async fn p1_comments() -> Json<Value> {
    Json(json!([
        {"kind": "Listing", "data": {"children": [post("p1", "Why does every budget app crash", "")]}},
        {"kind": "Listing", "data": {"children": [
            {"kind": "t1", "data": {
                "id": "c1",
                "body": "I have the same problem with sync losing entries",
                "author": "other",
                "link_id": "t3_p1",
                "permalink": "/r/apps/comments/p1/x/c1/",
                "score": 3,
                "created_utc": 1700000100.0
            }},
            {"kind": "t1", "data": {"id": "c2", "body": "[deleted]"}},
            {"kind": "t1", "data": {"id": "c3", "body": "same"}},
            {"kind": "more", "data": {"count": 10}}
        ]}}
    ]))
}

async fn broken_listing() -> &'static str {
    "<html>not json</html>"
}

async fn down() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn reddit_server() -> String {
    let app = Router::new()
        .route("/r/apps/hot.json", get(hot_listing))
        .route("/r/apps/comments/p1.json", get(p1_comments))
        .route("/r/garbled/hot.json", get(broken_listing))
        .route("/r/offline/hot.json", get(down));
    common::serve(app).await
}

fn split(events: Vec<Collected>) -> (Vec<RawItem>, Vec<idea_hunter::models::ErrorRecord>) {
    let mut items = Vec::new();
    let mut failures = Vec::new();
    for event in events {
        match event {
            Collected::Item(item) => items.push(item),
            Collected::Failed(record) => failures.push(record),
        }
    }
    (items, failures)
}

#[tokio::test]
async fn reddit_reads_pages_and_comment_threads() {
    let base = reddit_server().await;
    let source = RedditSource::new("apps".to_string(), reddit_config(&base, &["apps"]), fetcher());
    assert_eq!(source.source_label(), "reddit:apps");

    let (items, failures) = split(source.collect().collect().await);

    assert!(failures.is_empty(), "unexpected failures: {:?}", failures);
    assert_eq!(items.len(), 3);

    let first = &items[0];
    assert_eq!(first.source_kind, SourceKind::Reddit);
    assert!(first.text.starts_with("Why does every budget app crash\n\n"));
    assert_eq!(first.source_metadata["post_id"], "p1");
    assert_eq!(first.source_metadata["type"], "post");
    assert_eq!(
        first.source_url.as_deref(),
        Some(format!("{}/r/apps/comments/p1/x/", base).as_str())
    );

    assert_eq!(items[1].source_metadata["post_id"], "p2");

    let comment = &items[2];
    assert_eq!(comment.text, "I have the same problem with sync losing entries");
    assert_eq!(comment.source_metadata["type"], "comment");
    assert_eq!(comment.source_metadata["post_id"], "p1");
    assert_eq!(comment.source_metadata["comment_id"], "c1");
}

#[tokio::test]
async fn reddit_failures_become_events() {
    let base = reddit_server().await;
    let source = RedditSource::new(
        "mixed".to_string(),
        reddit_config(&base, &["garbled", "offline"]),
        fetcher(),
    );

    let (items, failures) = split(source.collect().collect().await);

    assert!(items.is_empty());
    assert_eq!(failures.len(), 2);
    let parse = failures
        .iter()
        .find(|f| f.error_type == PARSE_FAILED)
        .expect("parse failure");
    assert!(parse.url.as_deref().unwrap_or("").contains("/r/garbled/"));
    let fetch = failures
        .iter()
        .find(|f| f.error_type == FETCH_FAILED)
        .expect("fetch failure");
    assert_eq!(fetch.retry_count, 3);
    assert_eq!(fetch.source_kind, SourceKind::Reddit);
}

async fn details(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if params.get("id").map(String::as_str) != Some("com.example.budget") {
        return StatusCode::NOT_FOUND.into_response();
    }
    Html(
        r#"<script>{"name":"Budget Buddy"}</script>
        <script>data=[["gp:AOqpTOH1","Dana","Keeps logging me out, useless since the update",1,null,null,"2024-03-01"],
        ["gp:AOqpTOH2","Lee","Sync is slow and the widget is broken",2,null,null,"2024-03-02"],
        ["gp:AOqpTOH3","Kim","Love it, works great every day",5,null,null,"2024-03-03"],
        ["gp:AOqpTOH4","Bo","Bad",1,null,null,"2024-03-04"]]</script>"#,
    )
    .into_response()
}

#[tokio::test]
async fn play_store_keeps_low_rated_reviews() {
    let app = Router::new().route("/store/apps/details", get(details));
    let base = common::serve(app).await;
    let config: PlayStoreSourceConfig = toml::from_str(&format!(
        "packages = [\"com.example.budget\"]\nbase_url = \"{}\"\nmax_rating = 3\n",
        base
    ))
    .unwrap();
    let source = PlayStoreSource::new("finance".to_string(), config, fetcher());

    let (items, failures) = split(source.collect().collect().await);

    assert!(failures.is_empty(), "unexpected failures: {:?}", failures);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].text, "Keeps logging me out, useless since the update");
    assert_eq!(items[0].source_kind, SourceKind::PlayStore);
    assert_eq!(items[0].source_metadata["app_name"], "Budget Buddy");
    assert_eq!(items[0].source_metadata["package_name"], "com.example.budget");
    assert_eq!(items[0].source_metadata["rating"], 1);
    assert_eq!(items[1].source_metadata["reviewer"], "Lee");
}
