//! Reddit adapter.
//!
//! Reads each subreddit's listings through the public `.json` endpoints,
//! following the `after` cursor for up to `pages` pages per listing, then
//! reads the comment threads of the first `comment_posts` posts it saw.
//! Subreddits are collected concurrently; the shared fetcher's semaphore
//! bounds how many requests are actually in flight.
//!
//! Posts become `title\n\nselftext`. Videos, galleries, `[deleted]` and
//! `[removed]` content and anything under 20 characters are skipped.

use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RedditSourceConfig;
use crate::error::ParseFailed;
use crate::fetch::{FetchOptions, Fetcher};
use crate::models::{RawItem, SourceKind};
use crate::source::{Collected, Source};

const MIN_TEXT_CHARS: usize = 20;
const REMOVED_MARKERS: [&str; 2] = ["[deleted]", "[removed]"];

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    is_gallery: bool,
}

#[derive(Debug, Deserialize)]
struct Comment {
    id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    link_id: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
}

pub struct RedditSource {
    name: String,
    description: String,
    config: RedditSourceConfig,
    fetcher: Arc<Fetcher>,
}

impl RedditSource {
    pub fn new(name: String, config: RedditSourceConfig, fetcher: Arc<Fetcher>) -> Self {
        let description = format!("Reddit posts and comments from r/{}", config.subreddits.join(", r/"));
        Self {
            name,
            description,
            config,
            fetcher,
        }
    }

    fn options(&self) -> FetchOptions {
        self.fetcher
            .default_options()
            .with_rate_limit_marker("\"error\": 429")
            .with_rate_limit_marker("whoa there, pardner")
    }

    fn listing_url(&self, subreddit: &str, listing: &str, after: Option<&str>) -> String {
        let mut url = format!(
            "{}/r/{}/{}.json?limit={}&raw_json=1",
            self.config.base_url.trim_end_matches('/'),
            subreddit,
            listing,
            self.config.posts_per_page
        );
        if let Some(after) = after {
            url.push_str("&after=");
            url.push_str(after);
        }
        url
    }

    fn comments_url(&self, subreddit: &str, post_id: &str) -> String {
        format!(
            "{}/r/{}/comments/{}.json?limit=100&raw_json=1",
            self.config.base_url.trim_end_matches('/'),
            subreddit,
            post_id
        )
    }

    fn permalink(&self, path: &str) -> Option<String> {
        if path.is_empty() {
            None
        } else {
            Some(format!("{}{}", self.config.base_url.trim_end_matches('/'), path))
        }
    }

    fn subreddit_stream<'a>(&'a self, subreddit: &'a str) -> BoxStream<'a, Collected> {
        let options = self.options();
        async_stream::stream! {
            let mut post_ids: Vec<String> = Vec::new();
            let mut emitted = 0usize;

            for listing in &self.config.listings {
                let mut after: Option<String> = None;

                for page in 0..self.config.pages.max(1) {
                    let url = self.listing_url(subreddit, listing, after.as_deref());
                    let fetched = match self.fetcher.fetch_with(&url, &options).await {
                        Ok(p) => p,
                        Err(e) => {
                            yield Collected::fetch_failed(SourceKind::Reddit, &e);
                            break;
                        }
                    };

                    let parsed: Listing = match serde_json::from_str(&fetched.body) {
                        Ok(l) => l,
                        Err(e) => {
                            let err = ParseFailed::new("reddit listing", e.to_string());
                            yield Collected::parse_failed(SourceKind::Reddit, &url, &err);
                            break;
                        }
                    };

                    for thing in parsed.data.children {
                        match self.parse_thing(thing, subreddit) {
                            Ok(Some((item, post_id))) => {
                                if let Some(id) = post_id {
                                    if !post_ids.contains(&id) {
                                        post_ids.push(id);
                                    }
                                }
                                emitted += 1;
                                yield Collected::Item(item);
                            }
                            Ok(None) => {}
                            Err(err) => {
                                yield Collected::parse_failed(SourceKind::Reddit, &url, &err);
                            }
                        }
                    }

                    debug!(subreddit, listing = listing.as_str(), page, "Reddit page collected");
                    match parsed.data.after {
                        Some(next) if !next.is_empty() => after = Some(next),
                        _ => break,
                    }
                }
            }

            for post_id in post_ids.iter().take(self.config.comment_posts) {
                let url = self.comments_url(subreddit, post_id);
                let fetched = match self.fetcher.fetch_with(&url, &options).await {
                    Ok(p) => p,
                    Err(e) => {
                        yield Collected::fetch_failed(SourceKind::Reddit, &e);
                        continue;
                    }
                };

                let thread: Vec<Listing> = match serde_json::from_str(&fetched.body) {
                    Ok(t) => t,
                    Err(e) => {
                        let err = ParseFailed::new("reddit comment thread", e.to_string());
                        yield Collected::parse_failed(SourceKind::Reddit, &url, &err);
                        continue;
                    }
                };

                // Element 0 is the post itself, element 1 its comments.
                let Some(comments) = thread.into_iter().nth(1) else {
                    continue;
                };
                for thing in comments.data.children {
                    if thing.kind != "t1" {
                        continue;
                    }
                    match self.parse_comment(thing.data, subreddit) {
                        Ok(Some(item)) => {
                            emitted += 1;
                            yield Collected::Item(item);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            yield Collected::parse_failed(SourceKind::Reddit, &url, &err);
                        }
                    }
                }
            }

            info!(subreddit, items = emitted, "Collected from subreddit");
        }
        .boxed()
    }

    /// `Ok(None)` for things that are skipped on purpose.
    fn parse_thing(
        &self,
        thing: Thing,
        subreddit: &str,
    ) -> Result<Option<(RawItem, Option<String>)>, ParseFailed> {
        match thing.kind.as_str() {
            "t3" => {
                let post: Post = serde_json::from_value(thing.data)
                    .map_err(|e| ParseFailed::new("reddit post", e.to_string()))?;
                Ok(self
                    .post_item(&post, subreddit)
                    .map(|item| (item, Some(post.id.clone()))))
            }
            "t1" => Ok(self.parse_comment(thing.data, subreddit)?.map(|item| (item, None))),
            _ => Ok(None),
        }
    }

    fn post_item(&self, post: &Post, subreddit: &str) -> Option<RawItem> {
        if post.is_video || post.is_gallery {
            return None;
        }
        let title = post.title.trim();
        let selftext = post.selftext.trim();
        if REMOVED_MARKERS.contains(&title) || REMOVED_MARKERS.contains(&selftext) {
            return None;
        }

        let content = if selftext.is_empty() {
            title.to_string()
        } else {
            format!("{}\n\n{}", title, selftext)
        };
        if content.chars().count() < MIN_TEXT_CHARS {
            return None;
        }

        let subreddit = if post.subreddit.is_empty() {
            subreddit
        } else {
            post.subreddit.as_str()
        };
        Some(
            RawItem::new(SourceKind::Reddit, self.permalink(&post.permalink), content)
                .with_metadata(serde_json::json!({
                    "source": self.source_label(),
                    "subreddit": subreddit,
                    "author": post.author,
                    "post_id": post.id,
                    "score": post.score,
                    "created_utc": post.created_utc,
                    "type": "post",
                })),
        )
    }

    fn parse_comment(
        &self,
        data: serde_json::Value,
        subreddit: &str,
    ) -> Result<Option<RawItem>, ParseFailed> {
        let comment: Comment = serde_json::from_value(data)
            .map_err(|e| ParseFailed::new("reddit comment", e.to_string()))?;

        let body = comment.body.trim();
        if body.is_empty()
            || REMOVED_MARKERS.contains(&body)
            || body.chars().count() < MIN_TEXT_CHARS
        {
            return Ok(None);
        }

        let subreddit = if comment.subreddit.is_empty() {
            subreddit
        } else {
            comment.subreddit.as_str()
        };
        Ok(Some(
            RawItem::new(SourceKind::Reddit, self.permalink(&comment.permalink), body)
                .with_metadata(serde_json::json!({
                    "source": self.source_label(),
                    "subreddit": subreddit,
                    "author": comment.author,
                    "post_id": comment.link_id.trim_start_matches("t3_"),
                    "comment_id": comment.id,
                    "score": comment.score,
                    "created_utc": comment.created_utc,
                    "type": "comment",
                })),
        ))
    }
}

impl Source for RedditSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Reddit
    }

    fn collect(&self) -> BoxStream<'_, Collected> {
        stream::iter(self.config.subreddits.iter())
            .map(move |sub| self.subreddit_stream(sub.as_str()))
            .flatten_unordered(None)
            .boxed()
    }
}
