//! Play Store review adapter.
//!
//! Fetches each package's details page and pulls reviews out of it. The
//! page embeds review data in script blobs, which the primary pattern
//! reads; when that finds nothing, a second pattern walks the rendered
//! review blocks instead. Only reviews rated `max_rating` or lower and
//! at least 10 characters long are kept, at most `max_reviews` per
//! package.

use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::info;

use crate::config::PlayStoreSourceConfig;
use crate::error::ParseFailed;
use crate::fetch::{FetchOptions, Fetcher};
use crate::models::{RawItem, SourceKind};
use crate::source::{Collected, Source};

const MIN_REVIEW_CHARS: usize = 10;

static RE_APP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""name":"([^"]+)""#).expect("valid regex"));
static RE_EMBEDDED_REVIEW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""gp:AOqpTOH[^"]*","([^"]+)","([^"]*)",(\d+),[^,]*,[^,]*,"([^"]*)""#)
        .expect("valid regex")
});
static RE_REVIEW_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*data-review-id[^>]*>.*?</div>"#).expect("valid regex")
});
static RE_BLOCK_RATING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"aria-label="Rated (\d+) stars"#).expect("valid regex"));
static RE_BLOCK_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span[^>]*jsname="[^"]*"[^>]*>([^<]+)</span>"#).expect("valid regex")
});
static RE_BLOCK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<span[^>]*>([^<]+)</span>"#).expect("valid regex"));

/// One review pulled off a page, before rating/length filtering.
#[derive(Debug, Clone, PartialEq)]
struct Review {
    reviewer: String,
    text: String,
    rating: u8,
    date: Option<String>,
}

pub struct PlayStoreSource {
    name: String,
    description: String,
    config: PlayStoreSourceConfig,
    fetcher: Arc<Fetcher>,
}

impl PlayStoreSource {
    pub fn new(name: String, config: PlayStoreSourceConfig, fetcher: Arc<Fetcher>) -> Self {
        let description = format!(
            "Play Store reviews rated {} or lower for {}",
            config.max_rating,
            config.packages.join(", ")
        );
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
            .with_rate_limit_marker("Our systems have detected unusual traffic")
    }

    fn details_url(&self, package: &str) -> String {
        format!(
            "{}/store/apps/details?id={}&hl=en&showAllReviews=true",
            self.config.base_url.trim_end_matches('/'),
            package
        )
    }

    fn package_stream<'a>(&'a self, package: &'a str) -> BoxStream<'a, Collected> {
        let options = self.options();
        async_stream::stream! {
            let url = self.details_url(package);
            let page = match self.fetcher.fetch_with(&url, &options).await {
                Ok(p) => p,
                Err(e) => {
                    yield Collected::fetch_failed(SourceKind::PlayStore, &e);
                    return;
                }
            };

            let app_name = RE_APP_NAME
                .captures(&page.body)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| package.to_string());

            let (reviews, failures) = extract_reviews(&page.body);
            for err in &failures {
                yield Collected::parse_failed(SourceKind::PlayStore, &url, err);
            }

            let mut kept = 0usize;
            for review in reviews {
                if kept >= self.config.max_reviews {
                    break;
                }
                if review.rating > self.config.max_rating
                    || review.text.chars().count() < MIN_REVIEW_CHARS
                {
                    continue;
                }
                kept += 1;
                yield Collected::Item(
                    RawItem::new(SourceKind::PlayStore, Some(url.clone()), review.text.clone())
                        .with_metadata(serde_json::json!({
                            "source": self.source_label(),
                            "app_name": app_name,
                            "package_name": package,
                            "reviewer": review.reviewer,
                            "rating": review.rating,
                            "review_date": review.date,
                            "type": "review",
                        })),
                );
            }

            info!(package, reviews = kept, "Collected Play Store reviews");
        }
        .boxed()
    }
}

/// Reviews from the embedded data, or from the review blocks if the
/// embedded data yields nothing. Malformed matches come back as failures.
fn extract_reviews(body: &str) -> (Vec<Review>, Vec<ParseFailed>) {
    let mut reviews = Vec::new();
    let mut failures = Vec::new();

    for caps in RE_EMBEDDED_REVIEW.captures_iter(body) {
        let rating = match caps[3].parse::<u8>() {
            Ok(r) if (1..=5).contains(&r) => r,
            _ => {
                failures.push(ParseFailed::new(
                    "play store review",
                    format!("rating '{}' out of range", &caps[3]),
                ));
                continue;
            }
        };
        reviews.push(Review {
            reviewer: caps[1].to_string(),
            text: caps[2].replace("\\n", "\n").trim().to_string(),
            rating,
            date: Some(caps[4].to_string()).filter(|d| !d.is_empty()),
        });
    }

    if reviews.is_empty() {
        for block in RE_REVIEW_BLOCK.find_iter(body) {
            let block = block.as_str();
            let Some(rating) = RE_BLOCK_RATING
                .captures(block)
                .and_then(|c| c[1].parse::<u8>().ok())
            else {
                continue;
            };
            let Some(text) = RE_BLOCK_TEXT.captures(block).map(|c| decode_entities(c[1].trim()))
            else {
                continue;
            };
            let reviewer = RE_BLOCK_NAME
                .captures(block)
                .map(|c| decode_entities(c[1].trim()))
                .unwrap_or_else(|| "Anonymous".to_string());
            reviews.push(Review {
                reviewer,
                text,
                rating,
                date: None,
            });
        }
    }

    (reviews, failures)
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

impl Source for PlayStoreSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> SourceKind {
        SourceKind::PlayStore
    }

    fn collect(&self) -> BoxStream<'_, Collected> {
        stream::iter(self.config.packages.iter())
            .map(move |pkg| self.package_stream(pkg.as_str()))
            .flatten_unordered(None)
            .boxed()
    }
}
