//! Source adapters and their registry.
//!
//! A [`Source`] turns some external site into a lazy stream of
//! [`Collected`] events: raw items, and failures it ran into along the
//! way. Adapters never raise; a page that cannot be fetched or an item
//! that cannot be parsed becomes a [`Collected::Failed`] event and the
//! stream carries on.
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │            SourceRegistry              │
//! │  ┌──────────┐ ┌────────────┐ ┌──────┐  │
//! │  │ reddit:* │ │play_store:*│ │custom│  │
//! │  └──────────┘ └────────────┘ └──────┘  │
//! └──────────────────┬─────────────────────┘
//!                    ▼
//!        select_all(collect()) → filter
//! ```

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{FetchError, ParseFailed, FETCH_FAILED, PARSE_FAILED};
use crate::fetch::Fetcher;
use crate::models::{ErrorRecord, RawItem, SourceKind};

/// One event from a source stream.
#[derive(Debug, Clone)]
pub enum Collected {
    Item(RawItem),
    Failed(ErrorRecord),
}

impl Collected {
    pub fn fetch_failed(kind: SourceKind, err: &FetchError) -> Self {
        Collected::Failed(
            ErrorRecord::new(kind, Some(err.url().to_string()), FETCH_FAILED, err.to_string())
                .with_retry_count(err.attempts()),
        )
    }

    pub fn parse_failed(kind: SourceKind, url: &str, err: &ParseFailed) -> Self {
        Collected::Failed(ErrorRecord::new(
            kind,
            Some(url.to_string()),
            PARSE_FAILED,
            err.to_string(),
        ))
    }
}

/// A producer of raw complaint text.
///
/// `collect` starts from scratch on every call; the returned stream is
/// finite and is not resumable.
///
/// # Example
///
/// ```rust
/// use futures::stream::{self, BoxStream, StreamExt};
/// use idea_hunter::models::{RawItem, SourceKind};
/// use idea_hunter::source::{Collected, Source};
///
/// struct Canned(Vec<String>);
///
/// impl Source for Canned {
///     fn name(&self) -> &str { "canned" }
///     fn description(&self) -> &str { "Fixed list of complaints" }
///     fn kind(&self) -> SourceKind { SourceKind::Custom }
///
///     fn collect(&self) -> BoxStream<'_, Collected> {
///         stream::iter(self.0.iter().map(|t| {
///             Collected::Item(RawItem::new(SourceKind::Custom, None, t.clone()))
///         }))
///         .boxed()
///     }
/// }
/// ```
pub trait Source: Send + Sync {
    /// Instance name from the config (e.g. `"apps"`).
    fn name(&self) -> &str;

    /// One line for `hunt sources`.
    fn description(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// `"{kind}:{name}"`, e.g. `"reddit:apps"`.
    fn source_label(&self) -> String {
        format!("{}:{}", self.kind(), self.name())
    }

    fn collect(&self) -> BoxStream<'_, Collected>;
}

/// Every active source for a run.
pub struct SourceRegistry {
    sources: Vec<Box<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Builds the Reddit and Play Store instances named in the config.
    /// Disabled instances are skipped.
    pub fn from_config(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        use crate::source_play_store::PlayStoreSource;
        use crate::source_reddit::RedditSource;

        let mut registry = Self::new();

        for (name, cfg) in &config.sources.reddit {
            if cfg.enabled {
                registry.register(Box::new(RedditSource::new(
                    name.clone(),
                    cfg.clone(),
                    fetcher.clone(),
                )));
            }
        }
        for (name, cfg) in &config.sources.play_store {
            if cfg.enabled {
                registry.register(Box::new(PlayStoreSource::new(
                    name.clone(),
                    cfg.clone(),
                    fetcher.clone(),
                )));
            }
        }

        registry
    }

    pub fn register(&mut self, source: Box<dyn Source>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Box<dyn Source>] {
        &self.sources
    }

    pub fn find(&self, label: &str) -> Option<&dyn Source> {
        self.sources
            .iter()
            .find(|s| s.source_label() == label)
            .map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// All sources interleaved, each polled concurrently.
    pub fn collect_all(&self) -> BoxStream<'_, Collected> {
        stream::select_all(self.sources.iter().map(|s| s.collect())).boxed()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned {
        name: String,
        texts: Vec<&'static str>,
    }

    impl Source for Canned {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "canned items"
        }
        fn kind(&self) -> SourceKind {
            SourceKind::Custom
        }
        fn collect(&self) -> BoxStream<'_, Collected> {
            stream::iter(
                self.texts
                    .iter()
                    .map(|t| Collected::Item(RawItem::new(SourceKind::Custom, None, *t))),
            )
            .boxed()
        }
    }

    #[tokio::test]
    async fn collect_all_merges_every_source() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(Canned {
            name: "a".into(),
            texts: vec!["one", "two"],
        }));
        registry.register(Box::new(Canned {
            name: "b".into(),
            texts: vec!["three"],
        }));

        let events: Vec<Collected> = registry.collect_all().collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(registry.len(), 2);
        assert!(registry.find("custom:b").is_some());
        assert!(registry.find("reddit:b").is_none());
    }

    #[test]
    fn from_config_skips_disabled_instances() {
        let config: Config = toml::from_str(
            r#"
[db]
path = "x.sqlite"

[sources.reddit.on]
subreddits = ["apps"]

[sources.reddit.off]
subreddits = ["apps"]
enabled = false

[sources.play_store.social]
packages = ["com.example"]
"#,
        )
        .unwrap();
        let fetcher = Arc::new(Fetcher::new(&config.fetch).unwrap());
        let registry = SourceRegistry::from_config(&config, fetcher);
        let labels: Vec<String> = registry.sources().iter().map(|s| s.source_label()).collect();
        assert_eq!(labels, vec!["reddit:on", "play_store:social"]);
    }
}
