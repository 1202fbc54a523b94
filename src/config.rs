use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cost_guard: CostGuardConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// Items are kept only when their compound score is strictly below this.
    #[serde(default = "default_sentiment_threshold")]
    pub sentiment_threshold: f64,
    #[serde(default = "default_dedup_token_window")]
    pub dedup_token_window: usize,
    /// How many items are run through the filter at once.
    #[serde(default = "default_filter_concurrency")]
    pub concurrency: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sentiment_threshold: default_sentiment_threshold(),
            dedup_token_window: default_dedup_token_window(),
            concurrency: default_filter_concurrency(),
        }
    }
}

fn default_sentiment_threshold() -> f64 {
    -0.3
}
fn default_dedup_token_window() -> usize {
    120
}
fn default_filter_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Total attempts per URL, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_seconds")]
    pub backoff_base_seconds: f64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency_limit: usize,
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_seconds: default_backoff_base_seconds(),
            jitter_ms: default_jitter_ms(),
            timeout_secs: default_fetch_timeout_secs(),
            concurrency_limit: default_fetch_concurrency(),
            max_retry_after_secs: default_max_retry_after_secs(),
            user_agents: default_user_agents(),
        }
    }
}

/// Upper bound accepted for `fetch.backoff_base_seconds`.
pub const MAX_BACKOFF_BASE_SECS: u64 = 3600;

impl FetchConfig {
    pub fn backoff_base(&self) -> Duration {
        let max = Duration::from_secs(MAX_BACKOFF_BASE_SECS);
        Duration::try_from_secs_f64(self.backoff_base_seconds)
            .map(|base| base.min(max))
            .unwrap_or(max)
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_seconds() -> f64 {
    1.0
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_fetch_concurrency() -> usize {
    4
}
fn default_max_retry_after_secs() -> u64 {
    60
}
fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Transport-level retries for a single LLM call (429 / 5xx / network).
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_concurrency")]
    pub concurrency_limit: usize,
    /// A complaint whose generation failed this many times is no longer selected.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_ideas_per_run")]
    pub max_ideas_per_run: usize,
    #[serde(default)]
    pub prompt_path: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_base: default_api_base(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            concurrency_limit: default_generation_concurrency(),
            max_attempts: default_max_attempts(),
            max_ideas_per_run: default_max_ideas_per_run(),
            prompt_path: None,
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_tokens() -> u32 {
    200
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> u32 {
    2
}
fn default_generation_concurrency() -> usize {
    5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_max_ideas_per_run() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct CostGuardConfig {
    #[serde(default = "default_token_ceiling")]
    pub token_ceiling: f64,
    /// Stop launching generations once the running mean is over the ceiling.
    #[serde(default)]
    pub preemptive: bool,
    #[serde(default = "default_preemptive_min_samples")]
    pub preemptive_min_samples: usize,
    #[serde(default = "default_cost_per_1k_tokens")]
    pub cost_per_1k_tokens: f64,
    /// Generation stops once spend over the trailing 24 hours exceeds this.
    #[serde(default = "default_daily_budget_usd")]
    pub daily_budget_usd: f64,
}

impl Default for CostGuardConfig {
    fn default() -> Self {
        Self {
            token_ceiling: default_token_ceiling(),
            preemptive: false,
            preemptive_min_samples: default_preemptive_min_samples(),
            cost_per_1k_tokens: default_cost_per_1k_tokens(),
            daily_budget_usd: default_daily_budget_usd(),
        }
    }
}

fn default_token_ceiling() -> f64 {
    600.0
}
fn default_preemptive_min_samples() -> usize {
    3
}
fn default_cost_per_1k_tokens() -> f64 {
    0.002
}
fn default_daily_budget_usd() -> f64 {
    100.0
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub reddit: BTreeMap<String, RedditSourceConfig>,
    #[serde(default)]
    pub play_store: BTreeMap<String, PlayStoreSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedditSourceConfig {
    pub subreddits: Vec<String>,
    #[serde(default = "default_reddit_base_url")]
    pub base_url: String,
    #[serde(default = "default_listings")]
    pub listings: Vec<String>,
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: u32,
    /// Listing pages followed via the `after` cursor.
    #[serde(default = "default_pages")]
    pub pages: u32,
    /// Posts whose comment threads are fetched as well.
    #[serde(default = "default_comment_posts")]
    pub comment_posts: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_reddit_base_url() -> String {
    "https://www.reddit.com".to_string()
}
fn default_listings() -> Vec<String> {
    vec!["hot".to_string(), "new".to_string()]
}
fn default_posts_per_page() -> u32 {
    100
}
fn default_pages() -> u32 {
    1
}
fn default_comment_posts() -> usize {
    10
}
fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlayStoreSourceConfig {
    pub packages: Vec<String>,
    #[serde(default = "default_play_store_base_url")]
    pub base_url: String,
    /// Reviews rated above this are ignored.
    #[serde(default = "default_max_rating")]
    pub max_rating: u8,
    #[serde(default = "default_max_reviews")]
    pub max_reviews: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_play_store_base_url() -> String {
    "https://play.google.com".to_string()
}
fn default_max_rating() -> u8 {
    3
}
fn default_max_reviews() -> usize {
    200
}

impl Config {
    /// All-defaults configuration pointing at `db_path`, with no sources.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            filter: FilterConfig::default(),
            fetch: FetchConfig::default(),
            generation: GenerationConfig::default(),
            cost_guard: CostGuardConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !(-1.0..=1.0).contains(&config.filter.sentiment_threshold) {
        anyhow::bail!("filter.sentiment_threshold must be in [-1.0, 1.0]");
    }
    if config.filter.dedup_token_window == 0 {
        anyhow::bail!("filter.dedup_token_window must be > 0");
    }
    if config.filter.concurrency == 0 {
        anyhow::bail!("filter.concurrency must be >= 1");
    }

    if config.fetch.max_retries == 0 {
        anyhow::bail!("fetch.max_retries must be >= 1");
    }
    let base = config.fetch.backoff_base_seconds;
    if !base.is_finite() || !(0.0..=MAX_BACKOFF_BASE_SECS as f64).contains(&base) {
        anyhow::bail!(
            "fetch.backoff_base_seconds must be between 0 and {}",
            MAX_BACKOFF_BASE_SECS
        );
    }
    if config.fetch.concurrency_limit == 0 {
        anyhow::bail!("fetch.concurrency_limit must be >= 1");
    }
    if config.fetch.user_agents.is_empty() {
        anyhow::bail!("fetch.user_agents must list at least one user agent");
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.generation.concurrency_limit == 0 {
        anyhow::bail!("generation.concurrency_limit must be >= 1");
    }
    if config.generation.max_attempts == 0 {
        anyhow::bail!("generation.max_attempts must be >= 1");
    }

    if config.cost_guard.token_ceiling <= 0.0 {
        anyhow::bail!("cost_guard.token_ceiling must be > 0");
    }
    if !config.cost_guard.cost_per_1k_tokens.is_finite() || config.cost_guard.cost_per_1k_tokens < 0.0 {
        anyhow::bail!("cost_guard.cost_per_1k_tokens must be >= 0");
    }
    if !config.cost_guard.daily_budget_usd.is_finite() || config.cost_guard.daily_budget_usd <= 0.0 {
        anyhow::bail!("cost_guard.daily_budget_usd must be > 0");
    }

    for (name, reddit) in &config.sources.reddit {
        if reddit.subreddits.is_empty() {
            anyhow::bail!("sources.reddit.{}: subreddits must not be empty", name);
        }
        for listing in &reddit.listings {
            if !matches!(listing.as_str(), "hot" | "new" | "top" | "rising") {
                anyhow::bail!(
                    "sources.reddit.{}: unknown listing '{}' (hot, new, top, rising)",
                    name,
                    listing
                );
            }
        }
    }
    for (name, store) in &config.sources.play_store {
        if store.packages.is_empty() {
            anyhow::bail!("sources.play_store.{}: packages must not be empty", name);
        }
        if !(1..=5).contains(&store.max_rating) {
            anyhow::bail!("sources.play_store.{}: max_rating must be in 1..=5", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse("[db]\npath = \"hunt.sqlite\"\n").unwrap();
        assert_eq!(config.filter.sentiment_threshold, -0.3);
        assert_eq!(config.filter.dedup_token_window, 120);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.backoff_base(), Duration::from_secs(1));
        assert_eq!(config.cost_guard.token_ceiling, 600.0);
        assert_eq!(config.generation.max_attempts, 3);
        assert!(!config.cost_guard.preemptive);
        assert!(config.sources.reddit.is_empty());
    }

    #[test]
    fn named_source_instances_are_parsed() {
        let config = parse(
            r#"
[db]
path = "hunt.sqlite"

[sources.reddit.apps]
subreddits = ["apps", "androidapps"]
pages = 2

[sources.play_store.social]
packages = ["com.example.chat"]
"#,
        )
        .unwrap();

        let apps = &config.sources.reddit["apps"];
        assert_eq!(apps.subreddits.len(), 2);
        assert_eq!(apps.listings, vec!["hot", "new"]);
        assert_eq!(apps.pages, 2);
        assert_eq!(config.sources.play_store["social"].max_rating, 3);
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse("[db]\npath = \"x\"\n[generation]\nprovider = \"mystery\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }

    #[test]
    fn rejects_zero_retries() {
        assert!(parse("[db]\npath = \"x\"\n[fetch]\nmax_retries = 0\n").is_err());
    }

    #[test]
    fn rejects_oversized_backoff_base() {
        let err = parse("[db]\npath = \"x\"\n[fetch]\nbackoff_base_seconds = 1e20\n").unwrap_err();
        assert!(err.to_string().contains("backoff_base_seconds"));
        assert!(parse("[db]\npath = \"x\"\n[fetch]\nbackoff_base_seconds = 3600.0\n").is_ok());

        let huge = FetchConfig {
            backoff_base_seconds: 1e20,
            ..FetchConfig::default()
        };
        assert_eq!(huge.backoff_base(), Duration::from_secs(MAX_BACKOFF_BASE_SECS));
    }

    #[test]
    fn daily_budget_defaults_and_must_be_positive() {
        let config = parse("[db]\npath = \"x\"\n").unwrap();
        assert_eq!(config.cost_guard.daily_budget_usd, 100.0);
        assert!(parse("[db]\npath = \"x\"\n[cost_guard]\ndaily_budget_usd = 0.0\n").is_err());
    }

    #[test]
    fn rejects_unknown_listing() {
        let err = parse(
            "[db]\npath = \"x\"\n[sources.reddit.a]\nsubreddits = [\"apps\"]\nlistings = [\"controversial-ish\"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown listing"));
    }
}
