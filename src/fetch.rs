//! HTTP fetching with retry, backoff and client-identity rotation.
//!
//! Every source adapter goes through one shared [`Fetcher`]. A call is
//! retried on transport errors, any non-2xx status, and bodies that carry a
//! source-specific rate-limit marker. The delay before retry `n` is
//! `base × 2^(n−1)` plus a random jitter; a `429` with a numeric
//! `Retry-After` header waits at least that long (capped by
//! `max_retry_after_secs`). Each attempt sends a different `User-Agent`
//! from the configured pool.
//!
//! The fetcher never writes to storage. Exhaustion surfaces as
//! [`FetchError::FetchFailed`] and the caller records it.
//!
//! Concurrency across all adapters is bounded by a semaphore owned by the
//! fetcher; a permit is held only while a request is in flight, never
//! across a backoff sleep.

use anyhow::Result;
use rand::Rng;
use reqwest::header::{RETRY_AFTER, USER_AGENT};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Per-call knobs. Defaults come from `[fetch]`.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Total attempts, including the first.
    pub max_retries: u32,
    pub timeout: Duration,
    /// Substrings that mark a 2xx body as a disguised rate-limit page.
    pub rate_limit_markers: Vec<String>,
}

impl FetchOptions {
    pub fn with_rate_limit_marker(mut self, marker: impl Into<String>) -> Self {
        self.rate_limit_markers.push(marker.into());
        self
    }
}

/// A successful response body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
    /// How many attempts it took (1 = first try).
    pub attempts: u32,
}

pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
    permits: Arc<Semaphore>,
}

enum AttemptOutcome {
    Done(FetchedPage),
    Retry {
        status: Option<u16>,
        error: String,
        retry_after: Option<Duration>,
    },
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            permits: Arc::new(Semaphore::new(config.concurrency_limit.max(1))),
        })
    }

    pub fn default_options(&self) -> FetchOptions {
        FetchOptions {
            max_retries: self.config.max_retries,
            timeout: Duration::from_secs(self.config.timeout_secs),
            rate_limit_markers: Vec::new(),
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.fetch_with(url, &self.default_options()).await
    }

    pub async fn fetch_with(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let max_attempts = options.max_retries.max(1);
        let identity_offset = rand::rng().random_range(0..self.config.user_agents.len().max(1));
        let mut last_status = None;
        let mut last_error = String::from("no attempt made");

        for attempt in 0..max_attempts {
            let agent = user_agent_for(&self.config.user_agents, identity_offset, attempt);

            match self.attempt(parsed.clone(), agent, options, attempt + 1).await {
                AttemptOutcome::Done(page) => {
                    debug!(url, attempts = page.attempts, "Fetched page");
                    return Ok(page);
                }
                AttemptOutcome::Retry {
                    status,
                    error,
                    retry_after,
                } => {
                    last_status = status;
                    last_error = error;

                    if attempt + 1 >= max_attempts {
                        break;
                    }

                    let mut delay = backoff_delay(self.config.backoff_base(), attempt + 1)
                        + self.jitter();
                    if let Some(wait) = retry_after {
                        let cap = Duration::from_secs(self.config.max_retry_after_secs);
                        delay = delay.max(wait.min(cap));
                    }

                    warn!(
                        url,
                        attempt = attempt + 1,
                        status = ?last_status,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "Fetch failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(FetchError::FetchFailed {
            url: url.to_string(),
            last_status,
            last_error,
            attempts: max_attempts,
        })
    }

    async fn attempt(
        &self,
        url: Url,
        agent: &str,
        options: &FetchOptions,
        attempt_no: u32,
    ) -> AttemptOutcome {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return AttemptOutcome::Retry {
                    status: None,
                    error: e.to_string(),
                    retry_after: None,
                }
            }
        };

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, agent)
            .timeout(options.timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return AttemptOutcome::Retry {
                    status: None,
                    error: e.to_string(),
                    retry_after: None,
                }
            }
        };

        let status = response.status();
        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        } else {
            None
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::Retry {
                    status: Some(status.as_u16()),
                    error: format!("failed to read body: {}", e),
                    retry_after,
                }
            }
        };

        if !status.is_success() {
            return AttemptOutcome::Retry {
                status: Some(status.as_u16()),
                error: format!("HTTP {}", status),
                retry_after,
            };
        }

        if let Some(marker) = options
            .rate_limit_markers
            .iter()
            .find(|m| body.contains(m.as_str()))
        {
            return AttemptOutcome::Retry {
                status: Some(status.as_u16()),
                error: format!("rate-limit marker in body: {}", marker),
                retry_after: None,
            };
        }

        AttemptOutcome::Done(FetchedPage {
            url: url.to_string(),
            status: status.as_u16(),
            body,
            attempts: attempt_no,
        })
    }

    fn jitter(&self) -> Duration {
        if self.config.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..self.config.jitter_ms))
    }
}

/// Delay before retry number `retry` (1-based): `base × 2^(retry−1)`.
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let exp = retry.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp)
}

/// Identity for `attempt`, rotating from a per-call starting offset.
pub fn user_agent_for(agents: &[String], offset: usize, attempt: u32) -> &str {
    if agents.is_empty() {
        return concat!("idea-hunter/", env!("CARGO_PKG_VERSION"));
    }
    &agents[(offset + attempt as usize) % agents.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(4));
    }

    #[test]
    fn user_agent_changes_every_attempt() {
        let agents: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let seen: Vec<&str> = (0..3).map(|n| user_agent_for(&agents, 2, n)).collect();
        assert_eq!(seen, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn rejects_non_http_urls_without_retrying() {
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher.fetch("ftp://example.com/file").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
        assert_eq!(err.attempts(), 0);

        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
