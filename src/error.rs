//! Failure taxonomy for the pipeline.
//!
//! Every per-item failure is isolated and turned into an [`ErrorRecord`]
//! rather than propagated. The `error_type` strings stored on those records
//! come from the constants below.
//!
//! [`ErrorRecord`]: crate::models::ErrorRecord

use thiserror::Error;

pub const FETCH_FAILED: &str = "FetchFailed";
pub const PARSE_FAILED: &str = "ParseFailed";
pub const GENERATION_FAILED: &str = "GenerationFailed";

/// Raised by the fetcher once every attempt for a URL has failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch of {url} failed after {attempts} attempt(s): {last_error}")]
    FetchFailed {
        url: String,
        /// HTTP status of the last attempt, if a response arrived at all.
        last_status: Option<u16>,
        last_error: String,
        attempts: u32,
    },

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::FetchFailed { url, .. } => url,
            FetchError::InvalidUrl(url) => url,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::FetchFailed { attempts, .. } => *attempts,
            FetchError::InvalidUrl(_) => 0,
        }
    }
}

/// An adapter could not make sense of a page or an item on it.
#[derive(Debug, Error)]
#[error("could not parse {what}: {reason}")]
pub struct ParseFailed {
    pub what: String,
    pub reason: String,
}

impl ParseFailed {
    pub fn new(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// Why the LLM call itself failed (as opposed to its reply being unusable).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM call timed out")]
    Timeout,

    /// The call went through and was billed, but carried no text.
    #[error("LLM returned empty content")]
    EmptyContent { token_count: u32 },

    #[error("LLM provider is not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Tokens the provider reported for a failed call. Only a reply that
    /// arrived can carry usage.
    pub fn token_count(&self) -> u32 {
        match self {
            LlmError::EmptyContent { token_count } => *token_count,
            _ => 0,
        }
    }
}

/// Why an idea could not be produced for a complaint.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("complaint is too short to generate from ({0} chars)")]
    InvalidComplaint(usize),

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("reply is not valid JSON: {0}")]
    MalformedReply(String),

    #[error("reply failed validation: {0}")]
    InvalidReply(String),
}
