//! Idea generation and reply validation.
//!
//! The generator renders the prompt, calls the [`LanguageModel`] and
//! validates the reply before anything is written. A reply is accepted
//! only if it is a JSON object with a non-empty `idea` string and all six
//! `score_*` fields present as integers in `1..=10`. Extra fields are
//! tolerated and kept in `raw_response`.
//!
//! Replies that are not JSON get one recovery attempt: code fences are
//! stripped and the first balanced `{…}` in the text is tried on its own.

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{GenerationError, GENERATION_FAILED};
use crate::llm::LanguageModel;
use crate::models::{Complaint, ErrorRecord, Idea, IdeaScores, NewIdea};
use crate::prompts::{render, SYSTEM_PROMPT};
use crate::store::Store;

/// Complaints shorter than this (in characters, trimmed) are refused.
pub const MIN_COMPLAINT_CHARS: usize = 10;
/// Ideas longer than this are kept but logged.
pub const IDEA_WORD_LIMIT: usize = 35;

const SCORE_FIELDS: [&str; 6] = [
    "score_market",
    "score_tech",
    "score_competition",
    "score_monetisation",
    "score_feasibility",
    "score_overall",
];

/// A reply that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIdea {
    pub idea_text: String,
    pub scores: IdeaScores,
}

/// A failed generation, with whatever the call cost.
#[derive(Debug)]
pub struct GenerationFailure {
    pub error: GenerationError,
    pub tokens_used: u32,
}

/// What happened to one complaint.
#[derive(Debug)]
pub enum Attempt {
    Stored(Idea),
    Failed {
        tokens_used: u32,
        reason: String,
        /// Failures recorded against the complaint so far, this one included.
        failures: u32,
    },
}

impl Attempt {
    pub fn tokens_used(&self) -> u32 {
        match self {
            Attempt::Stored(idea) => idea.tokens_used,
            Attempt::Failed { tokens_used, .. } => *tokens_used,
        }
    }
}

pub struct IdeaGenerator {
    model: Arc<dyn LanguageModel>,
    template: String,
}

impl IdeaGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, template: String) -> Self {
        Self { model, template }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Produces a validated idea for `complaint` without touching storage.
    pub async fn generate(&self, complaint: &Complaint) -> Result<NewIdea, GenerationFailure> {
        let content = complaint.content.trim();
        let chars = content.chars().count();
        if chars < MIN_COMPLAINT_CHARS {
            return Err(GenerationFailure {
                error: GenerationError::InvalidComplaint(chars),
                tokens_used: 0,
            });
        }

        let prompt = render(&self.template, content);
        let completion = self
            .model
            .complete(SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| GenerationFailure {
                tokens_used: e.token_count(),
                error: e.into(),
            })?;

        let parsed = parse_reply(&completion.text).map_err(|error| GenerationFailure {
            error,
            tokens_used: completion.token_count,
        })?;

        let words = parsed.idea_text.split_whitespace().count();
        if words > IDEA_WORD_LIMIT {
            warn!(complaint_id = %complaint.id, words, "Idea text exceeds word limit");
        }

        Ok(NewIdea {
            complaint_id: complaint.id,
            idea_text: parsed.idea_text,
            scores: parsed.scores,
            raw_response: completion.text,
            tokens_used: completion.token_count,
            generated_at: Utc::now(),
        })
    }

    /// Generates and persists. A failed generation is recorded as an
    /// [`ErrorRecord`] and counted against the complaint; only storage
    /// errors come back as `Err`.
    pub async fn generate_and_store(
        &self,
        store: &dyn Store,
        complaint: &Complaint,
    ) -> Result<Attempt> {
        match self.generate(complaint).await {
            Ok(new_idea) => {
                let idea = store.insert_idea(&new_idea).await?;
                debug!(complaint_id = %complaint.id, tokens = idea.tokens_used, "Idea stored");
                Ok(Attempt::Stored(idea))
            }
            Err(failure) => {
                let reason = failure.error.to_string();
                let failures = store
                    .record_generation_failure(complaint.id, &reason)
                    .await?;
                let record = ErrorRecord::new(
                    complaint.source_kind,
                    complaint.source_url.clone(),
                    GENERATION_FAILED,
                    format!("complaint {}: {}", complaint.id, reason),
                )
                .with_retry_count(failures);
                store.insert_error(&record).await?;

                warn!(
                    complaint_id = %complaint.id,
                    failures,
                    error = %reason,
                    "Idea generation failed"
                );
                Ok(Attempt::Failed {
                    tokens_used: failure.tokens_used,
                    reason,
                    failures,
                })
            }
        }
    }
}

/// Validates an LLM reply. Never panics; every problem is a
/// [`GenerationError`].
pub fn parse_reply(text: &str) -> Result<ParsedIdea, GenerationError> {
    let value = parse_json_lenient(text)?;
    let obj = value
        .as_object()
        .ok_or_else(|| GenerationError::InvalidReply("reply is not a JSON object".to_string()))?;

    let idea_text = match obj.get("idea") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => {
            return Err(GenerationError::InvalidReply("idea text is empty".to_string()))
        }
        Some(_) => {
            return Err(GenerationError::InvalidReply("idea is not a string".to_string()))
        }
        None => {
            return Err(GenerationError::InvalidReply(
                "missing required field: idea".to_string(),
            ))
        }
    };

    let mut scores = [0u8; 6];
    for (slot, field) in scores.iter_mut().zip(SCORE_FIELDS) {
        let value = obj.get(field).ok_or_else(|| {
            GenerationError::InvalidReply(format!("missing required field: {}", field))
        })?;
        *slot = value
            .as_i64()
            .filter(|n| (1..=10).contains(n))
            .map(|n| n as u8)
            .ok_or_else(|| {
                GenerationError::InvalidReply(format!("invalid score for {}: {}", field, value))
            })?;
    }

    Ok(ParsedIdea {
        idea_text,
        scores: IdeaScores {
            market: scores[0],
            tech: scores[1],
            competition: scores[2],
            monetisation: scores[3],
            feasibility: scores[4],
            overall: scores[5],
        },
    })
}

fn parse_json_lenient(text: &str) -> Result<Value, GenerationError> {
    let stripped = strip_json_fences(text);
    match serde_json::from_str::<Value>(stripped) {
        Ok(v) => Ok(v),
        Err(first) => {
            let candidate = first_balanced_object(stripped)
                .ok_or_else(|| GenerationError::MalformedReply(first.to_string()))?;
            serde_json::from_str::<Value>(candidate)
                .map_err(|e| GenerationError::MalformedReply(e.to_string()))
        }
    }
}

/// Strips ```json … ``` or ``` … ``` fences.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(rest) => rest
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(rest.trim()),
        None => text,
    }
}

/// First `{…}` whose braces balance, ignoring braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"idea":"Offline-first budgeting app","score_market":8,"score_tech":6,"score_competition":7,"score_monetisation":5,"score_feasibility":9,"score_overall":7}"#;

    #[test]
    fn accepts_valid_reply() {
        let parsed = parse_reply(VALID).unwrap();
        assert_eq!(parsed.idea_text, "Offline-first budgeting app");
        assert_eq!(parsed.scores.as_array(), [8, 6, 7, 5, 9, 7]);
    }

    #[test]
    fn tolerates_extra_fields_and_fences() {
        let reply = format!("```json\n{}\n```", VALID.replace("}", r#","notes":"x"}"#));
        assert!(parse_reply(&reply).is_ok());
    }

    #[test]
    fn recovers_object_from_surrounding_prose() {
        let reply = format!("Sure! Here is the idea: {} Hope that helps {{:}}", VALID);
        assert_eq!(parse_reply(&reply).unwrap().scores.overall, 7);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_recovery() {
        let reply = r#"noise {"idea":"Use {templates} for }} notes","score_market":1,"score_tech":2,"score_competition":3,"score_monetisation":4,"score_feasibility":5,"score_overall":6} trailing"#;
        assert_eq!(
            parse_reply(reply).unwrap().idea_text,
            "Use {templates} for }} notes"
        );
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            parse_reply("I'm sorry, I can't help with that."),
            Err(GenerationError::MalformedReply(_))
        ));
        assert!(matches!(
            parse_reply("{ not json at all"),
            Err(GenerationError::MalformedReply(_))
        ));
    }

    #[test]
    fn rejects_every_missing_or_out_of_range_score() {
        let base: Value = serde_json::from_str(VALID).unwrap();
        for field in SCORE_FIELDS {
            for bad in [
                Value::Null,
                serde_json::json!(0),
                serde_json::json!(11),
                serde_json::json!(-3),
                serde_json::json!(7.5),
                serde_json::json!("7"),
            ] {
                let mut reply = base.clone();
                reply[field] = bad.clone();
                let err = parse_reply(&reply.to_string()).unwrap_err();
                assert!(
                    matches!(err, GenerationError::InvalidReply(_)),
                    "{field}={bad} should be invalid"
                );
            }
            let mut missing = base.clone();
            missing.as_object_mut().unwrap().remove(field);
            assert!(parse_reply(&missing.to_string()).is_err());
        }
    }

    #[test]
    fn rejects_empty_or_missing_idea() {
        let mut reply: Value = serde_json::from_str(VALID).unwrap();
        reply["idea"] = serde_json::json!("   ");
        assert!(parse_reply(&reply.to_string()).is_err());
        reply.as_object_mut().unwrap().remove("idea");
        assert!(parse_reply(&reply.to_string()).is_err());
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(matches!(
            parse_reply("[1, 2, 3]"),
            Err(GenerationError::InvalidReply(_))
        ));
    }
}
