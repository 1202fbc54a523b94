//! Token cost guard.
//!
//! The guard compares the mean tokens per successfully generated idea with
//! a ceiling. It is observational: a tripped guard is reported, and stored
//! ideas are never touched. The same check runs on a live run's ideas and
//! on an offline usage-sample file (`hunt guard`).
//!
//! Separately, a daily budget caps spend over the trailing 24 hours. Unlike
//! the token ceiling it is enforced: no generation starts once the budget
//! is spent.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::CostGuardConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardReport {
    pub samples: usize,
    pub total_tokens: u64,
    pub mean_tokens: f64,
    pub ceiling: f64,
    pub tripped: bool,
    pub estimated_cost_usd: f64,
}

/// Spend over the trailing 24 hours against `daily_budget_usd`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetCheck {
    pub spent_usd: f64,
    pub budget_usd: f64,
    pub remaining_usd: f64,
    pub exhausted: bool,
}

/// What a batch of generations is expected to cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEstimate {
    pub complaints: usize,
    pub tokens_per_complaint: f64,
    pub estimated_cost_usd: f64,
    pub remaining_usd: f64,
    pub can_afford: bool,
    /// How many complaints the remaining budget covers at that rate.
    pub max_affordable: usize,
}

/// Assumed cost of one generation when no ideas exist yet.
pub const DEFAULT_TOKENS_PER_COMPLAINT: f64 = 400.0;

/// One entry of a usage-sample file. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageSample {
    pub tokens_used: u64,
    #[serde(default = "default_idea_generated")]
    pub idea_generated: bool,
}

fn default_idea_generated() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct CostGuard {
    ceiling: f64,
    cost_per_1k_tokens: f64,
    min_samples: usize,
    daily_budget_usd: f64,
}

impl CostGuard {
    pub fn new(config: &CostGuardConfig) -> Self {
        Self {
            ceiling: config.token_ceiling,
            cost_per_1k_tokens: config.cost_per_1k_tokens,
            min_samples: config.preemptive_min_samples.max(1),
            daily_budget_usd: config.daily_budget_usd,
        }
    }

    pub fn with_ceiling(mut self, ceiling: f64) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn estimate_cost(&self, total_tokens: u64) -> f64 {
        total_tokens as f64 / 1000.0 * self.cost_per_1k_tokens
    }

    /// Post-hoc check over the token counts of successful generations.
    /// No samples means nothing to trip on.
    pub fn evaluate(&self, tokens: &[u32]) -> GuardReport {
        let total_tokens: u64 = tokens.iter().map(|&t| u64::from(t)).sum();
        let mean_tokens = if tokens.is_empty() {
            0.0
        } else {
            total_tokens as f64 / tokens.len() as f64
        };
        GuardReport {
            samples: tokens.len(),
            total_tokens,
            mean_tokens,
            ceiling: self.ceiling,
            tripped: mean_tokens > self.ceiling,
            estimated_cost_usd: self.estimate_cost(total_tokens),
        }
    }

    /// Pre-emptive check: true once there are enough samples and their
    /// running mean is over the ceiling.
    pub fn should_stop(&self, tokens: &[u32]) -> bool {
        tokens.len() >= self.min_samples && self.evaluate(tokens).tripped
    }

    /// `tokens_last_day` is every token spent in the trailing 24 hours.
    pub fn check_budget(&self, tokens_last_day: u64) -> BudgetCheck {
        let spent_usd = self.estimate_cost(tokens_last_day);
        BudgetCheck {
            spent_usd,
            budget_usd: self.daily_budget_usd,
            remaining_usd: (self.daily_budget_usd - spent_usd).max(0.0),
            exhausted: spent_usd > self.daily_budget_usd,
        }
    }

    /// Expected cost of generating for `complaints` more complaints at the
    /// historical mean, or [`DEFAULT_TOKENS_PER_COMPLAINT`] without one.
    pub fn estimate_batch(
        &self,
        complaints: usize,
        mean_tokens: Option<f64>,
        tokens_last_day: u64,
    ) -> BatchEstimate {
        let tokens_per_complaint = mean_tokens
            .filter(|m| *m > 0.0)
            .unwrap_or(DEFAULT_TOKENS_PER_COMPLAINT);
        let per_complaint_usd = tokens_per_complaint / 1000.0 * self.cost_per_1k_tokens;
        let estimated_cost_usd = per_complaint_usd * complaints as f64;
        let remaining_usd = self.check_budget(tokens_last_day).remaining_usd;
        let max_affordable = if per_complaint_usd > 0.0 {
            (remaining_usd / per_complaint_usd).floor() as usize
        } else {
            usize::MAX
        };
        BatchEstimate {
            complaints,
            tokens_per_complaint,
            estimated_cost_usd,
            remaining_usd,
            can_afford: estimated_cost_usd <= remaining_usd,
            max_affordable,
        }
    }

    /// Offline check over a JSON array of [`UsageSample`]s; only entries
    /// with `idea_generated = true` count.
    pub fn check_sample_file(&self, path: &Path) -> Result<GuardReport> {
        let samples = load_samples(path)?;
        let tokens: Vec<u32> = samples
            .iter()
            .filter(|s| s.idea_generated)
            .map(|s| u32::try_from(s.tokens_used).unwrap_or(u32::MAX))
            .collect();
        Ok(self.evaluate(&tokens))
    }
}

pub fn load_samples(path: &Path) -> Result<Vec<UsageSample>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read usage samples: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse usage samples: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn guard() -> CostGuard {
        CostGuard::new(&CostGuardConfig::default())
    }

    #[test]
    fn mean_under_ceiling_passes() {
        let report = guard().evaluate(&[400]);
        assert_eq!(report.mean_tokens, 400.0);
        assert!(!report.tripped);
        assert!((report.estimated_cost_usd - 0.0008).abs() < 1e-12);
    }

    #[test]
    fn mean_over_ceiling_trips() {
        let report = guard().evaluate(&[600, 700, 650]);
        assert_eq!(report.mean_tokens, 650.0);
        assert!(report.tripped);
    }

    #[test]
    fn mean_equal_to_ceiling_does_not_trip() {
        assert!(!guard().evaluate(&[600, 600]).tripped);
    }

    #[test]
    fn no_samples_never_trips() {
        let report = guard().evaluate(&[]);
        assert_eq!(report.samples, 0);
        assert!(!report.tripped);
    }

    #[test]
    fn preemptive_waits_for_min_samples() {
        let g = guard();
        assert!(!g.should_stop(&[900, 900]));
        assert!(g.should_stop(&[900, 900, 900]));
        assert!(!g.should_stop(&[100, 100, 100]));
    }

    #[test]
    fn budget_is_exhausted_only_past_the_limit() {
        let g = CostGuard::new(&CostGuardConfig {
            daily_budget_usd: 1.0,
            ..CostGuardConfig::default()
        });
        // 0.002 USD per 1k tokens: 400k tokens is 0.80.
        let under = g.check_budget(400_000);
        assert!(!under.exhausted);
        assert!((under.remaining_usd - 0.2).abs() < 1e-9);

        let over = g.check_budget(600_000);
        assert!(over.exhausted);
        assert_eq!(over.remaining_usd, 0.0);
    }

    #[test]
    fn batch_estimate_uses_history_or_default() {
        let g = CostGuard::new(&CostGuardConfig {
            daily_budget_usd: 0.01,
            ..CostGuardConfig::default()
        });

        // 400 tokens a complaint costs 0.0008; 0.01 covers 12 of them.
        let fresh = g.estimate_batch(10, None, 0);
        assert_eq!(fresh.tokens_per_complaint, DEFAULT_TOKENS_PER_COMPLAINT);
        assert!(fresh.can_afford);
        assert_eq!(fresh.max_affordable, 12);

        let pricey = g.estimate_batch(10, Some(900.0), 0);
        assert!(!pricey.can_afford);
        assert_eq!(pricey.max_affordable, 5);
    }

    #[test]
    fn sample_file_counts_only_generated_ideas() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"tokens_used": 500, "idea_generated": true, "cost": 0.001}},
                {{"tokens_used": 5000, "idea_generated": false}},
                {{"tokens_used": 700}}
            ]"#
        )
        .unwrap();
        let report = guard().check_sample_file(file.path()).unwrap();
        assert_eq!(report.samples, 2);
        assert_eq!(report.mean_tokens, 600.0);
        assert!(!report.tripped);

        let strict = guard().with_ceiling(550.0);
        assert!(strict.check_sample_file(file.path()).unwrap().tripped);
    }
}
