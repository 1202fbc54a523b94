//! Pipeline orchestration.
//!
//! One run walks `Idle → Collecting → Filtering → Generating` and ends in
//! `Completed` or `Aborted`:
//!
//! - **Collecting** merges every source stream. Items are buffered and
//!   reported failures are written to the error log.
//! - **Filtering** runs every item through the sentiment and duplicate
//!   gates, `filter.concurrency` at a time.
//! - **Generating** asks the store for complaints still lacking an idea
//!   (this run's and earlier ones under the attempt cap) and generates
//!   up to `generation.concurrency_limit` at once.
//!
//! After generation the cost guard compares the mean tokens per idea with
//! its ceiling. A trip ends the run `Aborted` but deletes nothing. With the
//! pre-emptive guard on, no new generation starts once the running mean is
//! over the ceiling. Independently, no generation starts once spend over
//! the trailing 24 hours is past `cost_guard.daily_budget_usd`; that also
//! ends the run `Aborted`. A stop request is honoured between source
//! events, filtered items and generations; work already in flight finishes.
//!
//! [`Pipeline::run`] never fails. Per-item problems become error records
//! and counters in [`RunStats`].

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::cost_guard::{CostGuard, GuardReport};
use crate::error::{FETCH_FAILED, PARSE_FAILED};
use crate::filter::{ComplaintFilter, FilterOutcome, RejectReason};
use crate::generator::{Attempt, IdeaGenerator};
use crate::models::RawItem;
use crate::progress::{NoProgress, RunProgressEvent, RunProgressReporter};
use crate::source::{Collected, SourceRegistry};
use crate::store::Store;

/// Cooperative stop flag shared between the run and whoever wants it to end.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Collecting,
    Filtering,
    Generating,
    Completed,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Collecting => "collecting",
            RunState::Filtering => "filtering",
            RunState::Generating => "generating",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RejectionCounts {
    pub sentiment: u64,
    pub duplicate: u64,
    pub empty: u64,
}

impl RejectionCounts {
    fn add(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::Sentiment => self.sentiment += 1,
            RejectReason::Duplicate => self.duplicate += 1,
            RejectReason::Empty => self.empty += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.sentiment + self.duplicate + self.empty
    }
}

/// Per-run statistics handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub items_fetched: u64,
    pub accepted: u64,
    pub rejected: RejectionCounts,
    pub fetch_failures: u64,
    pub parse_failures: u64,
    /// Complaints handed to the generator (this run's and earlier ones).
    pub generation_attempted: u64,
    pub ideas_generated: u64,
    pub generation_failures: u64,
    /// Storage calls that failed; the affected item was skipped.
    pub storage_errors: u64,
    /// Tokens spent on every call, failed ones included.
    pub total_tokens: u64,
    /// Mean over successfully generated ideas only.
    pub mean_tokens_per_idea: f64,
    pub estimated_cost_usd: f64,
    pub guard: GuardReport,
    pub guard_tripped: bool,
    /// The pre-emptive guard stopped new generations.
    pub guard_preempted: bool,
    /// The daily budget stopped new generations.
    pub budget_exhausted: bool,
    /// Spend over the trailing 24 hours, this run included.
    pub daily_spend_usd: f64,
    /// Model used for generation, if generation ran.
    pub model: Option<String>,
    pub stopped_early: bool,
    pub final_state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    sources: SourceRegistry,
    filter: ComplaintFilter,
    generator: Option<IdeaGenerator>,
    guard: CostGuard,
    preemptive_guard: bool,
    filter_concurrency: usize,
    generation_concurrency: usize,
    max_attempts: u32,
    max_ideas_per_run: usize,
    progress: Box<dyn RunProgressReporter>,
    stop: CancellationToken,
}

impl Pipeline {
    /// A pipeline without a generator only collects and filters.
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        sources: SourceRegistry,
        generator: Option<IdeaGenerator>,
    ) -> Self {
        Self {
            store,
            sources,
            filter: ComplaintFilter::new(&config.filter),
            generator,
            guard: CostGuard::new(&config.cost_guard),
            preemptive_guard: config.cost_guard.preemptive,
            filter_concurrency: config.filter.concurrency.max(1),
            generation_concurrency: config.generation.concurrency_limit.max(1),
            max_attempts: config.generation.max_attempts,
            max_ideas_per_run: config.generation.max_ideas_per_run,
            progress: Box::new(NoProgress),
            stop: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn RunProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_preemptive_guard(mut self, enabled: bool) -> Self {
        self.preemptive_guard = enabled;
        self
    }

    /// Shares an existing stop flag instead of the pipeline's own.
    pub fn with_stop_signal(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    /// Clone of the stop flag; cancelling it ends the current run early.
    pub fn stop_signal(&self) -> CancellationToken {
        self.stop.clone()
    }

    fn enter(&self, state: &mut RunState, next: RunState) {
        info!(from = state.as_str(), to = next.as_str(), "Run state change");
        *state = next;
        self.progress.report(RunProgressEvent::Phase { state: next });
    }

    pub async fn run(&self) -> RunStats {
        let started_at = Utc::now();
        let mut state = RunState::Idle;
        let mut stats = RunStats {
            items_fetched: 0,
            accepted: 0,
            rejected: RejectionCounts::default(),
            fetch_failures: 0,
            parse_failures: 0,
            generation_attempted: 0,
            ideas_generated: 0,
            generation_failures: 0,
            storage_errors: 0,
            total_tokens: 0,
            mean_tokens_per_idea: 0.0,
            estimated_cost_usd: 0.0,
            guard: self.guard.evaluate(&[]),
            guard_tripped: false,
            guard_preempted: false,
            budget_exhausted: false,
            daily_spend_usd: 0.0,
            model: None,
            stopped_early: false,
            final_state: RunState::Idle,
            started_at,
            finished_at: started_at,
        };

        self.enter(&mut state, RunState::Collecting);
        let items = self.collect(&mut stats).await;

        if !stats.stopped_early {
            self.enter(&mut state, RunState::Filtering);
            self.filter_items(&items, &mut stats).await;
        }

        let mut idea_tokens: Vec<u32> = Vec::new();
        if !stats.stopped_early {
            if let Some(generator) = &self.generator {
                self.enter(&mut state, RunState::Generating);
                stats.model = Some(generator.model_name().to_string());
                idea_tokens = self.generate(generator, &mut stats).await;
            } else {
                info!("Generation disabled; skipping");
            }
        }

        let report = self.guard.evaluate(&idea_tokens);
        if report.tripped {
            warn!(
                mean_tokens = report.mean_tokens,
                ceiling = report.ceiling,
                ideas = report.samples,
                "Cost guard tripped"
            );
        }
        stats.mean_tokens_per_idea = report.mean_tokens;
        stats.estimated_cost_usd = self.guard.estimate_cost(stats.total_tokens);
        stats.guard_tripped = report.tripped || stats.guard_preempted;
        stats.guard = report;

        let terminal = if stats.guard_tripped || stats.budget_exhausted || stats.stopped_early {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        self.enter(&mut state, terminal);
        stats.final_state = state;
        stats.finished_at = Utc::now();

        info!(
            fetched = stats.items_fetched,
            accepted = stats.accepted,
            ideas = stats.ideas_generated,
            total_tokens = stats.total_tokens,
            state = state.as_str(),
            "Run finished"
        );
        stats
    }

    async fn collect(&self, stats: &mut RunStats) -> Vec<RawItem> {
        let mut items = Vec::new();
        let mut events = self.sources.collect_all();

        loop {
            if self.stop.is_cancelled() {
                warn!("Stop requested during collection");
                stats.stopped_early = true;
                break;
            }
            let Some(event) = events.next().await else {
                break;
            };
            match event {
                Collected::Item(item) => {
                    stats.items_fetched += 1;
                    items.push(item);
                }
                Collected::Failed(record) => {
                    match record.error_type.as_str() {
                        FETCH_FAILED => stats.fetch_failures += 1,
                        PARSE_FAILED => stats.parse_failures += 1,
                        _ => {}
                    }
                    warn!(
                        source = %record.source_kind,
                        url = record.url.as_deref().unwrap_or(""),
                        error_type = %record.error_type,
                        error = %record.error_message,
                        "Source reported a failure"
                    );
                    if let Err(e) = self.store.insert_error(&record).await {
                        error!(error = %e, "Failed to write error record");
                        stats.storage_errors += 1;
                    }
                }
            }
            let seen = stats.items_fetched + stats.fetch_failures + stats.parse_failures;
            if seen % 50 == 0 {
                self.progress.report(RunProgressEvent::Collecting {
                    items: stats.items_fetched,
                    failures: stats.fetch_failures + stats.parse_failures,
                });
            }
        }

        items
    }

    async fn filter_items(&self, items: &[RawItem], stats: &mut RunStats) {
        let total = items.len() as u64;
        let store = self.store.as_ref();

        let mut outcomes = stream::iter(items)
            .map(|item| async move {
                if self.stop.is_cancelled() {
                    return None;
                }
                Some(self.filter.apply(store, item).await)
            })
            .buffer_unordered(self.filter_concurrency);

        let mut n = 0u64;
        while let Some(outcome) = outcomes.next().await {
            n += 1;
            match outcome {
                None => stats.stopped_early = true,
                Some(Ok(FilterOutcome::Accepted(_))) => stats.accepted += 1,
                Some(Ok(FilterOutcome::Rejected(reason))) => stats.rejected.add(reason),
                Some(Err(e)) => {
                    error!(error = %e, "Failed to store complaint");
                    stats.storage_errors += 1;
                }
            }
            if n % 50 == 0 || n == total {
                self.progress
                    .report(RunProgressEvent::Filtering { n, total });
            }
        }

        info!(
            accepted = stats.accepted,
            rejected_sentiment = stats.rejected.sentiment,
            duplicates = stats.rejected.duplicate,
            "Filtering done"
        );
    }

    /// Returns the token counts of the ideas stored this run.
    async fn generate(&self, generator: &IdeaGenerator, stats: &mut RunStats) -> Vec<u32> {
        let pending = match self
            .store
            .complaints_without_idea(self.max_attempts, self.max_ideas_per_run)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to load complaints awaiting ideas");
                stats.storage_errors += 1;
                return Vec::new();
            }
        };

        let since = Utc::now() - Duration::hours(24);
        let tokens_before = match self.store.tokens_used_since(since).await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "Failed to read recent token spend");
                stats.storage_errors += 1;
                0
            }
        };
        let history = self
            .store
            .summary(self.max_attempts)
            .await
            .ok()
            .and_then(|s| s.mean_tokens_per_idea);
        let estimate = self.guard.estimate_batch(pending.len(), history, tokens_before);
        if estimate.can_afford {
            info!(
                complaints = estimate.complaints,
                estimated_cost_usd = estimate.estimated_cost_usd,
                remaining_usd = estimate.remaining_usd,
                "Generation batch estimate"
            );
        } else {
            warn!(
                complaints = estimate.complaints,
                estimated_cost_usd = estimate.estimated_cost_usd,
                remaining_usd = estimate.remaining_usd,
                max_affordable = estimate.max_affordable,
                "Backlog exceeds remaining daily budget"
            );
        }

        let total = pending.len() as u64;
        let store = self.store.as_ref();
        let mut queue = pending.into_iter().peekable();
        let mut in_flight = FuturesUnordered::new();
        let mut idea_tokens: Vec<u32> = Vec::new();
        let mut done = 0u64;

        loop {
            while in_flight.len() < self.generation_concurrency {
                if self.stop.is_cancelled() {
                    if !stats.stopped_early {
                        warn!("Stop requested during generation");
                    }
                    stats.stopped_early = true;
                    break;
                }
                if queue.peek().is_none() {
                    break;
                }
                let budget = self.guard.check_budget(tokens_before + stats.total_tokens);
                if budget.exhausted {
                    if !stats.budget_exhausted {
                        warn!(
                            spent_usd = budget.spent_usd,
                            budget_usd = budget.budget_usd,
                            "Daily budget spent; no further generations"
                        );
                    }
                    stats.budget_exhausted = true;
                    break;
                }
                if self.preemptive_guard && self.guard.should_stop(&idea_tokens) {
                    if !stats.guard_preempted {
                        warn!(
                            ideas = idea_tokens.len(),
                            "Running token mean over ceiling; no further generations"
                        );
                    }
                    stats.guard_preempted = true;
                    break;
                }
                let Some(complaint) = queue.next() else {
                    break;
                };
                stats.generation_attempted += 1;
                in_flight.push(async move {
                    let attempt = generator.generate_and_store(store, &complaint).await;
                    (complaint.id, attempt)
                });
            }

            let Some((complaint_id, attempt)) = in_flight.next().await else {
                break;
            };
            done += 1;

            match attempt {
                Ok(attempt) => {
                    stats.total_tokens += u64::from(attempt.tokens_used());
                    match attempt {
                        Attempt::Stored(idea) => {
                            stats.ideas_generated += 1;
                            idea_tokens.push(idea.tokens_used);
                        }
                        Attempt::Failed { .. } => stats.generation_failures += 1,
                    }
                }
                Err(e) => {
                    error!(%complaint_id, error = %e, "Failed to store generation result");
                    stats.storage_errors += 1;
                }
            }
            self.progress
                .report(RunProgressEvent::Generating { n: done, total });
        }

        stats.daily_spend_usd = self.guard.estimate_cost(tokens_before + stats.total_tokens);
        idea_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_and_aborted_are_terminal() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Aborted.is_terminal());
        for s in [
            RunState::Idle,
            RunState::Collecting,
            RunState::Filtering,
            RunState::Generating,
        ] {
            assert!(!s.is_terminal());
        }
    }

    #[test]
    fn cancellation_token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn rejection_total_sums_reasons() {
        let mut counts = RejectionCounts::default();
        counts.add(RejectReason::Sentiment);
        counts.add(RejectReason::Duplicate);
        counts.add(RejectReason::Duplicate);
        assert_eq!(counts.total(), 3);
    }
}
