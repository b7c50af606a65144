//! Per-task crawl pipeline and the sequential batch runner.
//!
//! A task is fetched, parsed, computed and persisted before the next one starts. Cancellation is
//! only observed between tasks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::division::split_by_division;
use crate::error::CrawlError;
use crate::feed::parse_feed;
use crate::fetch::{FetchedFeed, SourceFetcher, Transport};
use crate::match_detail::{DetailSettings, DetailSummary, crawl_match_details};
use crate::merge::{ExactNameMatcher, TeamMatcher, merge_stages};
use crate::model::{FixturesByRound, StandingsSeries, TeamRecord};
use crate::standings::compute_standings;
use crate::store::{CrawlRun, StandingsStore};
use crate::task::{CompetitionFormat, SourceConfig};

/// Division label for standings that are not split.
pub const DEFAULT_DIVISION: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Primary,
    Secondary,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::Primary => "primary",
            LinkKind::Secondary => "secondary",
        }
    }
}

/// Everything recovered from one fetched link.
#[derive(Debug, Clone)]
pub struct StageData {
    pub link: LinkKind,
    pub feed: FetchedFeed,
    pub roster: Vec<TeamRecord>,
    pub fixtures: FixturesByRound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StandingsView {
    Single(StandingsSeries),
    Divisions(BTreeMap<String, StandingsSeries>),
}

impl StandingsView {
    /// `(division, series)` pairs as they are stored.
    pub fn divisions(&self) -> Vec<(&str, &StandingsSeries)> {
        match self {
            StandingsView::Single(series) => vec![(DEFAULT_DIVISION, series)],
            StandingsView::Divisions(map) => map.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub task_id: i64,
    pub format: CompetitionFormat,
    /// One entry per fetched link, primary first.
    pub stages: Vec<StageData>,
    pub standings: StandingsView,
    pub skipped_fixtures: usize,
}

impl TaskOutput {
    pub fn fixture_count(&self) -> usize {
        self.stages
            .iter()
            .flat_map(|s| s.fixtures.values())
            .map(Vec::len)
            .sum()
    }

    /// Fixture ids of every stage in feed order.
    pub fn match_ids(&self) -> Vec<i64> {
        self.stages
            .iter()
            .flat_map(|s| s.fixtures.values().flatten())
            .map(|f| f.match_id)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// A failed task, with enough of its configuration to re-run it by hand.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub task_id: i64,
    pub label: String,
    pub primary_url: String,
    pub secondary_url: Option<String>,
    pub competition_format: String,
    pub error_kind: String,
    pub error: String,
}

impl BatchFailure {
    fn new(task: &SourceConfig, err: &CrawlError) -> Self {
        Self {
            task_id: task.task_id,
            label: task.label.clone(),
            primary_url: task.primary_url.clone(),
            secondary_url: task.secondary_url.clone(),
            competition_format: task.competition_format.clone(),
            error_kind: err.kind().to_string(),
            error: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
    /// Totals of the match detail pass; all zero when it is off.
    pub match_details: DetailSummary,
}

pub struct Crawler<T: Transport> {
    fetcher: SourceFetcher<T>,
    matcher: Box<dyn TeamMatcher>,
    task_delay: Duration,
    details: Option<DetailSettings>,
}

impl<T: Transport> Crawler<T> {
    pub fn new(fetcher: SourceFetcher<T>) -> Self {
        Self {
            fetcher,
            matcher: Box::new(ExactNameMatcher),
            task_delay: Duration::ZERO,
            details: None,
        }
    }

    pub fn with_matcher(mut self, matcher: impl TeamMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    /// Pause between consecutive tasks of a batch.
    pub fn with_task_delay(mut self, delay: Duration) -> Self {
        self.task_delay = delay;
        self
    }

    /// Turns on the per-match detail pass after each saved task.
    pub fn with_match_details(mut self, settings: DetailSettings) -> Self {
        self.details = Some(settings);
        self
    }

    pub fn run_task(&self, task: &SourceConfig) -> Result<TaskOutput, CrawlError> {
        let format = task.format()?;
        info!(task = %task.display(), ?format, "running task");

        let output = match format {
            CompetitionFormat::Single => {
                let stage = self.fetch_stage(&task.primary_url, LinkKind::Primary)?;
                let outcome = compute_standings(&stage.fixtures, &stage.roster);
                TaskOutput {
                    task_id: task.task_id,
                    format,
                    stages: vec![stage],
                    standings: StandingsView::Single(outcome.series),
                    skipped_fixtures: outcome.skipped_fixtures,
                }
            }
            CompetitionFormat::DivisionSplit => {
                let stage = self.fetch_stage(&task.primary_url, LinkKind::Primary)?;
                let outcome = compute_standings(&stage.fixtures, &stage.roster);
                let rule = task.division_rule();
                let divisions = split_by_division(&outcome.series, &stage.roster, rule.as_ref());
                TaskOutput {
                    task_id: task.task_id,
                    format,
                    stages: vec![stage],
                    standings: StandingsView::Divisions(divisions),
                    skipped_fixtures: outcome.skipped_fixtures,
                }
            }
            CompetitionFormat::TwoStage => {
                let secondary_url = task.secondary_url()?;
                let first = self.fetch_stage(&task.primary_url, LinkKind::Primary)?;
                let second = self.fetch_stage(secondary_url, LinkKind::Secondary)?;
                let outcome_a = compute_standings(&first.fixtures, &first.roster);
                let outcome_b = compute_standings(&second.fixtures, &second.roster);
                let merged = merge_stages(&outcome_a.series, &outcome_b.series, self.matcher.as_ref());
                TaskOutput {
                    task_id: task.task_id,
                    format,
                    stages: vec![first, second],
                    standings: StandingsView::Single(merged),
                    skipped_fixtures: outcome_a.skipped_fixtures + outcome_b.skipped_fixtures,
                }
            }
        };

        if output.skipped_fixtures > 0 {
            warn!(
                task_id = task.task_id,
                skipped = output.skipped_fixtures,
                "fixtures without a usable score were left out of standings"
            );
        }
        Ok(output)
    }

    fn fetch_stage(&self, url: &str, link: LinkKind) -> Result<StageData, CrawlError> {
        let feed = self.fetcher.fetch_source(url.trim())?;
        let parsed = parse_feed(&feed.body)?;
        Ok(StageData {
            link,
            feed,
            roster: parsed.roster,
            fixtures: parsed.fixtures,
        })
    }

    /// Runs, then saves, each task in order. A failing task is recorded and the batch moves on.
    pub fn run_batch(
        &self,
        tasks: &[SourceConfig],
        store: &mut dyn StandingsStore,
        cancel: &AtomicBool,
        mut on_progress: impl FnMut(BatchProgress),
    ) -> BatchReport {
        let total = tasks.len();
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };

        for (idx, task) in tasks.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                info!(done = idx, total, "batch cancelled");
                report.cancelled = true;
                break;
            }
            if idx > 0 && !self.task_delay.is_zero() {
                thread::sleep(self.task_delay);
            }
            on_progress(BatchProgress {
                current: idx,
                total,
                message: format!("Crawling {}", task.display()),
            });

            let started_at = Utc::now().to_rfc3339();
            let result = self.run_task(task).and_then(|output| {
                store
                    .save_task(task, &output)
                    .map(|_| output)
                    .map_err(CrawlError::Persistence)
            });

            let mut run = CrawlRun {
                task_id: task.task_id,
                started_at,
                finished_at: Utc::now().to_rfc3339(),
                status: "ok".to_string(),
                error_kind: None,
                error: None,
                skipped_fixtures: 0,
                fixtures: 0,
            };
            match result {
                Ok(output) => {
                    run.skipped_fixtures = output.skipped_fixtures;
                    run.fixtures = output.fixture_count();
                    info!(task = %task.display(), fixtures = run.fixtures, "task succeeded");
                    report.succeeded += 1;
                    if let Some(settings) = &self.details {
                        let ids = output.match_ids();
                        match crawl_match_details(&self.fetcher, settings, store, &ids) {
                            Ok(summary) => report.match_details.absorb(summary),
                            Err(err) => {
                                warn!(task_id = task.task_id, "match detail pass stopped: {err:#}")
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(task = %task.display(), kind = err.kind(), "task failed: {err}");
                    run.status = "failed".to_string();
                    run.error_kind = Some(err.kind().to_string());
                    run.error = Some(err.to_string());
                    report.failures.push(BatchFailure::new(task, &err));
                }
            }
            if let Err(err) = store.record_run(&run) {
                warn!(task_id = task.task_id, "failed to record crawl run: {err:#}");
            }
        }

        on_progress(BatchProgress {
            current: total,
            total,
            message: "Batch finished".to_string(),
        });
        info!(
            total,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "batch finished"
        );
        report
    }
}
