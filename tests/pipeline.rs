mod common;

use std::sync::atomic::AtomicBool;

use anyhow::{Result, anyhow};
use common::{FakeTransport, read_fixture};
use league_standings::fetch::{RetryPolicy, SourceFetcher};
use league_standings::match_detail::MatchDetail;
use league_standings::pipeline::{Crawler, StandingsView, TaskOutput};
use league_standings::store::{
    CrawlRun, SaveSummary, SqliteStore, StandingsStore, count_matches, load_runs, load_standings,
    load_teams,
};
use league_standings::task::SourceConfig;

const PAGE_A: &str = "http://zq.example.com/cn/League/2025/36.html";
const FEED_A: &str = "http://zq.example.com/jsData/matchResult/2025/s36.js";
const PAGE_B: &str = "http://zq.example.com/cn/League/2025/37.html";
const FEED_B: &str = "http://zq.example.com/jsData/matchResult/2025/s37.js";
const PAGE_DOWN: &str = "http://zq.example.com/cn/League/2025/99.html";

fn transport() -> FakeTransport {
    let transport = FakeTransport::default();
    transport
        .respond(PAGE_A, 200, &read_fixture("league_page.html"))
        .respond(FEED_A, 200, &read_fixture("stage_a_feed.js"))
        .respond(
            PAGE_B,
            200,
            r#"<script src="/jsData/matchResult/2025/s37.js?version=b2"></script>"#,
        )
        .respond(FEED_B, 200, &read_fixture("stage_b_feed.js"))
        .respond(PAGE_DOWN, 503, "");
    transport
}

fn crawler(transport: &FakeTransport) -> Crawler<FakeTransport> {
    let fetcher = SourceFetcher::new(transport.clone(), RetryPolicy::new(3, 0.0, 0.0)).with_pause(|_| {});
    Crawler::new(fetcher)
}

fn task(task_id: i64, format: &str, primary: &str, secondary: Option<&str>) -> SourceConfig {
    SourceConfig {
        task_id,
        label: format!("task {task_id}"),
        primary_url: primary.to_string(),
        secondary_url: secondary.map(str::to_string),
        competition_format: format.to_string(),
        division_rule: None,
    }
}

#[test]
fn two_stage_task_merges_feeds() {
    let transport = transport();
    let output = crawler(&transport)
        .run_task(&task(2, "merge", PAGE_A, Some(PAGE_B)))
        .expect("task should run");

    assert_eq!(output.stages.len(), 2);
    assert_eq!(output.skipped_fixtures, 1);
    assert_eq!(output.fixture_count(), 8);
    let StandingsView::Single(series) = &output.standings else {
        panic!("merged output is a single series");
    };
    assert_eq!(series.keys().copied().collect::<Vec<_>>(), [1, 2, 3, 4, 5]);
    assert_eq!(series[&5].aggregate.entries[0].team_name, "Harbor City");

    let urls: Vec<String> = transport.calls().into_iter().map(|(url, _)| url).collect();
    assert_eq!(urls, [PAGE_A, FEED_A, PAGE_B, FEED_B]);
}

#[test]
fn batch_records_failures_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("standings.sqlite")).unwrap();
    let transport = transport();
    let tasks = vec![
        task(1, "single", PAGE_A, None),
        task(2, "two_stage", PAGE_A, Some(PAGE_B)),
        task(3, "east_west", PAGE_A, None),
        task(4, "knockout", PAGE_A, None),
        task(5, "two_stage", PAGE_A, None),
        task(6, "regular", PAGE_DOWN, None),
    ];

    let cancel = AtomicBool::new(false);
    let mut progress = Vec::new();
    let report = crawler(&transport).run_batch(&tasks, &mut store, &cancel, |p| progress.push(p.current));

    assert_eq!(report.total, 6);
    assert_eq!(report.succeeded, 3);
    assert!(!report.cancelled);
    let failed: Vec<(i64, &str)> = report
        .failures
        .iter()
        .map(|f| (f.task_id, f.error_kind.as_str()))
        .collect();
    assert_eq!(failed, [(4, "unknown_format"), (5, "missing_secondary_url"), (6, "network")]);
    assert_eq!(report.failures[2].primary_url, PAGE_DOWN);
    assert_eq!(progress, [0, 1, 2, 3, 4, 5, 6]);

    let conn = store.conn();
    assert_eq!(count_matches(conn, 1).unwrap(), 4);
    assert_eq!(count_matches(conn, 2).unwrap(), 4, "stage A matches already owned by task 1");
    assert_eq!(load_teams(conn, 2).unwrap().len(), 8);

    let merged = load_standings(conn, 2).unwrap();
    assert_eq!(merged["default"].len(), 5);
    let divisions = load_standings(conn, 3).unwrap();
    assert_eq!(divisions.keys().map(String::as_str).collect::<Vec<_>>(), ["east", "west"]);

    let runs = load_runs(conn, 1).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!((runs[0].status.as_str(), runs[0].skipped_fixtures, runs[0].fixtures), ("ok", 1, 4));
    let runs = load_runs(conn, 4).unwrap();
    assert_eq!(runs[0].status, "failed");
    assert_eq!(runs[0].error_kind.as_deref(), Some("unknown_format"));
    assert!(load_standings(conn, 6).unwrap().is_empty());
}

#[test]
fn cancelled_batch_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("standings.sqlite")).unwrap();
    let transport = transport();
    let cancel = AtomicBool::new(true);

    let report = crawler(&transport).run_batch(&[task(1, "single", PAGE_A, None)], &mut store, &cancel, |_| {});
    assert!(report.cancelled);
    assert_eq!(report.succeeded, 0);
    assert!(transport.calls().is_empty());
}

struct FailingStore {
    runs: Vec<CrawlRun>,
}

impl StandingsStore for FailingStore {
    fn save_task(&mut self, _task: &SourceConfig, _output: &TaskOutput) -> Result<SaveSummary> {
        Err(anyhow!("disk full"))
    }

    fn record_run(&mut self, run: &CrawlRun) -> Result<()> {
        self.runs.push(run.clone());
        Ok(())
    }

    fn has_match_detail(&self, _match_id: i64) -> Result<bool> {
        Ok(false)
    }

    fn save_match_detail(&mut self, _detail: &MatchDetail) -> Result<bool> {
        Err(anyhow!("disk full"))
    }
}

#[test]
fn storage_failure_fails_the_task() {
    let transport = transport();
    let mut store = FailingStore { runs: Vec::new() };
    let cancel = AtomicBool::new(false);
    let report = crawler(&transport).run_batch(&[task(1, "single", PAGE_A, None)], &mut store, &cancel, |_| {});

    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failures[0].error_kind, "persistence");
    assert!(report.failures[0].error.contains("disk full"));
    assert_eq!(store.runs.len(), 1);
    assert_eq!(store.runs[0].status, "failed");
}
