mod common;

use common::read_fixture;
use league_standings::feed::parse_feed;
use league_standings::fetch::FetchedFeed;
use league_standings::model::Perspective;
use league_standings::pipeline::{LinkKind, StageData, StandingsView, TaskOutput};
use league_standings::standings::compute_standings;
use league_standings::store::{CrawlRun, SqliteStore, StandingsStore, count_matches, load_runs, load_standings, load_teams};
use league_standings::task::{CompetitionFormat, SourceConfig};

fn task(task_id: i64) -> SourceConfig {
    SourceConfig {
        task_id,
        label: "Test League".to_string(),
        primary_url: "http://zq.example.com/a.html".to_string(),
        secondary_url: None,
        competition_format: "single".to_string(),
        division_rule: None,
    }
}

fn output_from(task_id: i64, feed_text: &str) -> TaskOutput {
    let parsed = parse_feed(feed_text).unwrap();
    let outcome = compute_standings(&parsed.fixtures, &parsed.roster);
    TaskOutput {
        task_id,
        format: CompetitionFormat::Single,
        stages: vec![StageData {
            link: LinkKind::Primary,
            feed: FetchedFeed {
                page_url: "http://zq.example.com/a.html".to_string(),
                feed_url: "http://zq.example.com/jsData/matchResult/a.js".to_string(),
                version: "1".to_string(),
                body: feed_text.to_string(),
            },
            roster: parsed.roster,
            fixtures: parsed.fixtures,
        }],
        standings: StandingsView::Single(outcome.series),
        skipped_fixtures: outcome.skipped_fixtures,
    }
}

fn temp_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("nested").join("standings.sqlite")).unwrap();
    (dir, store)
}

#[test]
fn save_and_load_round_trip() {
    let (_dir, mut store) = temp_store();
    let feed = read_fixture("stage_a_feed.js");
    let output = output_from(1, &feed);

    let summary = store.save_task(&task(1), &output).unwrap();
    assert_eq!(summary.teams, 4);
    assert_eq!(summary.matches_inserted, 4);
    assert_eq!(summary.standings_rows, 3 * 3 * 4);

    let loaded = load_standings(store.conn(), 1).unwrap();
    let StandingsView::Single(series) = &output.standings else {
        unreachable!()
    };
    assert_eq!(loaded.keys().map(String::as_str).collect::<Vec<_>>(), ["default"]);
    assert_eq!(&loaded["default"], series);
    assert_eq!(loaded["default"][&1].get(Perspective::Home).entries.len(), 4);

    let teams = load_teams(store.conn(), 1).unwrap();
    assert_eq!(teams.len(), 4);
    assert_eq!(teams[0].code, "101");
    assert_eq!(teams[0].group_id, Some(1));
}

#[test]
fn fixtures_first_write_wins() {
    let (_dir, mut store) = temp_store();
    let first_feed = read_fixture("stage_a_feed.js");
    store.save_task(&task(1), &output_from(1, &first_feed)).unwrap();

    let rescored = first_feed.replace("'3-1'", "'0-5'");
    let summary = store.save_task(&task(2), &output_from(2, &rescored)).unwrap();
    assert_eq!(summary.matches_inserted, 0);
    assert_eq!(count_matches(store.conn(), 1).unwrap(), 4);
    assert_eq!(count_matches(store.conn(), 2).unwrap(), 0);

    let score: String = store
        .conn()
        .query_row("SELECT full_time_score FROM matches WHERE match_id = 9001", [], |row| row.get(0))
        .unwrap();
    assert_eq!(score, "3-1");
}

#[test]
fn teams_and_standings_are_replaced() {
    let (_dir, mut store) = temp_store();
    let first_feed = read_fixture("stage_a_feed.js");
    store.save_task(&task(1), &output_from(1, &first_feed)).unwrap();

    let renamed = first_feed
        .replace("'Harbor City','港城'", "'Harbour City','港城'")
        .replace("jh[\"R_3\"] = [];", "");
    store.save_task(&task(1), &output_from(1, &renamed)).unwrap();

    let teams = load_teams(store.conn(), 1).unwrap();
    assert_eq!(teams.len(), 4);
    assert_eq!(teams[0].name_primary.as_deref(), Some("Harbour City"));

    let loaded = load_standings(store.conn(), 1).unwrap();
    assert_eq!(loaded["default"].keys().copied().collect::<Vec<_>>(), [1, 2]);
    let rows: i64 = store
        .conn()
        .query_row("SELECT COUNT(*) FROM standings WHERE task_id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 2 * 3 * 4);
}

#[test]
fn runs_are_recorded() {
    let (_dir, mut store) = temp_store();
    let run = CrawlRun {
        task_id: 9,
        started_at: "2025-01-01T00:00:00+00:00".to_string(),
        finished_at: "2025-01-01T00:00:01+00:00".to_string(),
        status: "failed".to_string(),
        error_kind: Some("rate_limited".to_string()),
        error: Some("rate limited".to_string()),
        skipped_fixtures: 0,
        fixtures: 0,
    };
    store.record_run(&run).unwrap();
    assert_eq!(load_runs(store.conn(), 9).unwrap(), vec![run]);
    assert!(load_runs(store.conn(), 10).unwrap().is_empty());
}
