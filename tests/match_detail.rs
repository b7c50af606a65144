mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use common::{FakeTransport, read_fixture};
use league_standings::fetch::{RetryPolicy, SourceFetcher};
use league_standings::match_detail::{
    DetailEndpoints, DetailSettings, DetailSummary, MatchDetail, fetch_match_detail,
    parse_analysis_page, parse_schedule_score,
};
use league_standings::pipeline::Crawler;
use league_standings::store::{SqliteStore, StandingsStore, load_match_detail};
use league_standings::task::SourceConfig;

const PAGE: &str = "http://zq.example.com/cn/League/2025/36.html";
const FEED: &str = "http://zq.example.com/jsData/matchResult/2025/s36.js";
const SCHEDULE: &str = "http://zq.example.com/default/getScheduleInfo";

fn endpoints() -> DetailEndpoints {
    DetailEndpoints {
        analysis_base: "http://zq.example.com/analysis/".to_string(),
        schedule_info_url: SCHEDULE.to_string(),
    }
}

fn analysis(match_id: i64) -> String {
    endpoints().analysis_url(match_id)
}

fn single_task() -> SourceConfig {
    SourceConfig {
        task_id: 1,
        label: "Test League".to_string(),
        primary_url: PAGE.to_string(),
        secondary_url: None,
        competition_format: "single".to_string(),
        division_rule: None,
    }
}

#[test]
fn analysis_page_fields() {
    let detail = parse_analysis_page(&read_fixture("analysis_page.html"), 9001).unwrap();
    assert_eq!(
        detail,
        MatchDetail {
            match_id: 9001,
            league_name: "测试联赛".to_string(),
            game_date: "2025-03-01".to_string(),
            game_time: "15:00".to_string(),
            home_name: "Harbor City".to_string(),
            away_name: "Ashford".to_string(),
            home_code: "101".to_string(),
            away_code: "102".to_string(),
            home_score: "0".to_string(),
            away_score: "0".to_string(),
        }
    );
}

#[test]
fn page_without_club_names_is_rejected() {
    let html = "<script>var strTime = '2025-03-01 15:00';</script><div class=\"vs\"></div>";
    let err = parse_analysis_page(html, 42).unwrap_err();
    assert_eq!(err.kind(), "detail_parse");
    assert!(err.to_string().contains("home team"));

    let err = parse_analysis_page("<html></html>", 42).unwrap_err();
    assert!(err.to_string().contains("kickoff"));
}

#[test]
fn schedule_score_payload() {
    assert_eq!(
        parse_schedule_score("var scheduleInfo=9001,2,1,-1;"),
        Some(("2".to_string(), "1".to_string()))
    );
    assert_eq!(parse_schedule_score("var scheduleInfo=9001;"), None);
    assert_eq!(parse_schedule_score(""), None);
}

#[test]
fn score_lookup_failure_keeps_default_score() {
    let transport = FakeTransport::default();
    transport
        .respond(&analysis(9001), 200, &read_fixture("analysis_page.html"))
        .respond(SCHEDULE, 500, "");
    let fetcher = SourceFetcher::new(transport.clone(), RetryPolicy::new(1, 0.0, 0.0));

    let detail = fetch_match_detail(&fetcher, &endpoints(), 9001).unwrap();
    assert_eq!((detail.home_score.as_str(), detail.away_score.as_str()), ("0", "0"));

    let calls = transport.calls();
    assert_eq!(calls[1].0, SCHEDULE);
    assert!(calls[1].1.contains(&("sid".to_string(), "9001".to_string())));
    assert!(calls[1].1.iter().any(|(k, _)| k == "t"));
}

#[test]
fn detail_pass_skips_stored_matches() {
    let transport = FakeTransport::default();
    let page = read_fixture("analysis_page.html");
    transport
        .respond(PAGE, 200, &read_fixture("league_page.html"))
        .respond(FEED, 200, &read_fixture("stage_a_feed.js"))
        .respond(&analysis(9001), 200, &page)
        .respond(&analysis(9002), 200, "<html>maintenance</html>")
        .respond(&analysis(9004), 200, &page)
        .respond(SCHEDULE, 200, "var scheduleInfo=0,3,1,-1;");

    let pauses = Rc::new(RefCell::new(Vec::new()));
    let recorded = Rc::clone(&pauses);
    let fetcher = SourceFetcher::new(transport.clone(), RetryPolicy::new(1, 0.0, 0.0))
        .with_pause(move |d| recorded.borrow_mut().push(d));
    let crawler = Crawler::new(fetcher).with_match_details(DetailSettings {
        endpoints: endpoints(),
        delay: Duration::from_millis(250),
    });

    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("standings.sqlite")).unwrap();
    let cancel = AtomicBool::new(false);

    // 9001..9004 are the decodable fixtures; 9003 has no analysis page.
    let report = crawler.run_batch(&[single_task()], &mut store, &cancel, |_| {});
    assert_eq!(report.succeeded, 1);
    assert_eq!(
        report.match_details,
        DetailSummary {
            saved: 2,
            already_stored: 0,
            failed: 2
        }
    );
    assert_eq!(*pauses.borrow(), vec![Duration::from_millis(250); 4]);

    let stored = load_match_detail(store.conn(), 9001).unwrap().unwrap();
    assert_eq!(stored.home_name, "Harbor City");
    assert_eq!((stored.home_score.as_str(), stored.away_score.as_str()), ("3", "1"));
    assert!(load_match_detail(store.conn(), 9003).unwrap().is_none());

    let report = crawler.run_batch(&[single_task()], &mut store, &cancel, |_| {});
    assert_eq!(
        report.match_details,
        DetailSummary {
            saved: 0,
            already_stored: 2,
            failed: 2
        }
    );
    assert_eq!(transport.calls_to(&analysis(9001)), 1);
    assert_eq!(transport.calls_to(&analysis(9003)), 2);
}

#[test]
fn detail_pass_is_off_by_default() {
    let transport = FakeTransport::default();
    transport
        .respond(PAGE, 200, &read_fixture("league_page.html"))
        .respond(FEED, 200, &read_fixture("stage_a_feed.js"));
    let crawler = Crawler::new(SourceFetcher::new(transport.clone(), RetryPolicy::new(1, 0.0, 0.0)));
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("standings.sqlite")).unwrap();

    let report = crawler.run_batch(&[single_task()], &mut store, &AtomicBool::new(false), |_| {});
    assert_eq!(report.match_details, DetailSummary::default());
    assert_eq!(transport.calls().len(), 2);
}

#[test]
fn first_stored_detail_wins() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("standings.sqlite")).unwrap();
    let first = parse_analysis_page(&read_fixture("analysis_page.html"), 9001).unwrap();
    let mut second = first.clone();
    second.home_name = "Renamed".to_string();

    assert!(!store.has_match_detail(9001).unwrap());
    assert!(store.save_match_detail(&first).unwrap());
    assert!(!store.save_match_detail(&second).unwrap());
    assert!(store.has_match_detail(9001).unwrap());
    assert_eq!(load_match_detail(store.conn(), 9001).unwrap(), Some(first));
}
