mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use common::{FakeTransport, read_fixture};
use league_standings::error::CrawlError;
use league_standings::fetch::{RATE_LIMIT_STATUS, RetryPolicy, SourceFetcher};

const PAGE: &str = "http://zq.example.com/cn/League/2025/36.html";
const FEED: &str = "http://zq.example.com/jsData/matchResult/2025/s36.js";

fn make_fetcher(transport: &FakeTransport, max_attempts: u32) -> (SourceFetcher<FakeTransport>, Rc<RefCell<Vec<Duration>>>) {
    let pauses = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&pauses);
    let fetcher = SourceFetcher::new(transport.clone(), RetryPolicy::new(max_attempts, 5.0, 10.0))
        .with_pause(move |d| seen.borrow_mut().push(d));
    (fetcher, pauses)
}

#[test]
fn succeeds_on_last_allowed_attempt() {
    let transport = FakeTransport::default();
    transport
        .respond(FEED, RATE_LIMIT_STATUS, "")
        .respond(FEED, RATE_LIMIT_STATUS, "")
        .respond(FEED, 200, "payload");
    let (fetcher, pauses) = make_fetcher(&transport, 3);

    let body = fetcher.fetch_feed(FEED, "v1").expect("third attempt succeeds");
    assert_eq!(body, "payload");
    assert_eq!(transport.calls_to(FEED), 3);

    let pauses = pauses.borrow();
    assert_eq!(pauses.len(), 2);
    for d in pauses.iter() {
        assert!((5.0..=10.0).contains(&d.as_secs_f64()));
    }
}

#[test]
fn exhausted_retries_are_rate_limited() {
    let transport = FakeTransport::default();
    transport.respond(FEED, RATE_LIMIT_STATUS, "");
    let (fetcher, pauses) = make_fetcher(&transport, 4);

    match fetcher.fetch_feed(FEED, "v1") {
        Err(CrawlError::RateLimited { attempts, .. }) => assert_eq!(attempts, 4),
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(transport.calls_to(FEED), 4);
    assert_eq!(pauses.borrow().len(), 3, "no sleep after the final attempt");
}

#[test]
fn other_statuses_fail_without_retry() {
    let transport = FakeTransport::default();
    transport.respond(FEED, 500, "oops").respond(FEED, 200, "late");
    let (fetcher, pauses) = make_fetcher(&transport, 3);

    let err = fetcher.fetch_feed(FEED, "v1").unwrap_err();
    assert_eq!(err.kind(), "network");
    assert_eq!(transport.calls_to(FEED), 1);
    assert!(pauses.borrow().is_empty());
}

#[test]
fn transport_errors_fail_without_retry() {
    let transport = FakeTransport::default();
    let (fetcher, _) = make_fetcher(&transport, 3);
    let err = fetcher.fetch_feed(FEED, "v1").unwrap_err();
    assert!(matches!(err, CrawlError::Network { .. }));
    assert_eq!(transport.calls_to(FEED), 1);
}

#[test]
fn source_fetch_follows_page_reference() {
    let transport = FakeTransport::default();
    transport
        .respond(PAGE, 200, &read_fixture("league_page.html"))
        .respond(FEED, 200, "var arrTeam = [];");
    let (fetcher, _) = make_fetcher(&transport, 3);

    let fetched = fetcher.fetch_source(PAGE).expect("source should fetch");
    assert_eq!(fetched.feed_url, FEED);
    assert_eq!(fetched.version, "2025030912");
    assert_eq!(fetched.body, "var arrTeam = [];");

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].1.is_empty());
    assert_eq!(calls[1].1, [("version".to_string(), "2025030912".to_string())]);
}

#[test]
fn page_errors() {
    let transport = FakeTransport::default();
    transport.respond(PAGE, 404, "");
    let (fetcher, _) = make_fetcher(&transport, 3);
    assert_eq!(fetcher.fetch_source(PAGE).unwrap_err().kind(), "network");

    let transport = FakeTransport::default();
    transport.respond(PAGE, 200, "<html><script src=\"/js/app.js\"></script></html>");
    let (fetcher, _) = make_fetcher(&transport, 3);
    assert_eq!(fetcher.fetch_source(PAGE).unwrap_err().kind(), "locator_not_found");
}
