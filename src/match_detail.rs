//! Optional per-match detail pass: for every fixture of a saved task, the match's analysis page
//! gives kickoff date and time, club names, league name and head-to-head team codes, and the
//! schedule endpoint gives the current score.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::fetch::{SourceFetcher, Transport};
use crate::model::clean_team_name;
use crate::store::StandingsStore;

pub const ANALYSIS_BASE_URL: &str = "https://zq.titan007.com/analysis/";
pub const SCHEDULE_INFO_URL: &str = "https://zq.titan007.com/default/getScheduleInfo";
pub const UNKNOWN_LEAGUE: &str = "unknown";
const DEFAULT_SCORE: &str = "0";

static KICKOFF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var strTime = '(.*?)';").expect("kickoff pattern is valid"));
static H2H_HOME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var h2h_home = (.*?);").expect("h2h home pattern is valid"));
static H2H_AWAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var h2h_away = (.*?);").expect("h2h away pattern is valid"));
static HOME_NAME: Lazy<Vec<Regex>> = Lazy::new(|| side_patterns("home"));
static AWAY_NAME: Lazy<Vec<Regex>> = Lazy::new(|| side_patterns("guest"));
static LEAGUE_NAME: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"class='LName'>([^<]+)</a>"#,
        r#"class="LName"[^>]*>([^<]+)</a>"#,
        r#"<a[^>]*class="LName"[^>]*>([^<]+)</a>"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("league name pattern is valid"))
    .collect()
});

/// Club name markup, most specific layout first.
fn side_patterns(class: &str) -> Vec<Regex> {
    [
        format!(r#"(?s)<div[^>]*class="{class}"[^>]*>.*?<a[^>]*>([^<]+)</a>"#),
        format!(r#"(?s)class="{class}"[^>]*>.*?<a[^>]*>([^<]+)</a>"#),
        format!(r#"(?s)<td[^>]*class="[^"]*{class}[^"]*"[^>]*>.*?<a[^>]*>([^<]+)</a>"#),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("club name pattern is valid"))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchDetail {
    pub match_id: i64,
    pub league_name: String,
    pub game_date: String,
    pub game_time: String,
    pub home_name: String,
    pub away_name: String,
    pub home_code: String,
    pub away_code: String,
    pub home_score: String,
    pub away_score: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailEndpoints {
    /// Prefix of `<match_id>cn.htm` analysis pages.
    pub analysis_base: String,
    pub schedule_info_url: String,
}

impl Default for DetailEndpoints {
    fn default() -> Self {
        Self {
            analysis_base: ANALYSIS_BASE_URL.to_string(),
            schedule_info_url: SCHEDULE_INFO_URL.to_string(),
        }
    }
}

impl DetailEndpoints {
    pub fn analysis_url(&self, match_id: i64) -> String {
        format!("{}{match_id}cn.htm", self.analysis_base)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailSettings {
    pub endpoints: DetailEndpoints,
    /// Pause after every match that was actually requested.
    pub delay: Duration,
}

impl DetailSettings {
    pub fn from_config(cfg: &CrawlConfig) -> Self {
        Self {
            endpoints: DetailEndpoints::default(),
            delay: Duration::from_secs_f64(cfg.match_detail_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailSummary {
    pub saved: usize,
    pub already_stored: usize,
    pub failed: usize,
}

impl DetailSummary {
    pub fn absorb(&mut self, other: DetailSummary) {
        self.saved += other.saved;
        self.already_stored += other.already_stored;
        self.failed += other.failed;
    }
}

fn first_capture(patterns: &[Regex], html: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(html))
        .map(|caps| caps[1].trim().to_string())
}

fn capture_or_empty(re: &Regex, html: &str) -> String {
    re.captures(html)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default()
}

/// Kickoff and both club names are required; a missing league name becomes [`UNKNOWN_LEAGUE`]
/// and missing head-to-head codes stay empty. The score starts at `0`-`0`.
pub fn parse_analysis_page(html: &str, match_id: i64) -> Result<MatchDetail, CrawlError> {
    let missing = |field| CrawlError::DetailParse { match_id, field };

    let kickoff = KICKOFF.captures(html).ok_or_else(|| missing("kickoff"))?;
    let mut parts = kickoff[1].split_whitespace();
    let game_date = parts.next().ok_or_else(|| missing("kickoff"))?.to_string();
    let game_time = parts.next().unwrap_or_default().to_string();

    let home_name = first_capture(&HOME_NAME, html).ok_or_else(|| missing("home team"))?;
    let away_name = first_capture(&AWAY_NAME, html).ok_or_else(|| missing("away team"))?;

    let league_name = first_capture(&LEAGUE_NAME, html)
        .and_then(|name| name.split_whitespace().next().map(str::to_string))
        .unwrap_or_else(|| {
            warn!(match_id, "league name not found on analysis page");
            UNKNOWN_LEAGUE.to_string()
        });

    Ok(MatchDetail {
        match_id,
        league_name,
        game_date,
        game_time,
        home_name: clean_team_name(&home_name),
        away_name: clean_team_name(&away_name),
        home_code: capture_or_empty(&H2H_HOME, html),
        away_code: capture_or_empty(&H2H_AWAY, html),
        home_score: DEFAULT_SCORE.to_string(),
        away_score: DEFAULT_SCORE.to_string(),
    })
}

/// `var x=<id>,<home>,<away>,...;` → `(home, away)`.
pub fn parse_schedule_score(body: &str) -> Option<(String, String)> {
    let values = body.split('=').nth(1)?.split(';').next()?;
    let fields: Vec<&str> = values.split(',').collect();
    if fields.len() < 3 {
        return None;
    }
    Some((fields[1].trim().to_string(), fields[2].trim().to_string()))
}

/// Analysis page, then the score. A failed score lookup keeps the `0`-`0` default.
pub fn fetch_match_detail<T: Transport>(
    fetcher: &SourceFetcher<T>,
    endpoints: &DetailEndpoints,
    match_id: i64,
) -> Result<MatchDetail, CrawlError> {
    let html = fetcher.fetch_page(&endpoints.analysis_url(match_id))?;
    let mut detail = parse_analysis_page(&html, match_id)?;

    let sid = match_id.to_string();
    let stamp = Utc::now().timestamp_millis().to_string();
    let query = [("sid", sid.as_str()), ("t", stamp.as_str())];
    match fetcher.fetch_text(&endpoints.schedule_info_url, &query) {
        Ok(body) => match parse_schedule_score(&body) {
            Some((home, away)) => {
                detail.home_score = home;
                detail.away_score = away;
            }
            None => debug!(match_id, "schedule info carried no score"),
        },
        Err(err) => warn!(match_id, "score lookup failed: {err}"),
    }
    Ok(detail)
}

/// Fetches and stores details for every id not stored yet. Fetch failures are counted and
/// skipped; store failures abort the pass.
pub fn crawl_match_details<T: Transport>(
    fetcher: &SourceFetcher<T>,
    settings: &DetailSettings,
    store: &mut dyn StandingsStore,
    match_ids: &[i64],
) -> Result<DetailSummary> {
    let mut summary = DetailSummary::default();
    let mut seen = HashSet::new();

    for &match_id in match_ids {
        if !seen.insert(match_id) {
            continue;
        }
        if store.has_match_detail(match_id)? {
            debug!(match_id, "match detail already stored");
            summary.already_stored += 1;
            continue;
        }

        match fetch_match_detail(fetcher, &settings.endpoints, match_id) {
            Ok(detail) => {
                if store.save_match_detail(&detail)? {
                    summary.saved += 1;
                } else {
                    summary.already_stored += 1;
                }
            }
            Err(err) => {
                warn!(match_id, kind = err.kind(), "match detail failed: {err}");
                summary.failed += 1;
            }
        }

        if !settings.delay.is_zero() {
            fetcher.pause(settings.delay);
        }
    }

    info!(
        saved = summary.saved,
        already_stored = summary.already_stored,
        failed = summary.failed,
        "match detail pass finished"
    );
    Ok(summary)
}
