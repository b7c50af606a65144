use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::CrawlError;
use crate::literal::{self, Literal};
use crate::model::{FixtureRecord, FixturesByRound, TeamRecord};

pub const ROSTER_MIN_FIELDS: usize = 7;
pub const FIXTURE_MIN_FIELDS: usize = 10;

static ROSTER_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var\s+arrTeam\s*=\s*").expect("roster pattern is valid"));

static ROUND_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"jh\[\s*["']R_(\d+)["']\s*\]\s*=\s*"#).expect("round pattern is valid")
});

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub roster: Vec<TeamRecord>,
    pub fixtures: FixturesByRound,
}

pub fn parse_feed(feed: &str) -> Result<ParsedFeed, CrawlError> {
    let roster = parse_roster(feed)?;
    let fixtures = parse_fixtures(feed)?;
    Ok(ParsedFeed { roster, fixtures })
}

/// Decodes the `arrTeam` roster. Tuples shorter than [`ROSTER_MIN_FIELDS`] are dropped;
/// a feed without the declaration yields an empty roster.
pub fn parse_roster(feed: &str) -> Result<Vec<TeamRecord>, CrawlError> {
    let Some(decl) = ROSTER_DECL.find(feed) else {
        warn!("feed has no arrTeam declaration");
        return Ok(Vec::new());
    };
    let (value, _) = literal::parse_array_at(feed, decl.end()).map_err(CrawlError::RosterParse)?;
    let rows = value.as_array().unwrap_or_default();

    let mut teams = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        match team_from_tuple(row) {
            Some(team) => teams.push(team),
            None => debug!(index = idx, "skipping short roster tuple"),
        }
    }
    info!(teams = teams.len(), skipped = rows.len() - teams.len(), "parsed roster");
    Ok(teams)
}

fn team_from_tuple(row: &Literal) -> Option<TeamRecord> {
    let fields = row.as_array()?;
    if fields.len() < ROSTER_MIN_FIELDS {
        return None;
    }
    let code = canonical_code(&fields[0]).unwrap_or_else(|| {
        warn!("roster tuple has no team code");
        String::new()
    });
    Some(TeamRecord {
        code,
        name_primary: fields[1].to_text(),
        name_secondary: fields[2].to_text(),
        name_tertiary: fields[3].to_text(),
        label: fields[4].to_text(),
        badge_ref: fields[5].to_text(),
        group_id: fields[6].as_i64(),
    })
}

/// Decodes every `jh["R_<n>"]` round literal. One undecodable round fails the whole feed.
pub fn parse_fixtures(feed: &str) -> Result<FixturesByRound, CrawlError> {
    let mut rounds = FixturesByRound::new();
    let mut skipped = 0usize;

    for caps in ROUND_DECL.captures_iter(feed) {
        let Ok(round) = caps[1].parse::<u32>() else {
            warn!(key = &caps[1], "round key out of range");
            continue;
        };
        let Some(decl) = caps.get(0) else {
            continue;
        };
        let (value, _) = literal::parse_array_at(feed, decl.end())
            .map_err(|source| CrawlError::StructuredParse { round, source })?;
        let rows = value.as_array().unwrap_or_default();

        let mut fixtures = Vec::with_capacity(rows.len());
        for row in rows {
            match fixture_from_tuple(round, row) {
                Some(fixture) => fixtures.push(fixture),
                None => skipped += 1,
            }
        }
        rounds.insert(round, fixtures);
    }

    if skipped > 0 {
        warn!(skipped, "skipped malformed fixture tuples");
    }
    info!(rounds = rounds.len(), "parsed fixtures");
    Ok(rounds)
}

fn fixture_from_tuple(round: u32, row: &Literal) -> Option<FixtureRecord> {
    let fields = row.as_array()?;
    if fields.len() < FIXTURE_MIN_FIELDS {
        debug!(round, fields = fields.len(), "fixture tuple too short");
        return None;
    }
    let Some(match_id) = fields[0].as_i64() else {
        debug!(round, "fixture tuple without match id");
        return None;
    };
    let (Some(home_code), Some(away_code)) = (canonical_code(&fields[4]), canonical_code(&fields[5]))
    else {
        debug!(round, match_id, "fixture tuple without team codes");
        return None;
    };
    Some(FixtureRecord {
        match_id,
        league_id: fields[1].as_i64(),
        round,
        kickoff: fields[3].to_text(),
        home_code,
        away_code,
        full_time_score: fields[6].to_text(),
        half_time_score: fields[7].to_text(),
        home_rank: fields[8].to_text(),
        away_rank: fields[9].to_text(),
    })
}

fn canonical_code(value: &Literal) -> Option<String> {
    let text = value.to_text()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}
