use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Round number → fixtures of that round, ascending.
pub type FixturesByRound = BTreeMap<u32, Vec<FixtureRecord>>;

/// Round number → the three perspective tables of that round, ascending.
pub type StandingsSeries = BTreeMap<u32, RoundTables>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRecord {
    pub code: String,
    pub name_primary: Option<String>,
    pub name_secondary: Option<String>,
    pub name_tertiary: Option<String>,
    pub label: Option<String>,
    pub badge_ref: Option<String>,
    pub group_id: Option<i64>,
}

impl TeamRecord {
    pub fn display_name(&self) -> &str {
        [&self.name_primary, &self.name_secondary, &self.name_tertiary]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or(self.code.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureRecord {
    pub match_id: i64,
    pub league_id: Option<i64>,
    pub round: u32,
    pub kickoff: Option<String>,
    pub home_code: String,
    pub away_code: String,
    pub full_time_score: Option<String>,
    pub half_time_score: Option<String>,
    pub home_rank: Option<String>,
    pub away_rank: Option<String>,
}

impl FixtureRecord {
    /// Full-time goals as `(home, away)` when the score token is `"<int>-<int>"`.
    pub fn goals(&self) -> Option<(u32, u32)> {
        parse_score(self.full_time_score.as_deref()?)
    }
}

pub fn parse_score(raw: &str) -> Option<(u32, u32)> {
    let (home, away) = raw.split_once('-')?;
    let home = home.trim().parse::<u32>().ok()?;
    let away = away.trim().parse::<u32>().ok()?;
    Some((home, away))
}

const STATUS_MARKERS: &[&str] = &["[中]", "(中)", "[预]", "(预)", "[退]", "(退)"];

/// Team name without the bracketed status markers the source appends, trimmed.
pub fn clean_team_name(raw: &str) -> String {
    let mut name = raw.trim().to_string();
    for marker in STATUS_MARKERS {
        name = name.replace(marker, "");
    }
    name.trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    Aggregate,
    Home,
    Away,
}

impl Perspective {
    /// Position in per-perspective arrays: aggregate, home, away.
    pub fn index(self) -> usize {
        match self {
            Perspective::Aggregate => 0,
            Perspective::Home => 1,
            Perspective::Away => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Perspective::Aggregate => "aggregate",
            Perspective::Home => "home",
            Perspective::Away => "away",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw {
            "aggregate" => Some(Perspective::Aggregate),
            "home" => Some(Perspective::Home),
            "away" => Some(Perspective::Away),
            _ => None,
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamStanding {
    pub team_code: String,
    pub team_name: String,
    pub rank: u32,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_diff: i64,
    pub points: u32,
}

impl TeamStanding {
    pub fn new(team_code: &str, team_name: &str) -> Self {
        Self {
            team_code: team_code.to_string(),
            team_name: team_name.to_string(),
            rank: 0,
            played: 0,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            goal_diff: 0,
            points: 0,
        }
    }

    /// Re-derives `played`, `goal_diff` and `points` from the counted fields.
    pub fn refresh_derived(&mut self) {
        self.played = self.won + self.drawn + self.lost;
        self.goal_diff = i64::from(self.goals_for) - i64::from(self.goals_against);
        self.points = 3 * self.won + self.drawn;
    }

    pub fn win_pct(&self) -> f64 {
        if self.played == 0 {
            return 0.0;
        }
        f64::from(self.won) * 100.0 / f64::from(self.played)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundTable {
    pub round: u32,
    pub perspective: Perspective,
    pub entries: Vec<TeamStanding>,
}

impl RoundTable {
    pub fn entry(&self, team_code: &str) -> Option<&TeamStanding> {
        self.entries.iter().find(|e| e.team_code == team_code)
    }

    /// Same team as `other` by code and name. Merged tables can hold two clubs with one
    /// stage-local code, so the code alone is ambiguous there.
    pub fn entry_for(&self, other: &TeamStanding) -> Option<&TeamStanding> {
        self.entries
            .iter()
            .find(|e| e.team_code == other.team_code && e.team_name == other.team_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundTables {
    pub aggregate: RoundTable,
    pub home: RoundTable,
    pub away: RoundTable,
}

impl RoundTables {
    pub fn get(&self, perspective: Perspective) -> &RoundTable {
        match perspective {
            Perspective::Aggregate => &self.aggregate,
            Perspective::Home => &self.home,
            Perspective::Away => &self.away,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoundTable> {
        [&self.aggregate, &self.home, &self.away].into_iter()
    }

    /// Builds the trio from a per-perspective constructor.
    pub fn build(mut table_for: impl FnMut(Perspective) -> RoundTable) -> Self {
        Self {
            aggregate: table_for(Perspective::Aggregate),
            home: table_for(Perspective::Home),
            away: table_for(Perspective::Away),
        }
    }
}
