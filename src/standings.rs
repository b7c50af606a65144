use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, info};

use crate::model::{
    FixturesByRound, Perspective, RoundTable, RoundTables, StandingsSeries, TeamRecord,
    TeamStanding,
};

#[derive(Debug, Clone)]
pub struct StandingsOutcome {
    pub series: StandingsSeries,
    /// Fixtures left out of accumulation because their score was missing or unparseable.
    pub skipped_fixtures: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    won: u32,
    drawn: u32,
    lost: u32,
    goals_for: u32,
    goals_against: u32,
}

impl Tally {
    fn record(&mut self, scored: u32, conceded: u32) {
        self.goals_for += scored;
        self.goals_against += conceded;
        match scored.cmp(&conceded) {
            Ordering::Greater => self.won += 1,
            Ordering::Equal => self.drawn += 1,
            Ordering::Less => self.lost += 1,
        }
    }
}

/// Teams in a fixed order (roster first, then unknown codes as they appear) with one tally per
/// perspective. The order is the final tie-break key.
struct Ledger {
    codes: Vec<String>,
    names: Vec<String>,
    index: HashMap<String, usize>,
    tallies: [Vec<Tally>; 3],
}

impl Ledger {
    fn seeded(roster: &[TeamRecord]) -> Self {
        let mut ledger = Ledger {
            codes: Vec::with_capacity(roster.len()),
            names: Vec::with_capacity(roster.len()),
            index: HashMap::with_capacity(roster.len()),
            tallies: [Vec::new(), Vec::new(), Vec::new()],
        };
        for team in roster {
            ledger.slot(&team.code, team.display_name());
        }
        ledger
    }

    fn slot(&mut self, code: &str, name: &str) -> usize {
        if let Some(&idx) = self.index.get(code) {
            return idx;
        }
        let idx = self.codes.len();
        self.codes.push(code.to_string());
        self.names.push(name.to_string());
        self.index.insert(code.to_string(), idx);
        for tally in &mut self.tallies {
            tally.push(Tally::default());
        }
        idx
    }

    fn tally_mut(&mut self, perspective: Perspective, idx: usize) -> &mut Tally {
        &mut self.tallies[perspective.index()][idx]
    }

    fn snapshot(&self, round: u32, perspective: Perspective) -> RoundTable {
        let entries = self.tallies[perspective.index()]
            .iter()
            .enumerate()
            .map(|(idx, tally)| {
                let mut entry = TeamStanding::new(&self.codes[idx], &self.names[idx]);
                entry.won = tally.won;
                entry.drawn = tally.drawn;
                entry.lost = tally.lost;
                entry.goals_for = tally.goals_for;
                entry.goals_against = tally.goals_against;
                entry.refresh_derived();
                entry
            })
            .collect();
        ranked_table(round, perspective, entries)
    }
}

/// Table order: points, then goal difference, then goals scored, all descending.
pub fn compare_standing(a: &TeamStanding, b: &TeamStanding) -> Ordering {
    b.points
        .cmp(&a.points)
        .then(b.goal_diff.cmp(&a.goal_diff))
        .then(b.goals_for.cmp(&a.goals_for))
}

/// Sorts with [`compare_standing`] and assigns 1-based ranks. The sort is stable, so exact ties
/// keep the incoming order.
pub fn rank_entries(entries: &mut [TeamStanding]) {
    entries.sort_by(compare_standing);
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = idx as u32 + 1;
    }
}

pub fn ranked_table(round: u32, perspective: Perspective, mut entries: Vec<TeamStanding>) -> RoundTable {
    rank_entries(&mut entries);
    RoundTable {
        round,
        perspective,
        entries,
    }
}

pub fn compute_standings(fixtures: &FixturesByRound, roster: &[TeamRecord]) -> StandingsOutcome {
    let mut ledger = Ledger::seeded(roster);
    let mut series = StandingsSeries::new();
    let mut skipped_fixtures = 0usize;

    for (&round, round_fixtures) in fixtures {
        for fixture in round_fixtures {
            let Some((home_goals, away_goals)) = fixture.goals() else {
                skipped_fixtures += 1;
                continue;
            };
            let home = ledger.slot(&fixture.home_code, &fixture.home_code);
            let away = ledger.slot(&fixture.away_code, &fixture.away_code);

            ledger
                .tally_mut(Perspective::Aggregate, home)
                .record(home_goals, away_goals);
            ledger
                .tally_mut(Perspective::Aggregate, away)
                .record(away_goals, home_goals);
            ledger
                .tally_mut(Perspective::Home, home)
                .record(home_goals, away_goals);
            ledger
                .tally_mut(Perspective::Away, away)
                .record(away_goals, home_goals);
        }

        series.insert(
            round,
            RoundTables::build(|perspective| ledger.snapshot(round, perspective)),
        );
        debug!(round, teams = ledger.codes.len(), "round snapshot taken");
    }

    info!(
        rounds = series.len(),
        teams = ledger.codes.len(),
        skipped_fixtures,
        "computed standings"
    );
    StandingsOutcome {
        series,
        skipped_fixtures,
    }
}
