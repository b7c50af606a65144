//! Joins two independently scraped stages of one competition into a single round series.
//!
//! Stage A is kept as-is. Stage B rounds are renumbered after stage A's last round and their
//! per-round contributions are added onto stage A's final tables. Team codes are local to each
//! feed, so teams are paired across stages through a [`TeamMatcher`].

use tracing::{debug, info};

use crate::model::{RoundTable, RoundTables, StandingsSeries, TeamStanding, clean_team_name};
use crate::standings::ranked_table;

pub trait TeamMatcher {
    /// Whether `incoming` (from stage B) is the same club as `carried` (running merged entry).
    fn same_team(&self, carried: &TeamStanding, incoming: &TeamStanding) -> bool;
}

impl<F> TeamMatcher for F
where
    F: Fn(&TeamStanding, &TeamStanding) -> bool,
{
    fn same_team(&self, carried: &TeamStanding, incoming: &TeamStanding) -> bool {
        self(carried, incoming)
    }
}

/// Display names must be identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactNameMatcher;

impl TeamMatcher for ExactNameMatcher {
    fn same_team(&self, carried: &TeamStanding, incoming: &TeamStanding) -> bool {
        carried.team_name == incoming.team_name
    }
}

/// Names compared after trimming, case folding and dropping bracketed status markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedNameMatcher;

impl TeamMatcher for NormalizedNameMatcher {
    fn same_team(&self, carried: &TeamStanding, incoming: &TeamStanding) -> bool {
        normalize_name(&carried.team_name) == normalize_name(&incoming.team_name)
    }
}

pub fn normalize_name(raw: &str) -> String {
    clean_team_name(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn merge_stages(
    stage_a: &StandingsSeries,
    stage_b: &StandingsSeries,
    matcher: &dyn TeamMatcher,
) -> StandingsSeries {
    let Some((&last_round, baseline)) = stage_a.iter().next_back() else {
        return stage_b.clone();
    };
    if stage_b.is_empty() {
        return stage_a.clone();
    }

    let mut merged = stage_a.clone();
    let mut running: [Vec<TeamStanding>; 3] = [
        baseline.aggregate.entries.clone(),
        baseline.home.entries.clone(),
        baseline.away.entries.clone(),
    ];

    let mut previous: Option<&RoundTables> = None;
    for (offset, (&stage_round, tables)) in stage_b.iter().enumerate() {
        let round = last_round + offset as u32 + 1;
        let merged_tables = RoundTables::build(|perspective| {
            let current = tables.get(perspective);
            let contribution = match previous {
                None => current.entries.clone(),
                Some(prev) => round_delta(prev.get(perspective), current),
            };
            let acc = &mut running[perspective.index()];
            accumulate(acc, &contribution, matcher);
            ranked_table(round, perspective, acc.clone())
        });
        debug!(stage_round, round, "merged stage round");
        merged.insert(round, merged_tables);
        previous = Some(tables);
    }

    info!(
        stage_a_rounds = stage_a.len(),
        stage_b_rounds = stage_b.len(),
        merged_rounds = merged.len(),
        "merged stages"
    );
    merged
}

/// What each team added between two consecutive rounds of the same stage. Both tables come from
/// one feed, so team codes are comparable here.
fn round_delta(prev: &RoundTable, current: &RoundTable) -> Vec<TeamStanding> {
    current
        .entries
        .iter()
        .map(|cur| {
            let Some(before) = prev.entry(&cur.team_code) else {
                return cur.clone();
            };
            let mut delta = TeamStanding::new(&cur.team_code, &cur.team_name);
            delta.won = cur.won.saturating_sub(before.won);
            delta.drawn = cur.drawn.saturating_sub(before.drawn);
            delta.lost = cur.lost.saturating_sub(before.lost);
            delta.goals_for = cur.goals_for.saturating_sub(before.goals_for);
            delta.goals_against = cur.goals_against.saturating_sub(before.goals_against);
            delta.refresh_derived();
            delta
        })
        .collect()
}

fn accumulate(acc: &mut Vec<TeamStanding>, contribution: &[TeamStanding], matcher: &dyn TeamMatcher) {
    for incoming in contribution {
        match acc.iter_mut().find(|carried| matcher.same_team(carried, incoming)) {
            Some(carried) => {
                carried.won += incoming.won;
                carried.drawn += incoming.drawn;
                carried.lost += incoming.lost;
                carried.goals_for += incoming.goals_for;
                carried.goals_against += incoming.goals_against;
                carried.refresh_derived();
            }
            None => {
                debug!(team = %incoming.team_name, "no earlier-stage match, starting fresh");
                let mut fresh = incoming.clone();
                fresh.refresh_derived();
                acc.push(fresh);
            }
        }
    }
}
