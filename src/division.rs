use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{RoundTables, StandingsSeries, TeamRecord};
use crate::standings::ranked_table;

pub const EAST: &str = "east";
pub const WEST: &str = "west";

/// Assigns a team to a named division. `None` means the team was seen in fixtures but is absent
/// from the roster.
pub trait DivisionRule {
    fn division_of(&self, team: Option<&TeamRecord>) -> String;

    /// Divisions present in every round of a split, even when no team lands in them.
    fn declared(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Odd roster group id → east, even → west. Teams without a group id, or absent from the
/// roster, count as even, so the split always has exactly these two divisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParityRule;

impl DivisionRule for ParityRule {
    fn division_of(&self, team: Option<&TeamRecord>) -> String {
        let group_id = team.and_then(|t| t.group_id).unwrap_or(0);
        if group_id.rem_euclid(2) == 1 {
            EAST.to_string()
        } else {
            WEST.to_string()
        }
    }

    fn declared(&self) -> Vec<String> {
        vec![EAST.to_string(), WEST.to_string()]
    }
}

/// Explicit group id → division table.
#[derive(Debug, Clone)]
pub struct GroupMapRule {
    pub groups: HashMap<i64, String>,
    pub fallback: String,
}

impl DivisionRule for GroupMapRule {
    fn division_of(&self, team: Option<&TeamRecord>) -> String {
        team.and_then(|t| t.group_id)
            .and_then(|id| self.groups.get(&id))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn declared(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.values().cloned().collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Serializable rule override carried on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DivisionRuleSpec {
    Parity,
    GroupMap {
        groups: BTreeMap<String, Vec<i64>>,
        fallback: String,
    },
}

impl DivisionRuleSpec {
    pub fn build(&self) -> Box<dyn DivisionRule> {
        match self {
            DivisionRuleSpec::Parity => Box::new(ParityRule),
            DivisionRuleSpec::GroupMap { groups, fallback } => {
                let groups = groups
                    .iter()
                    .flat_map(|(name, ids)| ids.iter().map(move |id| (*id, name.clone())))
                    .collect();
                Box::new(GroupMapRule {
                    groups,
                    fallback: fallback.clone(),
                })
            }
        }
    }
}

/// Splits every round table into one re-ranked table per division. Each team lands in exactly
/// one division.
pub fn split_by_division(
    series: &StandingsSeries,
    roster: &[TeamRecord],
    rule: &dyn DivisionRule,
) -> BTreeMap<String, StandingsSeries> {
    let by_code: HashMap<&str, &TeamRecord> = roster.iter().map(|t| (t.code.as_str(), t)).collect();
    let mut assigned: HashMap<String, String> = HashMap::new();
    let declared = rule.declared();

    let mut out: BTreeMap<String, StandingsSeries> = BTreeMap::new();
    for (&round, tables) in series {
        let mut names = declared.clone();
        for entry in tables.iter().flat_map(|t| &t.entries) {
            let name = assigned
                .entry(entry.team_code.clone())
                .or_insert_with(|| rule.division_of(by_code.get(entry.team_code.as_str()).copied()));
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();

        for name in names {
            let split = RoundTables::build(|perspective| {
                let entries = tables
                    .get(perspective)
                    .entries
                    .iter()
                    .filter(|e| assigned.get(&e.team_code) == Some(&name))
                    .cloned()
                    .collect();
                ranked_table(round, perspective, entries)
            });
            out.entry(name).or_default().insert(round, split);
        }
    }

    info!(divisions = out.len(), "split standings by division");
    out
}
