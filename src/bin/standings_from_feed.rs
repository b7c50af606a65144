use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use league_standings::cli::has_flag;
use league_standings::division::{ParityRule, split_by_division};
use league_standings::feed::parse_feed;
use league_standings::logging::init_logging;
use league_standings::model::{StandingsSeries, TeamRecord};
use league_standings::standings::compute_standings;

#[derive(Serialize)]
struct Output<'a> {
    teams: &'a [TeamRecord],
    skipped_fixtures: usize,
    standings: &'a StandingsSeries,
    #[serde(skip_serializing_if = "Option::is_none")]
    divisions: Option<std::collections::BTreeMap<String, StandingsSeries>>,
}

/// Offline run over a saved feed file: `standings_from_feed <feed.js> [--split]`.
fn main() -> Result<()> {
    init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("usage: standings_from_feed <feed.js> [--split]"))?;
    let split = has_flag(&args, "--split");

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed reading feed {}", path.display()))?;
    let parsed = parse_feed(&raw).with_context(|| format!("failed parsing {}", path.display()))?;
    let outcome = compute_standings(&parsed.fixtures, &parsed.roster);
    let divisions = split.then(|| split_by_division(&outcome.series, &parsed.roster, &ParityRule));

    let output = Output {
        teams: &parsed.roster,
        skipped_fixtures: outcome.skipped_fixtures,
        standings: &outcome.series,
        divisions,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("serialize standings")?
    );
    Ok(())
}
