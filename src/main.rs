use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use league_standings::cli::{arg_value, has_flag};
use league_standings::config::CrawlConfig;
use league_standings::fetch::{RetryPolicy, SourceFetcher};
use league_standings::logging::init_logging;
use league_standings::match_detail::DetailSettings;
use league_standings::merge::NormalizedNameMatcher;
use league_standings::pipeline::{BatchReport, Crawler};
use league_standings::store::SqliteStore;
use league_standings::task::load_tasks;

const USAGE: &str = "usage: league_standings --tasks <tasks.json> [--db <path>] [--only <id,id>] [--failures-out <path>] [--normalized-names] [--match-details]";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let tasks_path = arg_value(&args, "--tasks")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("missing --tasks\n{USAGE}"))?;

    let cfg = CrawlConfig::from_env();
    let db_path = arg_value(&args, "--db")
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.db_path.clone());

    let mut tasks = load_tasks(&tasks_path)?;
    if let Some(only) = arg_value(&args, "--only") {
        let ids = parse_id_list(&only)?;
        tasks.retain(|t| ids.contains(&t.task_id));
    }
    if tasks.is_empty() {
        return Err(anyhow!("no tasks selected from {}", tasks_path.display()));
    }

    let mut store = SqliteStore::open(&db_path)?;
    let fetcher = SourceFetcher::http(RetryPolicy::from_config(&cfg));
    let mut crawler =
        Crawler::new(fetcher).with_task_delay(Duration::from_secs_f64(cfg.task_delay_secs));
    if has_flag(&args, "--normalized-names") {
        crawler = crawler.with_matcher(NormalizedNameMatcher);
    }
    let match_details = cfg.match_details || has_flag(&args, "--match-details");
    if match_details {
        crawler = crawler.with_match_details(DetailSettings::from_config(&cfg));
    }

    let cancel = AtomicBool::new(false);
    let report = crawler.run_batch(&tasks, &mut store, &cancel, |progress| {
        if progress.current < progress.total {
            println!("[{}/{}] {}", progress.current + 1, progress.total, progress.message);
        }
    });

    print_summary(&report, &db_path, match_details);
    if let Some(out) = arg_value(&args, "--failures-out")
        && !report.failures.is_empty()
    {
        let json = serde_json::to_string_pretty(&report.failures)
            .context("serialize failure list")?;
        std::fs::write(&out, json).with_context(|| format!("write failure list {out}"))?;
        println!("Failure list written to {out}");
    }
    Ok(())
}

fn print_summary(report: &BatchReport, db_path: &std::path::Path, match_details: bool) {
    println!("Crawl complete");
    println!("DB: {}", db_path.display());
    println!(
        "Tasks: {}/{} succeeded{}",
        report.succeeded,
        report.total,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    if match_details {
        let details = &report.match_details;
        println!(
            "Match details: {} saved, {} already stored, {} failed",
            details.saved, details.already_stored, details.failed
        );
    }
    if !report.failures.is_empty() {
        println!("Failures: {}", report.failures.len());
        for failure in &report.failures {
            println!(
                "  - [{}] {} ({}): {}",
                failure.task_id, failure.label, failure.error_kind, failure.error
            );
        }
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().with_context(|| format!("invalid task id {s:?}")))
        .collect()
}
