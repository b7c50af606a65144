use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use league_standings::cli::arg_value;
use league_standings::config::CrawlConfig;
use league_standings::export::export_task_standings;
use league_standings::logging::init_logging;
use league_standings::store::open_db;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let task_id = arg_value(&args, "--task")
        .ok_or_else(|| anyhow!("usage: export_standings --task <id> [--db <path>] [--out <file.xlsx>]"))?
        .parse::<i64>()
        .context("--task must be an integer")?;
    let db_path = arg_value(&args, "--db")
        .map(PathBuf::from)
        .unwrap_or_else(|| CrawlConfig::from_env().db_path);
    let out = arg_value(&args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("standings_task_{task_id}.xlsx")));

    let conn = open_db(&db_path)?;
    let report = export_task_standings(&conn, task_id, &out)?;
    println!(
        "Exported {} sheet(s), {} row(s) to {}",
        report.sheets,
        report.rows,
        out.display()
    );
    Ok(())
}
