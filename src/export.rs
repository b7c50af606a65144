use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::model::{StandingsSeries, TeamStanding};
use crate::store::load_standings;

const STAT_HEADERS: [&str; 9] = ["P", "W", "D", "L", "GF", "GA", "GD", "Pts", "Win%"];
const SHEET_NAME_MAX: usize = 31;

pub struct ExportReport {
    pub sheets: usize,
    pub rows: usize,
}

pub fn export_task_standings(conn: &Connection, task_id: i64, path: &Path) -> Result<ExportReport> {
    let divisions = load_standings(conn, task_id)?;
    if divisions.is_empty() {
        return Err(anyhow!("no standings stored for task {task_id}"));
    }

    let mut workbook = Workbook::new();
    let mut rows_written = 0usize;
    for (division, series) in &divisions {
        let rows = standings_rows(series);
        rows_written += rows.len();
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name(division))?;
        write_rows(sheet, &rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("write xlsx {}", path.display()))?;

    Ok(ExportReport {
        sheets: divisions.len(),
        rows: rows_written,
    })
}

/// Header, then per round one row per team in aggregate rank order with aggregate, home and
/// away figures side by side. An empty row separates rounds.
pub fn standings_rows(series: &StandingsSeries) -> Vec<Vec<String>> {
    let mut header = vec!["Round".to_string(), "Rank".to_string(), "Team".to_string()];
    for prefix in ["", "Home ", "Away "] {
        header.extend(STAT_HEADERS.iter().map(|h| format!("{prefix}{h}")));
    }

    let mut rows = vec![header];
    for (idx, (round, tables)) in series.iter().enumerate() {
        if idx > 0 {
            rows.push(Vec::new());
        }
        for entry in &tables.aggregate.entries {
            let mut row = vec![
                round.to_string(),
                entry.rank.to_string(),
                entry.team_name.clone(),
            ];
            row.extend(stat_cells(Some(entry)));
            row.extend(stat_cells(tables.home.entry_for(entry)));
            row.extend(stat_cells(tables.away.entry_for(entry)));
            rows.push(row);
        }
    }
    rows
}

fn stat_cells(entry: Option<&TeamStanding>) -> Vec<String> {
    let Some(e) = entry else {
        return vec![String::new(); STAT_HEADERS.len()];
    };
    vec![
        e.played.to_string(),
        e.won.to_string(),
        e.drawn.to_string(),
        e.lost.to_string(),
        e.goals_for.to_string(),
        e.goals_against.to_string(),
        e.goal_diff.to_string(),
        e.points.to_string(),
        format!("{:.1}", e.win_pct()),
    ]
}

/// Worksheet names are capped at 31 chars and may not contain `[]:*?/\`.
fn sheet_name(division: &str) -> String {
    let cleaned: String = division
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(SHEET_NAME_MAX)
        .collect();
    if cleaned.trim().is_empty() {
        "standings".to_string()
    } else {
        cleaned
    }
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
