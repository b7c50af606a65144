use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::info;

use crate::match_detail::MatchDetail;
use crate::model::{Perspective, RoundTable, RoundTables, StandingsSeries, TeamRecord, TeamStanding};
use crate::pipeline::TaskOutput;
use crate::task::SourceConfig;

/// One finished task attempt, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRun {
    pub task_id: i64,
    pub started_at: String,
    pub finished_at: String,
    pub status: String,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub skipped_fixtures: usize,
    pub fixtures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub teams: usize,
    pub matches_inserted: usize,
    pub standings_rows: usize,
}

/// Persistence contract for crawl output: fixtures and match details first write wins, teams
/// last write wins, standings replaced wholesale per task.
pub trait StandingsStore {
    fn save_task(&mut self, task: &SourceConfig, output: &TaskOutput) -> Result<SaveSummary>;
    fn record_run(&mut self, run: &CrawlRun) -> Result<()>;
    fn has_match_detail(&self, match_id: i64) -> Result<bool>;
    /// `false` when a detail for the match was already stored; the stored one is kept.
    fn save_match_detail(&mut self, detail: &MatchDetail) -> Result<bool>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl StandingsStore for SqliteStore {
    fn save_task(&mut self, task: &SourceConfig, output: &TaskOutput) -> Result<SaveSummary> {
        let tx = self.conn.transaction().context("begin save transaction")?;
        let summary = write_task(&tx, task, output)?;
        tx.commit().context("commit save transaction")?;
        info!(
            task_id = task.task_id,
            teams = summary.teams,
            matches_inserted = summary.matches_inserted,
            standings_rows = summary.standings_rows,
            "saved task output"
        );
        Ok(summary)
    }

    fn record_run(&mut self, run: &CrawlRun) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO crawl_runs(task_id, started_at, finished_at, status, error_kind, error, skipped_fixtures, fixtures)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run.task_id,
                    run.started_at,
                    run.finished_at,
                    run.status,
                    run.error_kind,
                    run.error,
                    run.skipped_fixtures as i64,
                    run.fixtures as i64
                ],
            )
            .context("insert crawl run")?;
        Ok(())
    }

    fn has_match_detail(&self, match_id: i64) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM match_details WHERE match_id = ?1",
                params![match_id],
                |_| Ok(()),
            )
            .optional()
            .with_context(|| format!("look up match detail {match_id}"))?;
        Ok(found.is_some())
    }

    fn save_match_detail(&mut self, detail: &MatchDetail) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO match_details(
                    match_id, league_name, game_date, game_time, home_name, away_name,
                    home_code, away_code, home_score, away_score, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    detail.match_id,
                    detail.league_name,
                    detail.game_date,
                    detail.game_time,
                    detail.home_name,
                    detail.away_name,
                    detail.home_code,
                    detail.away_code,
                    detail.home_score,
                    detail.away_score,
                    Utc::now().to_rfc3339()
                ],
            )
            .with_context(|| format!("insert match detail {}", detail.match_id))?;
        Ok(inserted > 0)
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create db directory {}", parent.display()))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS feeds_raw (
            feed_id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            link_type TEXT NOT NULL,
            page_url TEXT NOT NULL,
            feed_url TEXT NOT NULL,
            version TEXT NOT NULL,
            body TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_feeds_raw_task ON feeds_raw(task_id);

        CREATE TABLE IF NOT EXISTS teams (
            task_id INTEGER NOT NULL,
            team_code TEXT NOT NULL,
            link_type TEXT NOT NULL,
            name_primary TEXT NULL,
            name_secondary TEXT NULL,
            name_tertiary TEXT NULL,
            label TEXT NULL,
            badge_ref TEXT NULL,
            group_id INTEGER NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (task_id, team_code)
        );

        CREATE TABLE IF NOT EXISTS matches (
            match_id INTEGER PRIMARY KEY,
            task_id INTEGER NOT NULL,
            link_type TEXT NOT NULL,
            league_id INTEGER NULL,
            round INTEGER NOT NULL,
            kickoff TEXT NULL,
            home_code TEXT NOT NULL,
            away_code TEXT NOT NULL,
            full_time_score TEXT NULL,
            half_time_score TEXT NULL,
            home_rank TEXT NULL,
            away_rank TEXT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_task ON matches(task_id);

        CREATE TABLE IF NOT EXISTS standings (
            task_id INTEGER NOT NULL,
            division TEXT NOT NULL,
            round INTEGER NOT NULL,
            perspective TEXT NOT NULL,
            rank INTEGER NOT NULL,
            team_code TEXT NOT NULL,
            team_name TEXT NOT NULL,
            played INTEGER NOT NULL,
            won INTEGER NOT NULL,
            drawn INTEGER NOT NULL,
            lost INTEGER NOT NULL,
            goals_for INTEGER NOT NULL,
            goals_against INTEGER NOT NULL,
            goal_diff INTEGER NOT NULL,
            points INTEGER NOT NULL,
            PRIMARY KEY (task_id, division, round, perspective, rank)
        );

        CREATE TABLE IF NOT EXISTS match_details (
            match_id INTEGER PRIMARY KEY,
            league_name TEXT NOT NULL,
            game_date TEXT NOT NULL,
            game_time TEXT NOT NULL,
            home_name TEXT NOT NULL,
            away_name TEXT NOT NULL,
            home_code TEXT NOT NULL,
            away_code TEXT NOT NULL,
            home_score TEXT NOT NULL,
            away_score TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS crawl_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            status TEXT NOT NULL,
            error_kind TEXT NULL,
            error TEXT NULL,
            skipped_fixtures INTEGER NOT NULL,
            fixtures INTEGER NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn write_task(tx: &Transaction<'_>, task: &SourceConfig, output: &TaskOutput) -> Result<SaveSummary> {
    let now = Utc::now().to_rfc3339();
    let mut summary = SaveSummary::default();

    for stage in &output.stages {
        let link = stage.link.as_str();
        tx.execute(
            "INSERT INTO feeds_raw(task_id, link_type, page_url, feed_url, version, body, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.task_id,
                link,
                stage.feed.page_url,
                stage.feed.feed_url,
                stage.feed.version,
                stage.feed.body,
                now
            ],
        )
        .context("insert raw feed")?;

        for team in &stage.roster {
            upsert_team(tx, task.task_id, link, team, &now)?;
            summary.teams += 1;
        }

        for fixture in stage.fixtures.values().flatten() {
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO matches(
                        match_id, task_id, link_type, league_id, round, kickoff,
                        home_code, away_code, full_time_score, half_time_score,
                        home_rank, away_rank, created_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        fixture.match_id,
                        task.task_id,
                        link,
                        fixture.league_id,
                        fixture.round,
                        fixture.kickoff,
                        fixture.home_code,
                        fixture.away_code,
                        fixture.full_time_score,
                        fixture.half_time_score,
                        fixture.home_rank,
                        fixture.away_rank,
                        now
                    ],
                )
                .with_context(|| format!("insert match {}", fixture.match_id))?;
            summary.matches_inserted += inserted;
        }
    }

    tx.execute("DELETE FROM standings WHERE task_id = ?1", params![task.task_id])
        .context("clear task standings")?;
    let mut stmt = tx
        .prepare(
            "INSERT INTO standings(
                task_id, division, round, perspective, rank, team_code, team_name,
                played, won, drawn, lost, goals_for, goals_against, goal_diff, points
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .context("prepare standings insert")?;
    for (division, series) in output.standings.divisions() {
        for table in series.values().flat_map(RoundTables::iter) {
            for entry in &table.entries {
                stmt.execute(params![
                    task.task_id,
                    division,
                    table.round,
                    table.perspective.as_str(),
                    entry.rank,
                    entry.team_code,
                    entry.team_name,
                    entry.played,
                    entry.won,
                    entry.drawn,
                    entry.lost,
                    entry.goals_for,
                    entry.goals_against,
                    entry.goal_diff,
                    entry.points
                ])
                .context("insert standings row")?;
                summary.standings_rows += 1;
            }
        }
    }

    Ok(summary)
}

fn upsert_team(
    tx: &Transaction<'_>,
    task_id: i64,
    link: &str,
    team: &TeamRecord,
    now: &str,
) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO teams (
            task_id, team_code, link_type, name_primary, name_secondary, name_tertiary,
            label, badge_ref, group_id, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(task_id, team_code) DO UPDATE SET
            link_type = excluded.link_type,
            name_primary = excluded.name_primary,
            name_secondary = excluded.name_secondary,
            name_tertiary = excluded.name_tertiary,
            label = excluded.label,
            badge_ref = excluded.badge_ref,
            group_id = excluded.group_id,
            updated_at = excluded.updated_at
        "#,
        params![
            task_id,
            team.code,
            link,
            team.name_primary,
            team.name_secondary,
            team.name_tertiary,
            team.label,
            team.badge_ref,
            team.group_id,
            now
        ],
    )
    .with_context(|| format!("upsert team {}", team.code))?;
    Ok(())
}

/// Stored standings of a task, keyed by division.
pub fn load_standings(conn: &Connection, task_id: i64) -> Result<BTreeMap<String, StandingsSeries>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT division, round, perspective, rank, team_code, team_name,
                   played, won, drawn, lost, goals_for, goals_against, goal_diff, points
            FROM standings
            WHERE task_id = ?1
            ORDER BY division ASC, round ASC, perspective ASC, rank ASC
            "#,
        )
        .context("prepare load standings query")?;

    let rows = stmt
        .query_map(params![task_id], |row| {
            let division: String = row.get(0)?;
            let round: u32 = row.get(1)?;
            let perspective: String = row.get(2)?;
            let entry = TeamStanding {
                rank: row.get(3)?,
                team_code: row.get(4)?,
                team_name: row.get(5)?,
                played: row.get(6)?,
                won: row.get(7)?,
                drawn: row.get(8)?,
                lost: row.get(9)?,
                goals_for: row.get(10)?,
                goals_against: row.get(11)?,
                goal_diff: row.get(12)?,
                points: row.get(13)?,
            };
            Ok((division, round, perspective, entry))
        })
        .context("query load standings")?;

    let mut grouped: BTreeMap<(String, u32), [Vec<TeamStanding>; 3]> = BTreeMap::new();
    for row in rows {
        let (division, round, perspective, entry) = row.context("decode standings row")?;
        let Some(perspective) = Perspective::from_label(&perspective) else {
            continue;
        };
        grouped.entry((division, round)).or_default()[perspective.index()].push(entry);
    }

    let mut out: BTreeMap<String, StandingsSeries> = BTreeMap::new();
    for ((division, round), [aggregate, home, away]) in grouped {
        let tables = RoundTables {
            aggregate: RoundTable {
                round,
                perspective: Perspective::Aggregate,
                entries: aggregate,
            },
            home: RoundTable {
                round,
                perspective: Perspective::Home,
                entries: home,
            },
            away: RoundTable {
                round,
                perspective: Perspective::Away,
                entries: away,
            },
        };
        out.entry(division).or_default().insert(round, tables);
    }
    Ok(out)
}

pub fn load_teams(conn: &Connection, task_id: i64) -> Result<Vec<TeamRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT team_code, name_primary, name_secondary, name_tertiary, label, badge_ref, group_id
             FROM teams WHERE task_id = ?1 ORDER BY team_code ASC",
        )
        .context("prepare load teams query")?;
    let rows = stmt
        .query_map(params![task_id], |row| {
            Ok(TeamRecord {
                code: row.get(0)?,
                name_primary: row.get(1)?,
                name_secondary: row.get(2)?,
                name_tertiary: row.get(3)?,
                label: row.get(4)?,
                badge_ref: row.get(5)?,
                group_id: row.get(6)?,
            })
        })
        .context("query load teams")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team row")?);
    }
    Ok(out)
}

pub fn count_matches(conn: &Connection, task_id: i64) -> Result<usize> {
    let count = conn
        .query_row(
            "SELECT COUNT(*) FROM matches WHERE task_id = ?1",
            params![task_id],
            |row| row.get::<_, i64>(0),
        )
        .context("count matches")?;
    Ok(count as usize)
}

pub fn load_runs(conn: &Connection, task_id: i64) -> Result<Vec<CrawlRun>> {
    let mut stmt = conn
        .prepare(
            "SELECT task_id, started_at, finished_at, status, error_kind, error, skipped_fixtures, fixtures
             FROM crawl_runs WHERE task_id = ?1 ORDER BY run_id ASC",
        )
        .context("prepare load runs query")?;
    let rows = stmt
        .query_map(params![task_id], |row| {
            Ok(CrawlRun {
                task_id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                status: row.get(3)?,
                error_kind: row.get(4)?,
                error: row.get(5)?,
                skipped_fixtures: row.get::<_, i64>(6)? as usize,
                fixtures: row.get::<_, i64>(7)? as usize,
            })
        })
        .context("query load runs")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode crawl run row")?);
    }
    Ok(out)
}

pub fn load_match_detail(conn: &Connection, match_id: i64) -> Result<Option<MatchDetail>> {
    conn.query_row(
        "SELECT match_id, league_name, game_date, game_time, home_name, away_name,
                home_code, away_code, home_score, away_score
         FROM match_details WHERE match_id = ?1",
        params![match_id],
        |row| {
            Ok(MatchDetail {
                match_id: row.get(0)?,
                league_name: row.get(1)?,
                game_date: row.get(2)?,
                game_time: row.get(3)?,
                home_name: row.get(4)?,
                away_name: row.get(5)?,
                home_code: row.get(6)?,
                away_code: row.get(7)?,
                home_score: row.get(8)?,
                away_score: row.get(9)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("load match detail {match_id}"))
}
