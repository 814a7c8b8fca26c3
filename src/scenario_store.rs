//! SQLite corpus of historical round scenarios.
//!
//! Ingest derives two rows per recorded round (one per side). The engine loads the corpus once,
//! before any simulation, and never touches the database from the trial loop.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::scenarios::HistoricalScenario;
use crate::state::{Game, MatchHistory, Round, RoundType, Side};

pub use crate::config::default_db_path;

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub db_path: Option<PathBuf>,
    pub matches_total: usize,
    pub matches_ingested: usize,
    pub scenarios_upserted: usize,
    pub errors: Vec<String>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS scenarios (
            source_match TEXT NOT NULL,
            round_number INTEGER NOT NULL,
            side TEXT NOT NULL,
            game TEXT NOT NULL,
            map TEXT NULL,
            round_type TEXT NOT NULL,
            economy_diff INTEGER NOT NULL,
            won INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (source_match, round_number, side)
        );
        CREATE INDEX IF NOT EXISTS idx_scenarios_game ON scenarios(game);
        CREATE INDEX IF NOT EXISTS idx_scenarios_round_type ON scenarios(game, round_type);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            matches_total INTEGER NOT NULL,
            matches_ingested INTEGER NOT NULL,
            scenarios_upserted INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Upserts scenarios for every history and records the run in `ingest_runs`.
pub fn ingest_histories(
    conn: &mut Connection,
    db_path: Option<PathBuf>,
    histories: &[MatchHistory],
) -> Result<IngestSummary> {
    if histories.is_empty() {
        return Err(anyhow!("no match histories passed to ingest"));
    }

    let started_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, matches_total, matches_ingested, scenarios_upserted, errors_json)
         VALUES (?1, NULL, ?2, 0, 0, '[]')",
        params![started_at, histories.len() as i64],
    )
    .context("insert ingest run")?;
    let run_id = conn.last_insert_rowid();

    let mut seen = HashSet::new();
    let mut matches_ingested = 0usize;
    let mut scenarios_upserted = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for history in histories {
        let match_id = history.context.match_id.trim();
        if match_id.is_empty() {
            errors.push("history without match_id skipped".to_string());
            continue;
        }
        if !seen.insert(match_id.to_string()) {
            errors.push(format!("{match_id}: duplicate in this run, skipped"));
            continue;
        }
        if history.rounds.is_empty() {
            errors.push(format!("{match_id}: no rounds"));
            continue;
        }

        let tx = conn.transaction().context("begin ingest transaction")?;
        for (position, round) in (1i64..).zip(&history.rounds) {
            for side in [Side::A, Side::B] {
                upsert_scenario(&tx, history, position, round, side)?;
                scenarios_upserted += 1;
            }
        }
        tx.commit().context("commit ingest transaction")?;
        matches_ingested += 1;
        log::debug!("ingested {} rounds from {match_id}", history.rounds.len());
    }

    let finished_at = Utc::now().to_rfc3339();
    let errors_json = serde_json::to_string(&errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, matches_ingested = ?2, scenarios_upserted = ?3, errors_json = ?4
         WHERE run_id = ?5",
        params![
            finished_at,
            matches_ingested as i64,
            scenarios_upserted as i64,
            errors_json,
            run_id
        ],
    )
    .context("update ingest run")?;

    Ok(IngestSummary {
        db_path,
        matches_total: histories.len(),
        matches_ingested,
        scenarios_upserted,
        errors,
    })
}

fn upsert_scenario(
    tx: &rusqlite::Transaction<'_>,
    history: &MatchHistory,
    position: i64,
    round: &Round,
    side: Side,
) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO scenarios (
            source_match, round_number, side, game, map,
            round_type, economy_diff, won, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(source_match, round_number, side) DO UPDATE SET
            game = excluded.game,
            map = excluded.map,
            round_type = excluded.round_type,
            economy_diff = excluded.economy_diff,
            won = excluded.won,
            updated_at = excluded.updated_at
        "#,
        params![
            history.context.match_id.trim(),
            position,
            side_label(side),
            history.context.game.as_str(),
            history.context.map,
            round.round_type.as_str(),
            round.economy_diff(side),
            bool_to_i64(round.winner == side),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert scenario")?;
    Ok(())
}

/// Loads the corpus, optionally restricted to one game. Rows with unknown labels are skipped.
pub fn load_scenarios(conn: &Connection, game: Option<Game>) -> Result<Vec<HistoricalScenario>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT game, map, round_type, economy_diff, won
            FROM scenarios
            WHERE ?1 IS NULL OR game = ?1
            ORDER BY source_match ASC, round_number ASC, side ASC
            "#,
        )
        .context("prepare load scenarios query")?;

    let rows = stmt
        .query_map(params![game.map(Game::as_str)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)? != 0,
            ))
        })
        .context("query load scenarios")?;

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let (game, map, round_type, economy_diff, won) = row.context("decode scenario row")?;
        let (Some(game), Some(round_type)) = (Game::parse(&game), RoundType::parse(&round_type))
        else {
            skipped += 1;
            continue;
        };
        out.push(HistoricalScenario {
            game,
            map,
            round_type,
            economy_diff,
            won,
        });
    }
    if skipped > 0 {
        log::warn!("skipped {skipped} scenario rows with unknown game or round type");
    }
    Ok(out)
}

pub fn scenario_count(conn: &Connection) -> Result<usize> {
    let count = conn
        .query_row("SELECT COUNT(*) FROM scenarios", [], |row| row.get::<_, i64>(0))
        .context("count scenarios")?;
    Ok(count.max(0) as usize)
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::A => "a",
        Side::B => "b",
    }
}

fn bool_to_i64(value: bool) -> i64 {
    if value { 1 } else { 0 }
}
