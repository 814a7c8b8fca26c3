use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use whatif_sim::config::EngineConfig;
use whatif_sim::scenario_store;
use whatif_sim::state::MatchHistory;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let inputs = parse_input_paths();
    if inputs.is_empty() {
        return Err(anyhow!(
            "usage: scenario_ingest [--db <scenarios.sqlite>] <match.json>..."
        ));
    }

    let db_path = parse_db_path_arg()
        .or_else(|| EngineConfig::from_env().scenario_db_path())
        .context("unable to resolve sqlite path")?;

    let mut histories = Vec::new();
    let mut unreadable = Vec::new();
    for path in &inputs {
        match read_history(path) {
            Ok(history) => histories.push(history),
            Err(err) => unreadable.push(format!("{}: {err:#}", path.display())),
        }
    }
    if histories.is_empty() {
        return Err(anyhow!("no readable match histories ({} failed)", unreadable.len()));
    }

    let mut conn = scenario_store::open_db(&db_path)?;
    let summary = scenario_store::ingest_histories(&mut conn, Some(db_path.clone()), &histories)?;
    let total = scenario_store::scenario_count(&conn)?;

    println!("Scenario ingest complete");
    println!("DB: {}", db_path.display());
    println!(
        "Matches: {}/{}",
        summary.matches_ingested, summary.matches_total
    );
    println!("Scenarios upserted: {}", summary.scenarios_upserted);
    println!("Scenarios in corpus: {total}");

    let problems = unreadable.iter().chain(summary.errors.iter()).collect::<Vec<_>>();
    if !problems.is_empty() {
        println!("  errors: {}", problems.len());
        for err in problems.iter().take(6) {
            println!("   - {err}");
        }
    }

    Ok(())
}

fn read_history(path: &Path) -> Result<MatchHistory> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).context("parse match history json")
}

fn parse_db_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn parse_input_paths() -> Vec<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--db" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        out.push(PathBuf::from(arg));
    }
    out
}
