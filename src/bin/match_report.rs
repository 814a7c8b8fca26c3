use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use whatif_sim::config::EngineConfig;
use whatif_sim::engine::WhatIfEngine;
use whatif_sim::report_export;
use whatif_sim::scenario_store;
use whatif_sim::state::MatchHistory;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let history_path = first_positional(&args)
        .map(PathBuf::from)
        .ok_or_else(|| {
            anyhow!("usage: match_report <match.json> [--xlsx <report.xlsx>] [--db <scenarios.sqlite>]")
        })?;
    let raw = fs::read_to_string(&history_path)
        .with_context(|| format!("read {}", history_path.display()))?;
    let history: MatchHistory =
        serde_json::from_str(&raw).context("parse match history json")?;

    let mut config = EngineConfig::from_env();
    if let Some(db) = flag_value(&args, "--db") {
        config.scenario_db = Some(PathBuf::from(db));
    }
    let scenarios = match config.scenario_db_path() {
        Some(path) if path.exists() => {
            let conn = scenario_store::open_db(&path)?;
            scenario_store::load_scenarios(&conn, Some(history.context.game))?
        }
        _ => Vec::new(),
    };

    let engine = WhatIfEngine::new(config).with_scenarios(scenarios);
    let entries = engine.analyze_match(&history);

    let (a, b) = history.final_score();
    println!(
        "{} {} {}-{} {} ({} rounds)",
        history.context.match_id,
        history.context.side_a,
        a,
        b,
        history.context.side_b,
        history.rounds.len()
    );
    for entry in &entries {
        match &entry.prediction {
            Ok(p) => println!(
                "round {:>2}  {:<10} -> {:<10}  {:>5.1}% -> {:>5.1}%  ({:+5.1})  conf {:.2}",
                p.round_number,
                p.original_action,
                p.hypothetical_action,
                p.actual_win_probability * 100.0,
                p.win_probability * 100.0,
                p.probability_delta() * 100.0,
                p.confidence
            ),
            Err(err) => println!("round {:>2}  failed: {err}", entry.intent.round_number),
        }
    }

    if let Some(path) = flag_value(&args, "--xlsx") {
        let path = PathBuf::from(path);
        let report = report_export::export_match_report(&path, &history, &entries)?;
        println!(
            "Wrote {} ({} rounds, {} score rows, {} findings)",
            path.display(),
            report.rounds,
            report.distribution_rows,
            report.findings
        );
        for err in report.errors.iter().take(6) {
            println!("   - {err}");
        }
    }

    let stats = engine.cache().stats();
    log::debug!("cache: {} hits, {} misses", stats.hits, stats.misses);
    Ok(())
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.clone());
            }
        }
    }
    None
}

fn first_positional(args: &[String]) -> Option<&String> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--xlsx" || arg == "--db" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(arg);
        }
    }
    None
}
