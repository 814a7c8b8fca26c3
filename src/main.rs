use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use whatif_sim::config::{EngineConfig, parse_seed};
use whatif_sim::engine::{RetakeInput, WhatIfEngine};
use whatif_sim::scenario_store;
use whatif_sim::state::{DecisionAxis, MatchHistory, QueryIntent};

const USAGE: &str = "usage: whatif_sim --history <match.json> (--intent <intent.json> | \
--round <n> --original <action> --hypothetical <action> [--axis economic|tactical|objective]) \
[--retake <snapshot.json>] [--db <scenarios.sqlite>] [--trials <n>] [--seed <n>]";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let history_path = arg_value(&args, "--history")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("missing --history\n{USAGE}"))?;
    let history: MatchHistory = read_json(&history_path)?;

    let intent = match arg_value(&args, "--intent") {
        Some(path) => read_json::<QueryIntent>(Path::new(&path))?,
        None => intent_from_args(&args, &history)?,
    };

    let retake = arg_value(&args, "--retake")
        .map(|path| read_json::<RetakeInput>(Path::new(&path)))
        .transpose()?;

    let mut config = EngineConfig::from_env();
    if let Some(trials) = arg_value(&args, "--trials") {
        config.trials = trials
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid --trials {trials}"))?
            .clamp(1, 200_000);
    }
    if let Some(seed) = arg_value(&args, "--seed") {
        config.seed = parse_seed(&seed).ok_or_else(|| anyhow!("invalid --seed {seed}"))?;
    }
    if let Some(db) = arg_value(&args, "--db") {
        config.scenario_db = Some(PathBuf::from(db));
    }

    let scenarios = match config.scenario_db_path() {
        Some(path) if path.exists() => {
            let conn = scenario_store::open_db(&path)?;
            let scenarios = scenario_store::load_scenarios(&conn, Some(history.context.game))?;
            log::info!("loaded {} scenarios from {}", scenarios.len(), path.display());
            scenarios
        }
        Some(path) => {
            log::warn!(
                "scenario db {} not found; historical factor stays neutral",
                path.display()
            );
            Vec::new()
        }
        None => Vec::new(),
    };

    let engine = WhatIfEngine::new(config).with_scenarios(scenarios);
    let prediction = engine
        .analyze(&history, &intent, retake.as_ref())
        .with_context(|| format!("analyze round {}", intent.round_number))?;

    println!("{}", prediction.to_json_pretty().context("serialize prediction")?);
    Ok(())
}

fn intent_from_args(args: &[String], history: &MatchHistory) -> Result<QueryIntent> {
    let round_number = arg_value(args, "--round")
        .ok_or_else(|| anyhow!("missing --round\n{USAGE}"))?
        .trim()
        .parse::<u32>()
        .context("invalid --round")?;
    let original_action =
        arg_value(args, "--original").ok_or_else(|| anyhow!("missing --original\n{USAGE}"))?;
    let hypothetical_action = arg_value(args, "--hypothetical")
        .ok_or_else(|| anyhow!("missing --hypothetical\n{USAGE}"))?;
    let decision_axis = match arg_value(args, "--axis").as_deref().map(str::trim) {
        None | Some("economic") => DecisionAxis::Economic,
        Some("tactical") => DecisionAxis::Tactical,
        Some("objective") => DecisionAxis::Objective,
        Some(other) => return Err(anyhow!("unknown --axis {other}")),
    };
    Ok(QueryIntent {
        round_number,
        decision_axis,
        original_action,
        hypothetical_action,
        game: history.context.game,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
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
