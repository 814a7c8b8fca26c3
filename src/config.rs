use std::env;
use std::path::PathBuf;

use crate::cache::DEFAULT_CAPACITY;
use crate::monte_carlo::{DEFAULT_SEED, DEFAULT_TRIALS, MIN_COMPARABLE_SCENARIOS, SimulationConfig};

const APP_DIR: &str = "whatif_sim";
pub const DEFAULT_BATCH_THREADS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub trials: u32,
    pub seed: u64,
    pub cache_capacity: usize,
    pub batch_threads: usize,
    pub min_comparable_scenarios: usize,
    pub scenario_db: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            seed: DEFAULT_SEED,
            cache_capacity: DEFAULT_CAPACITY,
            batch_threads: DEFAULT_BATCH_THREADS,
            min_comparable_scenarios: MIN_COMPARABLE_SCENARIOS,
            scenario_db: None,
        }
    }
}

impl EngineConfig {
    /// Reads `WHATIF_*` variables; unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let trials = env::var("WHATIF_TRIALS")
            .ok()
            .and_then(|val| val.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_TRIALS)
            .clamp(1, 200_000);
        let seed = env::var("WHATIF_SEED")
            .ok()
            .and_then(|val| parse_seed(&val))
            .unwrap_or(DEFAULT_SEED);
        let cache_capacity = env::var("WHATIF_CACHE_CAPACITY")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_CAPACITY)
            .clamp(1, 100_000);
        let batch_threads = env::var("WHATIF_BATCH_THREADS")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_BATCH_THREADS)
            .clamp(1, 32);
        let scenario_db = opt_env("WHATIF_SCENARIO_DB").map(PathBuf::from);

        Self {
            trials,
            seed,
            cache_capacity,
            batch_threads,
            min_comparable_scenarios: MIN_COMPARABLE_SCENARIOS,
            scenario_db,
        }
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            trials: self.trials.max(1),
            seed: self.seed,
            min_comparable: self.min_comparable_scenarios,
        }
    }

    pub fn scenario_db_path(&self) -> Option<PathBuf> {
        self.scenario_db.clone().or_else(default_db_path)
    }
}

/// Accepts decimal or `0x`-prefixed hex.
pub fn parse_seed(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        return u64::from_str_radix(&hex.replace('_', ""), 16).ok();
    }
    raw.replace('_', "").parse::<u64>().ok()
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|val| if val.trim().is_empty() { None } else { Some(val) })
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Some(base) = opt_env("XDG_CACHE_HOME") {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = opt_env("HOME")?;
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("scenarios.sqlite"))
}
