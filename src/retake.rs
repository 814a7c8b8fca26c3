//! Retake-vs-save decision model.
//!
//! Small-numbers fights are modeled from an empirical `{defenders}v{attackers}` table rather
//! than round-by-round simulation. Four bounded multiplicative adjustments (site control,
//! time pressure, defender health, utility) are applied on top of the table value.

use serde::{Deserialize, Serialize};

use crate::economy::{ActionKind, EconomyRules};
use crate::state::{Modification, RoundType};

pub const MIN_RETAKE_PROB: f64 = 0.05;
pub const MAX_RETAKE_PROB: f64 = 0.95;

const MIN_SAVE_NEXT_PROB: f64 = 0.35;
const MAX_SAVE_NEXT_PROB: f64 = 0.75;
const FULL_BUY_NEXT_BONUS: f64 = 0.05;
const SAVE_MOMENTUM_PENALTY: f64 = -0.10;
const TIME_PRESSURE_WINDOW_SECS: f64 = 45.0;
const UTILITY_BONUS: f64 = 1.15;

// Recommendation thresholds.
const SAVE_BELOW_RETAKE: f64 = 0.15;
const SAVE_ABOVE_NEXT: f64 = 0.55;
const RETAKE_ABOVE: f64 = 0.35;
const RETAKE_BELOW_NEXT: f64 = 0.50;

pub const DEFAULT_DEFENDER_HEALTH: f64 = 100.0;
pub const DEFAULT_LOADOUT_VALUE: i64 = 3_900;

// Rows: defenders 1..=5, columns: attackers 1..=5.
const RETAKE_TABLE: [[f64; 5]; 5] = [
    [0.45, 0.18, 0.06, 0.03, 0.02],
    [0.70, 0.40, 0.18, 0.09, 0.04],
    [0.82, 0.58, 0.35, 0.17, 0.08],
    [0.88, 0.72, 0.50, 0.32, 0.15],
    [0.92, 0.80, 0.62, 0.42, 0.25],
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenderSnapshot {
    #[serde(default)]
    pub health: Option<f64>,
    #[serde(default)]
    pub utility: Vec<String>,
    #[serde(default)]
    pub loadout_value: Option<i64>,
}

impl DefenderSnapshot {
    pub fn has_utility(&self) -> bool {
        self.utility.iter().any(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetakeScenario {
    pub defenders: u8,
    pub attackers: u8,
    pub site: String,
    pub site_control: f64,
    pub seconds_remaining: f64,
    #[serde(default)]
    pub defenders_state: Vec<DefenderSnapshot>,
}

/// Recent telemetry around the decision. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryWindow {
    #[serde(default)]
    pub team_bank: Option<i64>,
    #[serde(default)]
    pub recent_round_wins: Vec<bool>,
    #[serde(default)]
    pub upcoming_round_type: Option<RoundType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaveImpact {
    pub next_round_win_probability: f64,
    pub economic_advantage: i64,
    pub full_buy_probability: f64,
    pub momentum_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetakeCall {
    Save,
    Retake,
    BothViable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetakeAnalysis {
    pub matchup: String,
    pub retake_success_probability: f64,
    pub save_impact: SaveImpact,
    pub preserved_value: i64,
    pub call: RetakeCall,
    pub recommendation: String,
}

pub fn matchup_key(defenders: u8, attackers: u8) -> String {
    format!("{defenders}v{attackers}")
}

/// Table value for the matchup; counts are clamped to 1..=5.
pub fn base_rate(defenders: u8, attackers: u8) -> f64 {
    let d = defenders.clamp(1, 5) as usize - 1;
    let a = attackers.clamp(1, 5) as usize - 1;
    RETAKE_TABLE[d][a]
}

pub fn site_control_factor(site_control: f64) -> f64 {
    1.0 - 0.3 * site_control.clamp(0.0, 1.0)
}

pub fn time_pressure_factor(seconds_remaining: f64) -> f64 {
    0.7 + 0.3 * (seconds_remaining.max(0.0) / TIME_PRESSURE_WINDOW_SECS).min(1.0)
}

pub fn health_factor(avg_health: f64) -> f64 {
    0.8 + 0.2 * (avg_health.clamp(0.0, 100.0) / 100.0)
}

fn average_health(defenders: &[DefenderSnapshot]) -> f64 {
    let known = defenders.iter().filter_map(|d| d.health).collect::<Vec<_>>();
    if known.is_empty() {
        return DEFAULT_DEFENDER_HEALTH;
    }
    known.iter().sum::<f64>() / known.len() as f64
}

pub fn retake_probability(scenario: &RetakeScenario) -> f64 {
    let mut p = base_rate(scenario.defenders, scenario.attackers);
    p *= site_control_factor(scenario.site_control);
    p *= time_pressure_factor(scenario.seconds_remaining);
    p *= health_factor(average_health(&scenario.defenders_state));
    if scenario.defenders_state.iter().any(DefenderSnapshot::has_utility) {
        p *= UTILITY_BONUS;
    }
    if p.is_nan() {
        return MIN_RETAKE_PROB;
    }
    p.clamp(MIN_RETAKE_PROB, MAX_RETAKE_PROB)
}

/// Bank plus the loadout of every defender who would survive by saving.
pub fn preserved_value(scenario: &RetakeScenario, telemetry: &TelemetryWindow) -> i64 {
    let bank = telemetry.team_bank.unwrap_or(0).max(0);
    let snapshots = scenario
        .defenders_state
        .iter()
        .take(scenario.defenders as usize)
        .map(|d| d.loadout_value.unwrap_or(DEFAULT_LOADOUT_VALUE).max(0))
        .sum::<i64>();
    let missing = (scenario.defenders as usize).saturating_sub(scenario.defenders_state.len());
    bank + snapshots + missing as i64 * DEFAULT_LOADOUT_VALUE
}

pub fn next_round_probability(preserved: i64, upcoming: Option<RoundType>) -> f64 {
    let mut p = if preserved > 15_000 {
        0.60
    } else if preserved > 12_000 {
        0.55
    } else if preserved > 8_000 {
        0.50
    } else {
        0.45
    };
    if upcoming == Some(RoundType::Full) {
        p += FULL_BUY_NEXT_BONUS;
    }
    p.clamp(MIN_SAVE_NEXT_PROB, MAX_SAVE_NEXT_PROB)
}

pub fn save_impact(
    scenario: &RetakeScenario,
    telemetry: &TelemetryWindow,
    rules: &EconomyRules,
) -> SaveImpact {
    let preserved = preserved_value(scenario, telemetry);
    let full_buy = rules.full_buy_cost.max(1);
    SaveImpact {
        next_round_win_probability: next_round_probability(
            preserved,
            telemetry.upcoming_round_type,
        ),
        economic_advantage: preserved - full_buy,
        full_buy_probability: ((preserved + rules.loss_bonus) as f64 / full_buy as f64)
            .clamp(0.0, 1.0),
        momentum_penalty: SAVE_MOMENTUM_PENALTY,
    }
}

/// Never breaks a close call toward either option.
pub fn recommend(retake: f64, save_next: f64) -> RetakeCall {
    if retake < SAVE_BELOW_RETAKE && save_next > SAVE_ABOVE_NEXT {
        RetakeCall::Save
    } else if retake > RETAKE_ABOVE && save_next < RETAKE_BELOW_NEXT {
        RetakeCall::Retake
    } else {
        RetakeCall::BothViable
    }
}

pub fn analyze(
    scenario: &RetakeScenario,
    telemetry: &TelemetryWindow,
    rules: &EconomyRules,
) -> RetakeAnalysis {
    let retake = retake_probability(scenario);
    let impact = save_impact(scenario, telemetry, rules);
    let call = recommend(retake, impact.next_round_win_probability);
    let matchup = matchup_key(scenario.defenders, scenario.attackers);
    let retake_pct = (retake * 100.0).round();
    let next_pct = (impact.next_round_win_probability * 100.0).round();

    let recommendation = match call {
        RetakeCall::Save => format!(
            "Save. A {matchup} retake on {} converts about {retake_pct:.0}% of the time, while \
             saving keeps next-round odds near {next_pct:.0}%.",
            scenario.site
        ),
        RetakeCall::Retake => format!(
            "Retake. A {matchup} retake on {} converts about {retake_pct:.0}%, and a save only \
             buys {next_pct:.0}% next round.",
            scenario.site
        ),
        RetakeCall::BothViable => {
            let mut text = format!(
                "Both options are viable: retake {retake_pct:.0}% vs. next-round {next_pct:.0}% \
                 after saving. Decide on team read"
            );
            if let Some((won, played)) = recent_form(telemetry) {
                text.push_str(&format!(" (won {won} of the last {played})"));
            }
            text.push('.');
            text
        }
    };

    RetakeAnalysis {
        matchup,
        retake_success_probability: retake,
        save_impact: impact,
        preserved_value: preserved_value(scenario, telemetry),
        call,
        recommendation,
    }
}

/// Rounds won out of the recent window, when one was supplied.
pub fn recent_form(telemetry: &TelemetryWindow) -> Option<(usize, usize)> {
    let played = telemetry.recent_round_wins.len();
    if played == 0 {
        return None;
    }
    let won = telemetry.recent_round_wins.iter().filter(|w| **w).count();
    Some((won, played))
}

/// True when one label is a retake and the other a save.
pub fn is_retake_decision(modification: &Modification) -> bool {
    let original = ActionKind::classify(&modification.original_action);
    let hypothetical = ActionKind::classify(&modification.hypothetical_action);
    matches!(
        (original, hypothetical),
        (ActionKind::Retake, ActionKind::Save) | (ActionKind::Save, ActionKind::Retake)
    )
}
