//! Historical round corpus and the similarity lookup the round model blends in.
//!
//! A scenario is comparable to a round only when the round types match. Within a type the
//! weight decays exponentially with the gap between economy differentials, so a 3000-credit
//! gap keeps ~37% of the weight and anything past ~9000 credits drops out entirely.

use serde::{Deserialize, Serialize};

use crate::state::{Game, MatchHistory, RoundType, Side};

pub const SIMILARITY_BANDWIDTH: f64 = 3_000.0;
pub const MIN_SIMILARITY_WEIGHT: f64 = 0.05;
pub const COMPARABLE_WEIGHT: f64 = 0.25;
pub const MIN_EFFECTIVE_WEIGHT: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalScenario {
    pub game: Game,
    #[serde(default)]
    pub map: Option<String>,
    pub round_type: RoundType,
    // Starting economy differential from the perspective of the side the outcome refers to.
    pub economy_diff: i64,
    pub won: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalSignal {
    /// Similarity-weighted win rate, shrunk toward 0.5 when the effective sample is small.
    pub win_rate: f64,
    pub effective_weight: f64,
    pub comparable: usize,
}

impl HistoricalSignal {
    pub fn neutral() -> Self {
        Self {
            win_rate: 0.5,
            effective_weight: 0.0,
            comparable: 0,
        }
    }

    /// Win rate mapped onto `[-1, 1]`.
    pub fn signal(&self) -> f64 {
        (2.0 * (self.win_rate - 0.5)).clamp(-1.0, 1.0)
    }
}

pub fn similarity(scenario: &HistoricalScenario, round_type: RoundType, economy_diff: i64) -> f64 {
    if scenario.round_type != round_type {
        return 0.0;
    }
    let gap = (scenario.economy_diff - economy_diff).abs() as f64;
    let w = (-gap / SIMILARITY_BANDWIDTH).exp();
    if w < MIN_SIMILARITY_WEIGHT { 0.0 } else { w }
}

pub fn historical_signal(
    scenarios: &[HistoricalScenario],
    round_type: RoundType,
    economy_diff: i64,
) -> HistoricalSignal {
    let mut weighted_wins = 0.0;
    let mut weight_sum = 0.0;
    let mut comparable = 0usize;

    for scenario in scenarios {
        let w = similarity(scenario, round_type, economy_diff);
        if w <= 0.0 {
            continue;
        }
        weight_sum += w;
        if scenario.won {
            weighted_wins += w;
        }
        if w >= COMPARABLE_WEIGHT {
            comparable += 1;
        }
    }

    if weight_sum <= 0.0 {
        return HistoricalSignal::neutral();
    }

    // Shrink small samples toward a coin flip.
    let raw = weighted_wins / weight_sum;
    let shrink = (weight_sum / MIN_EFFECTIVE_WEIGHT).min(1.0);
    HistoricalSignal {
        win_rate: shrink * raw + (1.0 - shrink) * 0.5,
        effective_weight: weight_sum,
        comparable,
    }
}

/// Derives two scenarios per round (one from each side's perspective).
pub fn scenarios_from_history(history: &MatchHistory) -> Vec<HistoricalScenario> {
    let mut out = Vec::with_capacity(history.rounds.len() * 2);
    for round in &history.rounds {
        for side in [Side::A, Side::B] {
            out.push(HistoricalScenario {
                game: history.context.game,
                map: history.context.map.clone(),
                round_type: round.round_type,
                economy_diff: round.economy_diff(side),
                won: round.winner == side,
            });
        }
    }
    out
}
