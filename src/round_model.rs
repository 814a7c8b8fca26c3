use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::scenarios::{HistoricalScenario, HistoricalSignal, historical_signal};
use crate::state::{GameState, MatchContext, Round, RoundType, Side};

const BASE_RATE: f64 = 0.5;
// Largest total swing away from the base rate when every factor saturates.
const ADJUSTMENT_BUDGET: f64 = 0.4;

pub const W_ECONOMY: f64 = 0.30;
pub const W_MOMENTUM: f64 = 0.25;
pub const W_MAP_SIDE: f64 = 0.15;
pub const W_HISTORICAL: f64 = 0.20;
pub const W_ROUND_TYPE: f64 = 0.10;

const ECONOMY_SCALE: f64 = 10_000.0;
const ROUND_TYPE_STEP: f64 = 0.05;

pub const MIN_ROUND_PROB: f64 = 0.1;
pub const MAX_ROUND_PROB: f64 = 0.9;

/// Per-map side bias, expressed as a signal in `[-1, 1]` for `side` in `round_number`.
pub trait MapSideAdjustment: Send + Sync {
    fn signal(&self, map: Option<&str>, side: Side, round_number: u32) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoMapAdjustment;

impl MapSideAdjustment for NoMapAdjustment {
    fn signal(&self, _map: Option<&str>, _side: Side, _round_number: u32) -> f64 {
        0.0
    }
}

/// Fixed table of first-half biases for side A; the sign flips at the half and for side B.
#[derive(Debug, Clone, Default)]
pub struct MapSideTable {
    pub half_length: u32,
    first_half_a: HashMap<String, f64>,
}

impl MapSideTable {
    pub fn new(half_length: u32) -> Self {
        Self {
            half_length,
            first_half_a: HashMap::new(),
        }
    }

    pub fn with_map(mut self, map: &str, side_a_first_half: f64) -> Self {
        self.first_half_a
            .insert(map.trim().to_ascii_lowercase(), side_a_first_half.clamp(-1.0, 1.0));
        self
    }
}

impl MapSideAdjustment for MapSideTable {
    fn signal(&self, map: Option<&str>, side: Side, round_number: u32) -> f64 {
        let Some(map) = map else { return 0.0 };
        let Some(bias) = self.first_half_a.get(&map.trim().to_ascii_lowercase()) else {
            return 0.0;
        };
        let second_half = self.half_length > 0 && round_number > self.half_length;
        let for_a = if second_half { -bias } else { *bias };
        match side {
            Side::A => for_a,
            Side::B => -for_a,
        }
    }
}

/// Raw factor values, each already mapped onto `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FactorSignals {
    pub economy: f64,
    pub momentum: f64,
    pub map_side: f64,
    pub historical: f64,
    pub round_type: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorContribution {
    pub name: &'static str,
    pub signal: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundForecast {
    pub probability: f64,
    pub factors: Vec<FactorContribution>,
}

pub fn economy_signal(economy_diff: i64) -> f64 {
    (economy_diff as f64 / ECONOMY_SCALE).tanh()
}

pub fn round_type_signal(round_type: RoundType) -> f64 {
    let adjustment = match round_type {
        RoundType::Full => ROUND_TYPE_STEP,
        RoundType::Eco => -ROUND_TYPE_STEP,
        RoundType::Force | RoundType::Pistol => 0.0,
    };
    adjustment / ROUND_TYPE_STEP
}

/// Weighted blend of the factor signals, clamped to `[0.1, 0.9]`.
pub fn combine(signals: &FactorSignals) -> f64 {
    let adjustment = W_ECONOMY * signals.economy
        + W_MOMENTUM * signals.momentum
        + W_MAP_SIDE * signals.map_side
        + W_HISTORICAL * signals.historical
        + W_ROUND_TYPE * signals.round_type;
    let p = BASE_RATE + ADJUSTMENT_BUDGET * adjustment;
    if p.is_nan() {
        return BASE_RATE;
    }
    p.clamp(MIN_ROUND_PROB, MAX_ROUND_PROB)
}

#[derive(Clone)]
pub struct RoundOutcomeModel {
    map_sides: Arc<dyn MapSideAdjustment>,
}

impl Default for RoundOutcomeModel {
    fn default() -> Self {
        Self::new(Arc::new(NoMapAdjustment))
    }
}

impl std::fmt::Debug for RoundOutcomeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundOutcomeModel").finish_non_exhaustive()
    }
}

impl RoundOutcomeModel {
    pub fn new(map_sides: Arc<dyn MapSideAdjustment>) -> Self {
        Self { map_sides }
    }

    pub fn map_signal(&self, ctx: &MatchContext, round_number: u32) -> f64 {
        self.map_sides
            .signal(ctx.map.as_deref(), ctx.focus, round_number)
            .clamp(-1.0, 1.0)
    }

    /// Signals for `round` given the live `state`; the historical lookup is supplied so it
    /// can be computed once per round rather than once per trial.
    pub fn signals(
        &self,
        state: &GameState,
        round: &Round,
        ctx: &MatchContext,
        historical: &HistoricalSignal,
    ) -> FactorSignals {
        FactorSignals {
            economy: economy_signal(state.economy_diff(ctx.focus)),
            momentum: state.momentum_for(ctx.focus).clamp(-1.0, 1.0),
            map_side: self.map_signal(ctx, round.number),
            historical: historical.signal(),
            round_type: round_type_signal(round.round_type),
        }
    }

    pub fn forecast(
        &self,
        state: &GameState,
        round: &Round,
        ctx: &MatchContext,
        historical: &HistoricalSignal,
    ) -> RoundForecast {
        let s = self.signals(state, round, ctx, historical);
        let parts = [
            ("economy", s.economy, W_ECONOMY),
            ("momentum", s.momentum, W_MOMENTUM),
            ("map_side", s.map_side, W_MAP_SIDE),
            ("historical", s.historical, W_HISTORICAL),
            ("round_type", s.round_type, W_ROUND_TYPE),
        ];
        RoundForecast {
            probability: combine(&s),
            factors: parts
                .iter()
                .map(|&(name, signal, weight)| FactorContribution {
                    name,
                    signal,
                    weight,
                    contribution: ADJUSTMENT_BUDGET * weight * signal,
                })
                .collect(),
        }
    }

    /// Win probability of the focus side for `round`, looking up similar scenarios keyed on
    /// the round's recorded type and economy differential.
    pub fn probability(
        &self,
        state: &GameState,
        round: &Round,
        ctx: &MatchContext,
        scenarios: &[HistoricalScenario],
    ) -> f64 {
        let historical =
            historical_signal(scenarios, round.round_type, round.economy_diff(ctx.focus));
        combine(&self.signals(state, round, ctx, &historical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Game;

    fn ctx() -> MatchContext {
        MatchContext {
            match_id: "m".to_string(),
            side_a: "A".to_string(),
            side_b: "B".to_string(),
            game: Game::Valorant,
            map: Some("Ascent".to_string()),
            focus: Side::A,
        }
    }

    fn round(round_type: RoundType) -> Round {
        Round {
            number: 5,
            winner: Side::A,
            round_type,
            economy_a: 20_000,
            economy_b: 20_000,
        }
    }

    #[test]
    fn neutral_state_is_coin_flip() {
        let model = RoundOutcomeModel::default();
        let state = GameState::opening(20_000, 20_000);
        let p = model.probability(&state, &round(RoundType::Force), &ctx(), &[]);
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn saturated_factors_stay_inside_clamp() {
        let s = FactorSignals {
            economy: 1.0,
            momentum: 1.0,
            map_side: 1.0,
            historical: 1.0,
            round_type: 1.0,
        };
        assert!((combine(&s) - MAX_ROUND_PROB).abs() < 1e-12);
        let s = FactorSignals {
            economy: -1.0,
            momentum: -1.0,
            map_side: -1.0,
            historical: -1.0,
            round_type: -1.0,
        };
        assert!((combine(&s) - MIN_ROUND_PROB).abs() < 1e-12);
    }

    #[test]
    fn round_type_moves_probability_both_ways() {
        let model = RoundOutcomeModel::default();
        let state = GameState::opening(20_000, 20_000);
        let full = model.probability(&state, &round(RoundType::Full), &ctx(), &[]);
        let eco = model.probability(&state, &round(RoundType::Eco), &ctx(), &[]);
        assert!(full > 0.5 && eco < 0.5);
        assert!((full - 0.54).abs() < 1e-12);
    }

    #[test]
    fn forecast_contributions_add_up() {
        let model = RoundOutcomeModel::default();
        let mut state = GameState::opening(26_000, 18_000);
        state.momentum = 0.4;
        let neutral = HistoricalSignal::neutral();
        let f = model.forecast(&state, &round(RoundType::Full), &ctx(), &neutral);
        let total: f64 = f.factors.iter().map(|c| c.contribution).sum();
        assert!((f.probability - (0.5 + total)).abs() < 1e-12);
        assert_eq!(f.factors.len(), 5);
    }

    #[test]
    fn map_table_flips_at_half_and_for_side_b() {
        let table = MapSideTable::new(12).with_map("Ascent", 0.5);
        assert_eq!(table.signal(Some("ascent"), Side::A, 3), 0.5);
        assert_eq!(table.signal(Some("ascent"), Side::A, 15), -0.5);
        assert_eq!(table.signal(Some("ascent"), Side::B, 3), -0.5);
        assert_eq!(table.signal(Some("Bind"), Side::A, 3), 0.0);
        assert_eq!(table.signal(None, Side::A, 3), 0.0);
    }

    #[test]
    fn focus_b_sees_mirrored_economy() {
        let model = RoundOutcomeModel::default();
        let state = GameState::opening(30_000, 10_000);
        let mut c = ctx();
        let pa = model.probability(&state, &round(RoundType::Force), &c, &[]);
        c.focus = Side::B;
        let pb = model.probability(&state, &round(RoundType::Force), &c, &[]);
        assert!((pa + pb - 1.0).abs() < 1e-12);
    }
}
