use std::fmt;

use serde::{Deserialize, Serialize};

use crate::economy::EconomyRules;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Side {
    #[default]
    A,
    B,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    fn idx(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundType {
    Full,
    Eco,
    Force,
    Pistol,
}

impl RoundType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoundType::Full => "full",
            RoundType::Eco => "eco",
            RoundType::Force => "force",
            RoundType::Pistol => "pistol",
        }
    }

    pub fn parse(raw: &str) -> Option<RoundType> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" | "full_buy" | "full-buy" => Some(RoundType::Full),
            "eco" | "save" => Some(RoundType::Eco),
            "force" | "force_buy" | "force-buy" => Some(RoundType::Force),
            "pistol" => Some(RoundType::Pistol),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Game {
    Valorant,
    Cs2,
}

impl Game {
    pub fn as_str(self) -> &'static str {
        match self {
            Game::Valorant => "valorant",
            Game::Cs2 => "cs2",
        }
    }

    pub fn parse(raw: &str) -> Option<Game> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "valorant" | "val" => Some(Game::Valorant),
            "cs2" | "cs" | "csgo" | "counter-strike" => Some(Game::Cs2),
            _ => None,
        }
    }

    pub fn rules(self) -> EconomyRules {
        EconomyRules::for_game(self)
    }
}

/// One historical round. Never mutated after ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub number: u32,
    pub winner: Side,
    pub round_type: RoundType,
    pub economy_a: i64,
    pub economy_b: i64,
}

impl Round {
    pub fn economy(&self, side: Side) -> i64 {
        match side {
            Side::A => self.economy_a,
            Side::B => self.economy_b,
        }
    }

    /// Recorded starting economy differential from `side`'s perspective.
    pub fn economy_diff(&self, side: Side) -> i64 {
        self.economy(side) - self.economy(side.opponent())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    pub match_id: String,
    pub side_a: String,
    pub side_b: String,
    pub game: Game,
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub focus: Side,
}

impl MatchContext {
    pub fn side_name(&self, side: Side) -> &str {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistory {
    pub context: MatchContext,
    pub rounds: Vec<Round>,
}

impl MatchHistory {
    pub fn final_score(&self) -> (u32, u32) {
        let a = self.rounds.iter().filter(|r| r.winner == Side::A).count() as u32;
        (a, self.rounds.len() as u32 - a)
    }

    /// Round differential the focus side actually finished with.
    pub fn actual_round_diff(&self) -> i32 {
        let (a, b) = self.final_score();
        let diff = a as i32 - b as i32;
        match self.context.focus {
            Side::A => diff,
            Side::B => -diff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAxis {
    Economic,
    Tactical,
    Objective,
}

/// Structured output of the natural-language front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub round_number: u32,
    pub decision_axis: DecisionAxis,
    pub original_action: String,
    pub hypothetical_action: String,
    pub game: Game,
}

/// The "what if" being evaluated. Built once from a [`QueryIntent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub round_number: u32,
    pub axis: DecisionAxis,
    pub original_action: String,
    pub hypothetical_action: String,
}

impl Modification {
    pub fn new(
        round_number: u32,
        axis: DecisionAxis,
        original_action: impl Into<String>,
        hypothetical_action: impl Into<String>,
    ) -> Self {
        Self {
            round_number,
            axis,
            original_action: original_action.into(),
            hypothetical_action: hypothetical_action.into(),
        }
    }

    /// The modification that keeps what actually happened; used for the baseline run.
    pub fn as_played(&self) -> Self {
        Self {
            hypothetical_action: self.original_action.clone(),
            ..self.clone()
        }
    }
}

impl From<&QueryIntent> for Modification {
    fn from(intent: &QueryIntent) -> Self {
        Modification::new(
            intent.round_number,
            intent.decision_axis,
            intent.original_action.trim(),
            intent.hypothetical_action.trim(),
        )
    }
}

/// Mutable per-trial simulation state. Each trial owns its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub economy: [i64; 2],
    pub score: [u32; 2],
    // Positive values mean side A has been winning recently.
    pub momentum: f64,
    pub next_round: u32,
}

pub const MOMENTUM_DECAY: f64 = 0.7;

impl GameState {
    pub fn opening(economy_a: i64, economy_b: i64) -> Self {
        Self {
            economy: [economy_a, economy_b],
            score: [0, 0],
            momentum: 0.0,
            next_round: 1,
        }
    }

    pub fn economy(&self, side: Side) -> i64 {
        self.economy[side.idx()]
    }

    pub fn set_economy(&mut self, side: Side, value: i64) {
        self.economy[side.idx()] = value;
    }

    pub fn credit(&mut self, side: Side, amount: i64, rules: &EconomyRules) {
        let idx = side.idx();
        self.economy[idx] = (self.economy[idx] + amount).clamp(0, rules.max_bank);
    }

    pub fn score(&self, side: Side) -> u32 {
        self.score[side.idx()]
    }

    pub fn economy_diff(&self, side: Side) -> i64 {
        self.economy(side) - self.economy(side.opponent())
    }

    pub fn momentum_for(&self, side: Side) -> f64 {
        match side {
            Side::A => self.momentum,
            Side::B => -self.momentum,
        }
    }

    pub fn nudge_momentum(&mut self, side: Side, delta: f64) {
        let signed = match side {
            Side::A => delta,
            Side::B => -delta,
        };
        self.momentum = (self.momentum + signed).clamp(-1.0, 1.0);
    }

    /// Applies a finished round where both sides made the same buy.
    pub fn apply_result(&mut self, winner: Side, round_type: RoundType, rules: &EconomyRules) {
        let spend = rules.spend(round_type);
        self.settle(winner, [spend, spend], rules);
    }

    /// Applies a finished round: per-side spend (indexed A, B), fixed bonuses, score and
    /// momentum.
    pub fn settle(&mut self, winner: Side, spend: [i64; 2], rules: &EconomyRules) {
        for side in [Side::A, Side::B] {
            let bonus = if side == winner {
                rules.win_bonus
            } else {
                rules.loss_bonus
            };
            let idx = side.idx();
            let after_spend = (self.economy[idx] - spend[idx]).max(0);
            self.economy[idx] = (after_spend + bonus).clamp(0, rules.max_bank);
        }
        self.score[winner.idx()] += 1;

        let signal = match winner {
            Side::A => 1.0,
            Side::B => -1.0,
        };
        self.momentum =
            (MOMENTUM_DECAY * self.momentum + (1.0 - MOMENTUM_DECAY) * signal).clamp(-1.0, 1.0);
        self.next_round += 1;
    }

    pub fn is_decided(&self, rules: &EconomyRules) -> bool {
        rules.is_decided(self.score)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "before round {}: score {}-{}, economy {}/{}, momentum {:+.2}",
            self.next_round,
            self.score[0],
            self.score[1],
            self.economy[0],
            self.economy[1],
            self.momentum
        )
    }
}

pub fn score_key(a: u32, b: u32) -> String {
    format!("{a}-{b}")
}
