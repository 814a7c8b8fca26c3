use serde::{Deserialize, Serialize};

use crate::error::Degradation;
use crate::state::{DecisionAxis, Game, Modification, RoundType};

/// Team-level economy constants (five players' worth of credits).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomyRules {
    pub win_bonus: i64,
    pub loss_bonus: i64,
    pub full_buy_cost: i64,
    pub force_buy_cost: i64,
    pub eco_cost: i64,
    pub max_bank: i64,
    pub rounds_to_win: u32,
    /// Rounds per overtime half. Zero means overtime runs until a two-round lead.
    pub overtime_half: u32,
    /// Bank each side is reset to when an overtime half starts.
    pub overtime_bank: i64,
}

impl EconomyRules {
    pub fn for_game(game: Game) -> Self {
        match game {
            Game::Valorant => Self {
                win_bonus: 15_000,
                loss_bonus: 9_500,
                full_buy_cost: 19_500,
                force_buy_cost: 10_000,
                eco_cost: 2_000,
                max_bank: 45_000,
                rounds_to_win: 13,
                overtime_half: 0,
                overtime_bank: 25_000,
            },
            Game::Cs2 => Self {
                win_bonus: 16_250,
                loss_bonus: 7_000,
                full_buy_cost: 23_500,
                force_buy_cost: 12_500,
                eco_cost: 2_500,
                max_bank: 80_000,
                rounds_to_win: 13,
                overtime_half: 3,
                overtime_bank: 50_000,
            },
        }
    }

    pub fn spend(&self, round_type: RoundType) -> i64 {
        match round_type {
            RoundType::Full => self.full_buy_cost,
            RoundType::Force => self.force_buy_cost,
            RoundType::Eco | RoundType::Pistol => self.eco_cost,
        }
    }

    /// Rounds in one regulation half.
    pub fn half_length(&self) -> u32 {
        self.rounds_to_win.saturating_sub(1)
    }

    /// First round of the second half, played as a pistol round.
    pub fn second_half_pistol(&self) -> u32 {
        self.half_length() + 1
    }

    /// True when `round_number` opens an overtime half and banks reset to `overtime_bank`.
    pub fn resets_overtime_bank(&self, round_number: u32) -> bool {
        let regulation = 2 * self.half_length();
        if round_number <= regulation {
            return false;
        }
        self.overtime_half == 0 || (round_number - regulation - 1) % self.overtime_half == 0
    }

    /// Whether a `[side A, side B]` score ends the match.
    ///
    /// Regulation ends when a side reaches `rounds_to_win` before the other reaches the last
    /// regulation round. From there, each overtime block of `2 * overtime_half` rounds is won by
    /// the first side to take `overtime_half + 1` of it; with no overtime halves the match runs
    /// until one side leads by two.
    pub fn is_decided(&self, score: [u32; 2]) -> bool {
        let (hi, lo) = (score[0].max(score[1]), score[0].min(score[1]));
        if self.rounds_to_win == 0 || hi < self.rounds_to_win {
            return false;
        }
        let tied_at = self.half_length();
        if lo < tied_at {
            return true;
        }
        if self.overtime_half == 0 {
            return hi - lo >= 2;
        }
        let block = (lo - tied_at) / self.overtime_half;
        hi > tied_at + self.overtime_half * (block + 1)
    }

    /// Buy a side makes with `bank` when no recorded decision exists.
    pub fn affordable(&self, bank: i64) -> RoundType {
        if bank >= self.full_buy_cost {
            RoundType::Full
        } else if bank >= self.force_buy_cost {
            RoundType::Force
        } else {
            RoundType::Eco
        }
    }

    /// What that buy costs: everything in the bank, up to a full buy.
    pub fn affordable_spend(&self, bank: i64) -> i64 {
        bank.clamp(0, self.full_buy_cost)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Save,
    ForceBuy,
    FullBuy,
    Retake,
    Aggressive,
    Passive,
    Other,
}

impl ActionKind {
    /// Keyword classification of a free-text action label.
    pub fn classify(label: &str) -> ActionKind {
        let lower = label.trim().to_ascii_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(&["retake", "re-take"]) {
            ActionKind::Retake
        } else if has(&["save", "eco", "saving"]) {
            ActionKind::Save
        } else if has(&["force"]) {
            ActionKind::ForceBuy
        } else if has(&["full buy", "full-buy", "fullbuy", "buy"]) {
            ActionKind::FullBuy
        } else if has(&["push", "rush", "execute", "peek", "aggress", "attack", "plant"]) {
            ActionKind::Aggressive
        } else if has(&["hold", "rotate", "wait", "stack", "fall back", "passive", "defend"]) {
            ActionKind::Passive
        } else {
            ActionKind::Other
        }
    }
}

/// State change a modification applies to the focus side at the modification round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModificationDelta {
    pub economy: i64,
    pub momentum: f64,
    pub round_type: Option<RoundType>,
    pub degradations: Vec<Degradation>,
}

const TACTICAL_MOMENTUM_STEP: f64 = 0.05;

impl ModificationDelta {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_modification(modification: &Modification, rules: &EconomyRules) -> Self {
        let kind = ActionKind::classify(&modification.hypothetical_action);
        let mut delta = ModificationDelta::none();

        match modification.axis {
            DecisionAxis::Economic => match kind {
                ActionKind::Save => {
                    delta.economy = rules.loss_bonus;
                    delta.round_type = Some(RoundType::Eco);
                }
                ActionKind::ForceBuy => {
                    delta.economy = -rules.force_buy_cost;
                    delta.round_type = Some(RoundType::Force);
                }
                ActionKind::FullBuy => {
                    delta.economy = -rules.full_buy_cost;
                    delta.round_type = Some(RoundType::Full);
                }
                _ => delta.degradations.push(Degradation::UnrecognizedAction {
                    label: modification.hypothetical_action.clone(),
                }),
            },
            DecisionAxis::Tactical | DecisionAxis::Objective => match kind {
                ActionKind::Aggressive | ActionKind::Retake => {
                    delta.momentum = TACTICAL_MOMENTUM_STEP;
                }
                ActionKind::Passive | ActionKind::Save => {
                    delta.momentum = -TACTICAL_MOMENTUM_STEP;
                }
                _ => delta.degradations.push(Degradation::UnrecognizedAction {
                    label: modification.hypothetical_action.clone(),
                }),
            },
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_labels() {
        assert_eq!(ActionKind::classify("Save"), ActionKind::Save);
        assert_eq!(ActionKind::classify("force buy"), ActionKind::ForceBuy);
        assert_eq!(ActionKind::classify("Full buy"), ActionKind::FullBuy);
        assert_eq!(ActionKind::classify("retake B site"), ActionKind::Retake);
        assert_eq!(ActionKind::classify("rush A"), ActionKind::Aggressive);
        assert_eq!(ActionKind::classify("hold mid"), ActionKind::Passive);
        assert_eq!(ActionKind::classify("dance"), ActionKind::Other);
    }

    #[test]
    fn economic_save_credits_loss_bonus() {
        let rules = Game::Valorant.rules();
        let m = Modification::new(3, DecisionAxis::Economic, "force buy", "save");
        let delta = ModificationDelta::for_modification(&m, &rules);
        assert_eq!(delta.economy, rules.loss_bonus);
        assert_eq!(delta.round_type, Some(RoundType::Eco));
        assert!(delta.degradations.is_empty());
    }

    #[test]
    fn unknown_label_is_recorded_not_fatal() {
        let rules = Game::Cs2.rules();
        let m = Modification::new(3, DecisionAxis::Tactical, "hold", "dance");
        let delta = ModificationDelta::for_modification(&m, &rules);
        assert_eq!(delta.economy, 0);
        assert_eq!(delta.degradations.len(), 1);
    }

    #[test]
    fn regulation_and_overtime_endings() {
        let val = Game::Valorant.rules();
        assert!(val.is_decided([13, 11]));
        assert!(val.is_decided([3, 13]));
        assert!(!val.is_decided([12, 12]));
        assert!(!val.is_decided([13, 12]));
        assert!(val.is_decided([14, 12]));
        assert!(!val.is_decided([15, 15]));
        assert!(val.is_decided([15, 17]));

        let cs = Game::Cs2.rules();
        assert!(cs.is_decided([13, 5]));
        assert!(!cs.is_decided([14, 12]));
        assert!(!cs.is_decided([15, 13]));
        assert!(cs.is_decided([16, 14]));
        assert!(cs.is_decided([13, 16]));
        assert!(!cs.is_decided([15, 15]));
        assert!(!cs.is_decided([18, 16]));
        assert!(cs.is_decided([19, 17]));
    }

    #[test]
    fn overtime_banks_reset_per_half() {
        let val = Game::Valorant.rules();
        assert!(!val.resets_overtime_bank(24));
        assert!(val.resets_overtime_bank(25));
        assert!(val.resets_overtime_bank(26));

        let cs = Game::Cs2.rules();
        assert!(cs.resets_overtime_bank(25));
        assert!(!cs.resets_overtime_bank(26));
        assert!(!cs.resets_overtime_bank(27));
        assert!(cs.resets_overtime_bank(28));
        assert_eq!(cs.second_half_pistol(), 13);
    }

    #[test]
    fn affordable_buy_tracks_bank() {
        let rules = Game::Valorant.rules();
        assert_eq!(rules.affordable(30_000), RoundType::Full);
        assert_eq!(rules.affordable(12_000), RoundType::Force);
        assert_eq!(rules.affordable(3_000), RoundType::Eco);
        assert_eq!(rules.affordable_spend(30_000), rules.full_buy_cost);
        assert_eq!(rules.affordable_spend(3_000), 3_000);
    }
}
