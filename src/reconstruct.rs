use crate::economy::EconomyRules;
use crate::error::{EngineError, Result};
use crate::state::{GameState, Round};

/// Checks that `target` addresses a round in `rounds`.
pub fn check_round_number(rounds: &[Round], target: u32) -> Result<()> {
    if rounds.is_empty() || target == 0 || target as usize > rounds.len() {
        return Err(EngineError::out_of_range(target, rounds.len()));
    }
    Ok(())
}

/// Replays rounds `1..target` and returns the state immediately before round `target`
/// together with that round's own record.
///
/// Each replayed round starts from its recorded economy; the outcome then applies the buy
/// spend and the fixed win/loss bonuses, so the returned economy is the model's projection
/// of what each side carries into `target`. The history is only borrowed.
pub fn reconstruct<'a>(
    rounds: &'a [Round],
    target: u32,
    rules: &EconomyRules,
) -> Result<(GameState, &'a Round)> {
    check_round_number(rounds, target)?;

    let first = &rounds[0];
    let mut state = GameState::opening(first.economy_a, first.economy_b);
    let target_idx = (target - 1) as usize;

    for round in &rounds[..target_idx] {
        state.economy = [round.economy_a, round.economy_b];
        state.apply_result(round.winner, round.round_type, rules);
    }
    Ok((state, &rounds[target_idx]))
}
