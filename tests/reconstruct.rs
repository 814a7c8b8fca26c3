use whatif_sim::error::EngineError;
use whatif_sim::reconstruct::reconstruct;
use whatif_sim::state::{Game, MatchHistory, RoundType, Side};

fn sample() -> MatchHistory {
    serde_json::from_str(include_str!("fixtures/sample_match.json")).expect("valid fixture json")
}

#[test]
fn fixture_loads_as_a_finished_match() {
    let history = sample();
    assert_eq!(history.context.game, Game::Valorant);
    assert_eq!(history.rounds.len(), 24);
    assert_eq!(history.final_score(), (13, 11));
    assert_eq!(history.actual_round_diff(), 2);
    assert_eq!(history.rounds[12].round_type, RoundType::Pistol);
}

#[test]
fn first_round_reconstructs_to_opening_state() {
    let history = sample();
    let rules = Game::Valorant.rules();
    let (state, round) = reconstruct(&history.rounds, 1, &rules).expect("round 1");
    assert_eq!(state.score, [0, 0]);
    assert_eq!(state.economy, [4_000, 4_000]);
    assert_eq!(state.momentum, 0.0);
    assert_eq!(round.number, 1);
}

#[test]
fn score_before_round_matches_recorded_winners() {
    let history = sample();
    let rules = Game::Valorant.rules();
    for target in 1..=history.rounds.len() as u32 {
        let (state, _) = reconstruct(&history.rounds, target, &rules).expect("in range");
        let before = &history.rounds[..(target - 1) as usize];
        let a = before.iter().filter(|r| r.winner == Side::A).count() as u32;
        assert_eq!(state.score, [a, target - 1 - a], "round {target}");
        assert_eq!(state.next_round, target);
        assert!((-1.0..=1.0).contains(&state.momentum));
    }
}

#[test]
fn replay_projects_economy_from_previous_round() {
    let history = sample();
    let rules = Game::Valorant.rules();
    // Round 2: A won a force round from 17000 / 11500.
    let (state, _) = reconstruct(&history.rounds, 3, &rules).expect("round 3");
    assert_eq!(state.economy, [17_000 - 10_000 + 15_000, 11_500 - 10_000 + 9_500]);
}

#[test]
fn out_of_range_targets_fail_without_partial_state() {
    let history = sample();
    let rules = Game::Valorant.rules();
    for target in [0, 25, 100] {
        let err = reconstruct(&history.rounds, target, &rules).unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange { round, len: 24 } if round == target));
    }
    let err = reconstruct(&[], 1, &rules).unwrap_err();
    assert!(matches!(err, EngineError::OutOfRange { len: 0, .. }));
}

#[test]
fn reconstruction_leaves_history_untouched() {
    let history = sample();
    let before = history.clone();
    let rules = Game::Valorant.rules();
    for target in [1, 7, 13, 24] {
        reconstruct(&history.rounds, target, &rules).expect("in range");
    }
    assert_eq!(history, before);
}
