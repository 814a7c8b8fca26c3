use std::sync::Arc;

use whatif_sim::config::EngineConfig;
use whatif_sim::engine::{MODEL_VERSION, RetakeInput, WhatIfEngine};
use whatif_sim::error::EngineError;
use whatif_sim::retake::{RetakeScenario, TelemetryWindow};
use whatif_sim::scenarios::scenarios_from_history;
use whatif_sim::state::{DecisionAxis, Game, MatchHistory, QueryIntent};

fn sample() -> MatchHistory {
    serde_json::from_str(include_str!("fixtures/sample_match.json")).expect("valid fixture json")
}

fn engine() -> WhatIfEngine {
    let config = EngineConfig {
        trials: 1_500,
        seed: 2024,
        cache_capacity: 64,
        batch_threads: 2,
        ..EngineConfig::default()
    };
    WhatIfEngine::new(config).with_scenarios(scenarios_from_history(&sample()))
}

fn intent(round_number: u32, original: &str, hypothetical: &str) -> QueryIntent {
    QueryIntent {
        round_number,
        decision_axis: DecisionAxis::Economic,
        original_action: original.to_string(),
        hypothetical_action: hypothetical.to_string(),
        game: Game::Valorant,
    }
}

#[test]
fn prediction_is_well_formed() {
    let history = sample();
    let prediction = engine()
        .analyze(&history, &intent(8, "force buy", "save"), None)
        .expect("prediction");

    assert_eq!(prediction.match_id, history.context.match_id);
    assert_eq!(prediction.round_number, 8);
    assert!((0.0..=1.0).contains(&prediction.win_probability));
    assert!((0.0..=1.0).contains(&prediction.actual_win_probability));
    assert!((0.0..=1.0).contains(&prediction.confidence));
    let total: f64 = prediction.score_distribution.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(prediction.score_distribution.contains_key(&prediction.most_likely_score));
    assert!(!prediction.recommendation.is_empty());
    assert!(!prediction.key_findings.is_empty());
    assert_eq!(prediction.model_version, MODEL_VERSION);
    assert_eq!(prediction.trials, 1_500);
    assert!(prediction.confidence <= prediction.validation.confidence);
}

#[test]
fn prediction_round_trips_through_json() {
    let history = sample();
    let prediction = engine()
        .predict(&history, &intent(5, "force buy", "save"), None)
        .expect("prediction");
    let json = prediction.to_json_pretty().expect("serialize");
    let back: whatif_sim::prediction::Prediction = serde_json::from_str(&json).expect("parse");
    assert_eq!(back.match_id, prediction.match_id);
    assert_eq!(back.most_likely_score, prediction.most_likely_score);
    assert_eq!(back.key_findings, prediction.key_findings);
    assert_eq!(back.validation.is_valid, prediction.validation.is_valid);
    assert_eq!(back.seed, prediction.seed);
}

#[test]
fn repeated_question_is_served_from_cache() {
    let history = sample();
    let engine = engine();
    let q = intent(10, "force buy", "save");
    let first = engine.analyze(&history, &q, None).expect("first");
    let second = engine.analyze(&history, &q, None).expect("second");
    assert!(Arc::ptr_eq(&first, &second));
    let stats = engine.cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn changed_history_is_not_served_stale() {
    let mut history = sample();
    let engine = engine();
    let q = intent(10, "force buy", "save");
    let first = engine.analyze(&history, &q, None).expect("first");
    history.rounds[15].economy_a += 5_000;
    let second = engine.analyze(&history, &q, None).expect("second");
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn invalid_rounds_and_games_are_rejected() {
    let history = sample();
    let engine = engine();
    for round in [0, 25] {
        let err = engine
            .analyze(&history, &intent(round, "force buy", "save"), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange { .. }));
    }
    let mut cs2 = intent(3, "force buy", "save");
    cs2.game = Game::Cs2;
    assert!(matches!(
        engine.analyze(&history, &cs2, None).unwrap_err(),
        EngineError::InvalidIntent(_)
    ));
    assert!(matches!(
        engine
            .analyze(&history, &intent(3, " ", "save"), None)
            .unwrap_err(),
        EngineError::InvalidIntent(_)
    ));
    assert!(engine.cache().is_empty());
}

#[test]
fn unrecognized_action_is_a_warning() {
    let history = sample();
    let prediction = engine()
        .predict(&history, &intent(6, "full buy", "dance on site"), None)
        .expect("prediction");
    assert!(prediction.warnings.iter().any(|w| matches!(
        w,
        whatif_sim::error::Degradation::UnrecognizedAction { .. }
    )));
    assert!(prediction.confidence < prediction.validation.confidence);
}

#[test]
fn retake_snapshot_drives_both_branches() {
    let history = sample();
    let retake = RetakeInput {
        scenario: RetakeScenario {
            defenders: 3,
            attackers: 5,
            site: "B".to_string(),
            site_control: 0.8,
            seconds_remaining: 10.0,
            defenders_state: Vec::new(),
        },
        telemetry: TelemetryWindow {
            team_bank: Some(6_000),
            ..TelemetryWindow::default()
        },
    };
    let q = QueryIntent {
        decision_axis: DecisionAxis::Objective,
        ..intent(16, "retake", "save")
    };
    let prediction = engine()
        .predict(&history, &q, Some(&retake))
        .expect("prediction");
    assert!((0.0..=1.0).contains(&prediction.win_probability));
    assert!((0.0..=1.0).contains(&prediction.actual_win_probability));
    assert!(
        prediction
            .key_findings
            .iter()
            .any(|f| f.starts_with("3v5 retake converts") && f.ends_with("(model call: save)"))
    );
}

#[test]
fn whole_match_batch_covers_every_round() {
    let history = sample();
    let engine = engine();
    let entries = engine.analyze_match(&history);
    assert_eq!(entries.len(), history.rounds.len());
    for (idx, entry) in entries.iter().enumerate() {
        assert_eq!(entry.intent.round_number, idx as u32 + 1);
        let prediction = entry.prediction.as_ref().expect("round prediction");
        assert!((0.0..=1.0).contains(&prediction.win_probability));
    }
    assert_eq!(engine.cache().len(), history.rounds.len());
}

#[test]
fn duplicate_questions_in_a_batch_share_one_prediction() {
    let history = sample();
    let engine = WhatIfEngine::new(EngineConfig {
        trials: 1_000,
        seed: 7,
        batch_threads: 4,
        ..EngineConfig::default()
    });
    let repeated = intent(8, "force buy", "save");
    let other = intent(10, "force buy", "save");
    let mut intents = vec![repeated.clone(); 16];
    intents.insert(5, other.clone());
    intents.push(intent(30, "force buy", "save"));
    intents.push(intent(30, "force buy", "save"));

    let entries = engine.analyze_batch(&history, intents.clone());
    assert_eq!(entries.len(), intents.len());
    for (entry, asked) in entries.iter().zip(&intents) {
        assert_eq!(&entry.intent, asked);
    }

    let shared = entries[0].prediction.as_ref().expect("round 8");
    for entry in entries.iter().filter(|e| e.intent == repeated) {
        let prediction = entry.prediction.as_ref().expect("round 8");
        assert!(Arc::ptr_eq(prediction, shared));
    }
    let round_10 = entries[5].prediction.as_ref().expect("round 10");
    assert_eq!(round_10.round_number, 10);
    assert!(entries[entries.len() - 2..].iter().all(|e| matches!(
        e.prediction,
        Err(EngineError::OutOfRange { round: 30, .. })
    )));

    let stats = engine.cache().stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 0);
}
