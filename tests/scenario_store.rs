use whatif_sim::scenario_store::{ingest_histories, load_scenarios, open_in_memory, scenario_count};
use whatif_sim::scenarios::scenarios_from_history;
use whatif_sim::state::{Game, MatchHistory};

fn sample() -> MatchHistory {
    serde_json::from_str(include_str!("fixtures/sample_match.json")).expect("valid fixture json")
}

#[test]
fn ingest_writes_two_scenarios_per_round_and_is_idempotent() {
    let mut conn = open_in_memory().expect("db");
    let history = sample();

    let summary = ingest_histories(&mut conn, None, std::slice::from_ref(&history)).expect("ingest");
    assert_eq!(summary.matches_total, 1);
    assert_eq!(summary.matches_ingested, 1);
    assert_eq!(summary.scenarios_upserted, 48);
    assert!(summary.errors.is_empty());
    assert_eq!(scenario_count(&conn).expect("count"), 48);

    ingest_histories(&mut conn, None, std::slice::from_ref(&history)).expect("re-ingest");
    assert_eq!(scenario_count(&conn).expect("count"), 48);
}

#[test]
fn loaded_corpus_matches_derived_scenarios() {
    let mut conn = open_in_memory().expect("db");
    let history = sample();
    ingest_histories(&mut conn, None, std::slice::from_ref(&history)).expect("ingest");

    let loaded = load_scenarios(&conn, Some(Game::Valorant)).expect("load");
    let derived = scenarios_from_history(&history);
    assert_eq!(loaded.len(), derived.len());
    let wins = |s: &[whatif_sim::scenarios::HistoricalScenario]| s.iter().filter(|s| s.won).count();
    assert_eq!(wins(&loaded), wins(&derived));
    let diff_sum = |s: &[whatif_sim::scenarios::HistoricalScenario]| {
        s.iter().map(|s| s.economy_diff).sum::<i64>()
    };
    assert_eq!(diff_sum(&loaded), diff_sum(&derived));
    assert!(loaded.iter().all(|s| s.map.as_deref() == Some("Ascent")));

    assert!(load_scenarios(&conn, Some(Game::Cs2)).expect("load cs2").is_empty());
    assert_eq!(load_scenarios(&conn, None).expect("load all").len(), 48);
}

#[test]
fn bad_histories_are_reported_and_skipped() {
    let mut conn = open_in_memory().expect("db");
    let history = sample();
    let mut anonymous = history.clone();
    anonymous.context.match_id = "  ".to_string();
    let mut empty = history.clone();
    empty.context.match_id = "no-rounds".to_string();
    empty.rounds.clear();

    let summary = ingest_histories(
        &mut conn,
        None,
        &[history.clone(), history, anonymous, empty],
    )
    .expect("ingest");
    assert_eq!(summary.matches_total, 4);
    assert_eq!(summary.matches_ingested, 1);
    assert_eq!(summary.errors.len(), 3);

    assert!(ingest_histories(&mut conn, None, &[]).is_err());
}
