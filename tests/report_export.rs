use whatif_sim::config::EngineConfig;
use whatif_sim::engine::WhatIfEngine;
use whatif_sim::report_export::export_match_report;
use whatif_sim::state::MatchHistory;

fn sample() -> MatchHistory {
    serde_json::from_str(include_str!("fixtures/sample_match.json")).expect("valid fixture json")
}

#[test]
fn workbook_has_a_row_per_analyzed_round() {
    let history = sample();
    let engine = WhatIfEngine::new(EngineConfig {
        trials: 200,
        batch_threads: 2,
        ..EngineConfig::default()
    });
    let entries = engine.analyze_match(&history);

    let path = std::env::temp_dir().join(format!("whatif_report_{}.xlsx", std::process::id()));
    let report = export_match_report(&path, &history, &entries).expect("export");
    assert_eq!(report.rounds, history.rounds.len());
    assert!(report.errors.is_empty());
    assert!(report.distribution_rows >= report.rounds);
    assert!(report.findings >= report.rounds);
    assert!(path.exists());
    let _ = std::fs::remove_file(&path);
}
