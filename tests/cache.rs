use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

use whatif_sim::cache::{CacheKey, PredictionCache};
use whatif_sim::error::EngineError;
use whatif_sim::prediction::{ConfidenceInterval, Prediction};
use whatif_sim::validator::validate;

fn key(match_id: &str, round_number: u32) -> CacheKey {
    CacheKey {
        match_id: match_id.to_string(),
        round_number,
        hypothetical_action: "save".to_string(),
        history_fingerprint: "00".to_string(),
    }
}

fn prediction(round_number: u32) -> Prediction {
    Prediction {
        match_id: "m".to_string(),
        round_number,
        original_action: "force buy".to_string(),
        hypothetical_action: "save".to_string(),
        win_probability: 0.5,
        actual_win_probability: 0.5,
        most_likely_score: "13-11".to_string(),
        score_distribution: BTreeMap::from([("13-11".to_string(), 1.0)]),
        confidence_interval: ConfidenceInterval {
            lower: 0.4,
            upper: 0.6,
            confidence_level: 0.95,
        },
        confidence: 0.8,
        key_findings: Vec::new(),
        recommendation: String::new(),
        validation: validate(0.5, 0.5, ""),
        warnings: Vec::new(),
        trials: 1,
        seed: 0,
        model_version: "test".to_string(),
    }
}

#[test]
fn concurrent_callers_share_one_computation() {
    let cache = Arc::new(PredictionCache::new(8));
    let computed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computed = Arc::clone(&computed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_compute(key("m", 4), || {
                        computed.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(prediction(4))
                    })
                    .expect("compute")
            })
        })
        .collect::<Vec<_>>();

    let results = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect::<Vec<_>>();
    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|p| Arc::ptr_eq(p, &results[0])));
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 7);
    assert_eq!(stats.entries, 1);
}

#[test]
fn least_recently_used_entry_is_evicted() {
    let cache = PredictionCache::new(2);
    cache.get_or_compute(key("m", 1), || Ok(prediction(1))).expect("1");
    cache.get_or_compute(key("m", 2), || Ok(prediction(2))).expect("2");
    assert!(cache.get(&key("m", 1)).is_some());

    cache.get_or_compute(key("m", 3), || Ok(prediction(3))).expect("3");
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&key("m", 1)).is_some());
    assert!(cache.get(&key("m", 2)).is_none());
    assert!(cache.get(&key("m", 3)).is_some());
}

#[test]
fn in_flight_slot_survives_eviction_pressure() {
    let cache = Arc::new(PredictionCache::new(1));
    let computed = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();

    let spawn_slow = |round: u32| {
        let cache = Arc::clone(&cache);
        let computed = Arc::clone(&computed);
        let started = started_tx.clone();
        thread::spawn(move || {
            cache
                .get_or_compute(key("m", round), || {
                    computed.fetch_add(1, Ordering::SeqCst);
                    started.send(round).expect("send");
                    thread::sleep(Duration::from_millis(300));
                    Ok(prediction(round))
                })
                .expect("compute")
        })
    };

    let first = spawn_slow(1);
    assert_eq!(started_rx.recv().expect("first started"), 1);
    let second = spawn_slow(2);
    assert_eq!(started_rx.recv().expect("second started"), 2);

    let joined = cache
        .get_or_compute(key("m", 1), || {
            computed.fetch_add(1, Ordering::SeqCst);
            Ok(prediction(1))
        })
        .expect("join first");
    let first = first.join().expect("thread");
    second.join().expect("thread");

    assert_eq!(computed.load(Ordering::SeqCst), 2);
    assert!(Arc::ptr_eq(&joined, &first));

    cache.get_or_compute(key("m", 3), || Ok(prediction(3))).expect("3");
    assert_eq!(cache.len(), 1);
}

#[test]
fn failures_are_not_cached() {
    let cache = PredictionCache::new(4);
    let err = cache
        .get_or_compute(key("m", 9), || {
            Err(EngineError::OutOfRange { round: 9, len: 5 })
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::OutOfRange { round: 9, .. }));
    assert!(cache.is_empty());

    let ok = cache
        .get_or_compute(key("m", 9), || Ok(prediction(9)))
        .expect("retry computes");
    assert_eq!(ok.round_number, 9);
    assert_eq!(cache.len(), 1);
}

#[test]
fn invalidate_drops_only_that_match() {
    let cache = PredictionCache::new(8);
    for round in 1..=3 {
        cache.get_or_compute(key("a", round), || Ok(prediction(round))).expect("a");
    }
    cache.get_or_compute(key("b", 1), || Ok(prediction(1))).expect("b");

    assert_eq!(cache.invalidate("a"), 3);
    assert_eq!(cache.invalidate("a"), 0);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&key("b", 1)).is_some());

    cache.clear();
    assert!(cache.is_empty());
}
