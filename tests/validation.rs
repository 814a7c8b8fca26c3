use proptest::prelude::*;

use whatif_sim::comparator::{FixedTemplates, RecommendationTemplates, TemplateArgs, Verdict};
use whatif_sim::validator::{VALID_THRESHOLD, ValidationContext, validate, validate_with_context};

fn args(actual: f64, hypothetical: f64) -> TemplateArgs<'static> {
    let a = (actual * 100.0).round() as i64;
    let h = (hypothetical * 100.0).round() as i64;
    TemplateArgs {
        original_action: "force buy",
        hypothetical_action: "save",
        actual_pct: a,
        hypothetical_pct: h,
        delta_pct: h - a,
    }
}

#[test]
fn fixed_templates_never_trip_the_wording_check() {
    for (a, h) in [(0.30, 0.60), (0.60, 0.30), (0.45, 0.55), (0.55, 0.45)] {
        let verdict = Verdict::from_delta(h - a);
        let text = FixedTemplates.render(verdict, &args(a, h));
        let result = validate(a, h, &text);
        assert!(result.rule_sanity.passed, "{verdict:?}: {text}");
    }
}

#[test]
fn wild_swing_is_flagged_but_still_scored() {
    let result = validate(0.15, 0.85, "save");
    assert!(!result.historical_consistency.passed);
    assert!(!result.model_agreement.passed);
    assert!(result.confidence > 0.0);
    assert!(!result.is_valid);
    assert!(result.confidence < VALID_THRESHOLD);
    assert!(result.warnings.len() >= 2);
}

#[test]
fn tiny_trial_counts_are_deweighted() {
    let ctx = |trials| ValidationContext {
        comparable_scenarios: Some(20),
        required_scenarios: 5,
        trials: Some(trials),
    };
    let few = validate_with_context(0.45, 0.55, "", &ctx(10));
    let many = validate_with_context(0.45, 0.55, "", &ctx(10_000));
    assert!(few.confidence < many.confidence);
}

proptest! {
    #[test]
    fn never_panics_and_stays_in_unit_range(
        a in prop_oneof![any::<f64>(), -2.0f64..=2.0],
        h in prop_oneof![any::<f64>(), -2.0f64..=2.0],
        text in ".{0,40}",
    ) {
        let result = validate(a, h, &text);
        prop_assert!((0.0..=1.0).contains(&result.confidence));
        prop_assert_eq!(result.is_valid, result.confidence >= VALID_THRESHOLD);
    }

    #[test]
    fn contradicting_wording_never_raises_confidence(a in 0.0f64..=1.0, h in 0.0f64..=1.0) {
        prop_assume!((h - a).abs() > 1e-6);
        let contradiction = if h > a { "the original call was superior, alternative worse" } else { "alternative is better" };
        let neutral = validate(a, h, "alternative compared");
        let wrong = validate(a, h, contradiction);
        prop_assert!(!wrong.rule_sanity.passed);
        prop_assert!(wrong.confidence <= neutral.confidence);
    }
}
