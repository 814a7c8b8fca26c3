//! Independent sanity checks over a finished comparison.
//!
//! The validator only scores; it never changes the probabilities it is given and it never
//! fails. A failing check still counts toward the blend, at half of its sub-confidence.

use serde::{Deserialize, Serialize};

pub const W_HISTORICAL: f64 = 0.4;
pub const W_AGREEMENT: f64 = 0.3;
pub const W_RULES: f64 = 0.3;
pub const VALID_THRESHOLD: f64 = 0.6;

const MAX_HISTORICAL_SWING: f64 = 0.4;
const MAX_AGREEMENT_SWING: f64 = 0.5;
const OVERCONFIDENT_LOW: f64 = 0.1;
const OVERCONFIDENT_HIGH: f64 = 0.9;
const MIN_PROB_SUM: f64 = 0.5;
const MAX_PROB_SUM: f64 = 1.5;
const FAILED_CHECK_SCALE: f64 = 0.5;
const THIN_HISTORY_FLOOR: f64 = 0.5;
const FULL_TRIALS: f64 = 1_000.0;

const FAVORABLE_WORDS: &[&str] = &["better", "superior"];
const UNFAVORABLE_WORDS: &[&str] = &["worse", "inferior"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    pub confidence: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub historical_consistency: CheckResult,
    pub model_agreement: CheckResult,
    pub rule_sanity: CheckResult,
    pub confidence: f64,
    pub is_valid: bool,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn all_passed(&self) -> bool {
        self.historical_consistency.passed && self.model_agreement.passed && self.rule_sanity.passed
    }
}

/// Extra evidence about how the probabilities were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationContext {
    pub comparable_scenarios: Option<usize>,
    pub required_scenarios: usize,
    pub trials: Option<u32>,
}

pub fn validate(actual: f64, hypothetical: f64, recommendation: &str) -> ValidationResult {
    validate_with_context(actual, hypothetical, recommendation, &ValidationContext::default())
}

pub fn validate_with_context(
    actual: f64,
    hypothetical: f64,
    recommendation: &str,
    ctx: &ValidationContext,
) -> ValidationResult {
    let historical = historical_consistency(actual, hypothetical, ctx);
    let agreement = model_agreement(actual, hypothetical, ctx);
    let rules = rule_sanity(actual, hypothetical, recommendation);

    let confidence = (W_HISTORICAL * effective(&historical)
        + W_AGREEMENT * effective(&agreement)
        + W_RULES * effective(&rules))
    .clamp(0.0, 1.0);

    let mut warnings = Vec::new();
    for (name, check) in [
        ("historical consistency", &historical),
        ("model agreement", &agreement),
        ("rule-based sanity", &rules),
    ] {
        if !check.passed {
            warnings.push(format!("{name} check failed: {}", check.explanation));
        }
    }
    if confidence < VALID_THRESHOLD {
        log::warn!("prediction validated with low confidence {confidence:.2}");
        warnings.push(format!("overall confidence {confidence:.2} is below {VALID_THRESHOLD}"));
    }

    ValidationResult {
        historical_consistency: historical,
        model_agreement: agreement,
        rule_sanity: rules,
        confidence,
        is_valid: confidence >= VALID_THRESHOLD,
        warnings,
    }
}

fn effective(check: &CheckResult) -> f64 {
    if check.passed {
        check.confidence
    } else {
        check.confidence * FAILED_CHECK_SCALE
    }
}

fn in_unit(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

fn swing(actual: f64, hypothetical: f64) -> f64 {
    let s = (hypothetical - actual).abs();
    if s.is_nan() { 1.0 } else { s }
}

fn historical_consistency(actual: f64, hypothetical: f64, ctx: &ValidationContext) -> CheckResult {
    if !in_unit(actual) || !in_unit(hypothetical) {
        return CheckResult {
            passed: false,
            confidence: 0.1,
            explanation: format!(
                "probabilities must lie in [0, 1] (actual {actual}, hypothetical {hypothetical})"
            ),
        };
    }

    let s = swing(actual, hypothetical);
    let mut confidence = (1.0 - s).clamp(0.0, 1.0);
    let mut notes = Vec::new();

    if let Some(comparable) = ctx.comparable_scenarios {
        let required = ctx.required_scenarios.max(1);
        if comparable < required {
            let scale = (comparable as f64 / required as f64).max(THIN_HISTORY_FLOOR);
            confidence *= scale;
            notes.push(format!("{comparable}/{required} comparable historical scenarios"));
        }
    }

    let passed = s <= MAX_HISTORICAL_SWING;
    let mut explanation = if passed {
        format!("swing of {:.1} points is within historical norms", s * 100.0)
    } else {
        format!(
            "swing of {:.1} points exceeds the {:.0}-point historical ceiling",
            s * 100.0,
            MAX_HISTORICAL_SWING * 100.0
        )
    };
    if !notes.is_empty() {
        explanation.push_str(&format!(" ({})", notes.join(", ")));
    }

    CheckResult {
        passed,
        confidence,
        explanation,
    }
}

fn model_agreement(actual: f64, hypothetical: f64, ctx: &ValidationContext) -> CheckResult {
    let s = swing(actual, hypothetical);
    let overconfident = !(hypothetical > OVERCONFIDENT_LOW && hypothetical < OVERCONFIDENT_HIGH);

    let mut confidence = (1.0 - s).clamp(0.0, 1.0);
    if overconfident {
        confidence *= 0.6;
    }
    if let Some(trials) = ctx.trials {
        // Few trials means the two estimates carry visible sampling noise.
        confidence *= (0.5 + 0.5 * (trials as f64 / FULL_TRIALS)).min(1.0);
    }

    let passed = s <= MAX_AGREEMENT_SWING && !overconfident;
    let explanation = if s > MAX_AGREEMENT_SWING {
        format!("estimates disagree by {:.1} points", s * 100.0)
    } else if overconfident {
        format!(
            "hypothetical probability {:.3} is outside ({OVERCONFIDENT_LOW}, {OVERCONFIDENT_HIGH})",
            hypothetical
        )
    } else {
        "actual and hypothetical estimates agree in magnitude".to_string()
    };

    CheckResult {
        passed,
        confidence,
        explanation,
    }
}

fn rule_sanity(actual: f64, hypothetical: f64, recommendation: &str) -> CheckResult {
    let sum = actual + hypothetical;
    let sum_ok = (MIN_PROB_SUM..=MAX_PROB_SUM).contains(&sum);

    let text = recommendation.to_ascii_lowercase();
    let claims_better = FAVORABLE_WORDS.iter().any(|w| text.contains(w));
    let claims_worse = UNFAVORABLE_WORDS.iter().any(|w| text.contains(w));
    let delta = hypothetical - actual;
    let direction_ok = !(claims_better && delta < 0.0) && !(claims_worse && delta > 0.0);

    let mut confidence: f64 = 0.9;
    if !sum_ok {
        confidence -= 0.3;
    }
    if claims_better || claims_worse {
        confidence -= 0.1;
    }

    let passed = sum_ok && direction_ok;
    let explanation = if !sum_ok {
        format!("probability sum {sum:.2} is outside [{MIN_PROB_SUM}, {MAX_PROB_SUM}]")
    } else if !direction_ok {
        format!("recommendation wording contradicts a {:+.1}-point delta", delta * 100.0)
    } else {
        "recommendation wording matches the probability delta".to_string()
    };

    CheckResult {
        passed,
        confidence: confidence.clamp(0.0, 1.0),
        explanation,
    }
}
