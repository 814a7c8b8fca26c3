use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Degradation;
use crate::validator::ValidationResult;

pub const CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub confidence_level: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// What the presentation layer receives. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub match_id: String,
    pub round_number: u32,
    pub original_action: String,
    pub hypothetical_action: String,
    pub win_probability: f64,
    pub actual_win_probability: f64,
    pub most_likely_score: String,
    pub score_distribution: BTreeMap<String, f64>,
    pub confidence_interval: ConfidenceInterval,
    pub confidence: f64,
    pub key_findings: Vec<String>,
    pub recommendation: String,
    pub validation: ValidationResult,
    pub warnings: Vec<Degradation>,
    pub trials: u32,
    pub seed: u64,
    pub model_version: String,
}

impl Prediction {
    pub fn probability_delta(&self) -> f64 {
        self.win_probability - self.actual_win_probability
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
