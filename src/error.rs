//! Error taxonomy for the what-if engine.
//!
//! Fatal conditions surface as [`EngineError`] and never carry a partial result.
//! Everything the engine can recover from is a [`Degradation`]: it is recorded on the
//! prediction and lowers the reported confidence instead of aborting the request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("round {round} is outside the match history (1..={len})")]
    OutOfRange { round: u32, len: usize },

    #[error("invalid query intent: {0}")]
    InvalidIntent(String),
}

impl EngineError {
    pub fn out_of_range(round: u32, len: usize) -> Self {
        EngineError::OutOfRange { round, len }
    }
}

/// Non-fatal conditions. The simulation proceeds and the validator deweights the result.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    #[error("only {comparable} comparable historical scenarios (wanted {required})")]
    InsufficientData { comparable: usize, required: usize },

    #[error("{stage} produced probability {value}, clamped into range")]
    InvalidProbability { stage: String, value: f64 },

    #[error("action label '{label}' is not recognized; no state delta applied")]
    UnrecognizedAction { label: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Clamps `value` into `[lo, hi]`, logging and recording a degradation when it escaped.
///
/// NaN is treated as an escape and mapped to the midpoint of the range.
pub(crate) fn guard_probability(
    stage: &str,
    value: f64,
    lo: f64,
    hi: f64,
    degradations: &mut Vec<Degradation>,
) -> f64 {
    if value.is_nan() || value < lo || value > hi {
        log::warn!("{stage}: probability {value} escaped [{lo}, {hi}]; clamping");
        degradations.push(Degradation::InvalidProbability {
            stage: stage.to_string(),
            value,
        });
        if value.is_nan() {
            return (lo + hi) / 2.0;
        }
        return value.clamp(lo, hi);
    }
    value
}
