//! Request orchestration: intent checks, the two simulation branches, the retake analyzer,
//! validation and the comparator, with results memoized per question.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, PredictionCache};
use crate::comparator::{FixedTemplates, RecommendationTemplates, compare};
use crate::config::EngineConfig;
use crate::economy::{ActionKind, ModificationDelta};
use crate::error::{Degradation, EngineError, Result};
use crate::monte_carlo::{Branch, MonteCarloSimulator, SimulationSummary};
use crate::prediction::Prediction;
use crate::reconstruct::check_round_number;
use crate::retake::{self, RetakeAnalysis, RetakeScenario, TelemetryWindow};
use crate::round_model::RoundOutcomeModel;
use crate::scenarios::HistoricalScenario;
use crate::state::{DecisionAxis, MatchHistory, Modification, QueryIntent, RoundType};
use crate::validator::{ValidationContext, validate_with_context};

pub const MODEL_VERSION: &str = concat!("whatif-sim/", env!("CARGO_PKG_VERSION"));

// Each recorded degradation scales the reported confidence by this factor.
const DEGRADATION_PENALTY: f64 = 0.9;
const MAX_SAMPLE_MOMENTS: usize = 3;

/// Mid-round snapshot for a retake-or-save question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetakeInput {
    pub scenario: RetakeScenario,
    #[serde(default)]
    pub telemetry: TelemetryWindow,
}

#[derive(Debug)]
pub struct BatchEntry {
    pub intent: QueryIntent,
    pub prediction: Result<Arc<Prediction>>,
}

pub struct WhatIfEngine {
    config: EngineConfig,
    simulator: MonteCarloSimulator,
    scenarios: Arc<Vec<HistoricalScenario>>,
    templates: Arc<dyn RecommendationTemplates>,
    cache: PredictionCache,
}

impl std::fmt::Debug for WhatIfEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatIfEngine")
            .field("config", &self.config)
            .field("scenarios", &self.scenarios.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl WhatIfEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            simulator: MonteCarloSimulator::new(RoundOutcomeModel::default(), config.simulation()),
            cache: PredictionCache::new(config.cache_capacity),
            scenarios: Arc::new(Vec::new()),
            templates: Arc::new(FixedTemplates),
            config,
        }
    }

    pub fn with_model(mut self, model: RoundOutcomeModel) -> Self {
        self.simulator = MonteCarloSimulator::new(model, self.config.simulation());
        self
    }

    /// Historical corpus used by the round model. Loaded once up front; never read from disk
    /// while trials run.
    pub fn with_scenarios(mut self, scenarios: Vec<HistoricalScenario>) -> Self {
        self.scenarios = Arc::new(scenarios);
        self.cache.clear();
        self
    }

    pub fn with_templates(mut self, templates: Arc<dyn RecommendationTemplates>) -> Self {
        self.templates = templates;
        self.cache.clear();
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    /// Answers one what-if question, reusing a memoized prediction when the same question
    /// was asked about the same history.
    pub fn analyze(
        &self,
        history: &MatchHistory,
        intent: &QueryIntent,
        retake: Option<&RetakeInput>,
    ) -> Result<Arc<Prediction>> {
        check_intent(history, intent)?;
        self.cache.get_or_compute(cache_key(history, intent, retake), || {
            self.predict(history, intent, retake)
        })
    }

    /// Uncached prediction.
    pub fn predict(
        &self,
        history: &MatchHistory,
        intent: &QueryIntent,
        retake: Option<&RetakeInput>,
    ) -> Result<Prediction> {
        check_intent(history, intent)?;
        let started = Instant::now();
        let ctx = &history.context;
        let rules = ctx.game.rules();
        let modification = Modification::from(intent);

        let analysis = match retake {
            Some(input) if retake::is_retake_decision(&modification) => Some(retake::analyze(
                &input.scenario,
                &input.telemetry,
                &rules,
            )),
            Some(_) => {
                log::debug!(
                    "retake snapshot ignored: '{}' vs '{}' is not a retake-or-save decision",
                    modification.original_action,
                    modification.hypothetical_action
                );
                None
            }
            None => None,
        };

        let (actual_branch, hypothetical_branch) = match (&analysis, retake) {
            (Some(analysis), Some(input)) => retake_branches(&modification, analysis, input),
            _ => (
                Branch::from_modification(&modification.as_played(), &rules),
                Branch::from_modification(&modification, &rules),
            ),
        };

        let scenarios = self
            .scenarios
            .iter()
            .filter(|s| s.game == ctx.game)
            .cloned()
            .collect::<Vec<_>>();

        let (actual, hypothetical) = rayon::join(
            || self.simulator.run(&history.rounds, ctx, &scenarios, &actual_branch),
            || self.simulator.run(&history.rounds, ctx, &scenarios, &hypothetical_branch),
        );
        let actual = actual?;
        let hypothetical = hypothetical?;

        let degradations = merge_degradations(&hypothetical, &actual);
        let comparison = compare(
            &actual,
            &hypothetical,
            &modification.original_action,
            &modification.hypothetical_action,
            analysis.as_ref(),
            &degradations,
            self.templates.as_ref(),
        );

        let validation = validate_with_context(
            actual.win_probability,
            hypothetical.win_probability,
            &comparison.recommendation,
            &ValidationContext {
                comparable_scenarios: Some(hypothetical.comparable_scenarios),
                required_scenarios: self.config.min_comparable_scenarios,
                trials: Some(hypothetical.trials),
            },
        );
        let confidence = (validation.confidence
            * DEGRADATION_PENALTY.powi(degradations.len() as i32))
        .clamp(0.0, 1.0);

        let mut key_findings = comparison.key_findings;
        key_findings.extend(
            hypothetical
                .sample
                .key_moments
                .iter()
                .take(MAX_SAMPLE_MOMENTS)
                .map(|m| format!("Sample run: {m}")),
        );

        log::debug!(
            "{} round {} '{}' -> '{}': {:.3} vs {:.3} in {:?}",
            ctx.match_id,
            intent.round_number,
            modification.original_action,
            modification.hypothetical_action,
            actual.win_probability,
            hypothetical.win_probability,
            started.elapsed()
        );

        Ok(Prediction {
            match_id: ctx.match_id.clone(),
            round_number: intent.round_number,
            original_action: modification.original_action.clone(),
            hypothetical_action: modification.hypothetical_action.clone(),
            win_probability: hypothetical.win_probability,
            actual_win_probability: actual.win_probability,
            most_likely_score: hypothetical.most_likely_score_key(),
            score_distribution: hypothetical.score_distribution.clone(),
            confidence_interval: hypothetical.confidence_interval,
            confidence,
            key_findings,
            recommendation: comparison.recommendation,
            validation,
            warnings: degradations,
            trials: hypothetical.trials,
            seed: hypothetical.seed,
            model_version: MODEL_VERSION.to_string(),
        })
    }

    /// Runs the default alternative for every round. Rounds are spread over a dedicated pool.
    pub fn analyze_match(&self, history: &MatchHistory) -> Vec<BatchEntry> {
        let intents = (1..=history.rounds.len() as u32)
            .filter_map(|round| default_intent(history, round))
            .collect::<Vec<_>>();
        self.analyze_batch(history, intents)
    }

    /// Analyzes every intent, in order. Identical questions share one computation.
    pub fn analyze_batch(&self, history: &MatchHistory, intents: Vec<QueryIntent>) -> Vec<BatchEntry> {
        let started = Instant::now();

        // Pool jobs must have distinct keys: a worker blocked inside one simulation can steal
        // another job, and a duplicate key would wait on the slot its own stack is filling.
        let mut distinct: Vec<&QueryIntent> = Vec::new();
        let mut index: HashMap<CacheKey, usize> = HashMap::new();
        let slots = intents
            .iter()
            .map(|intent| {
                *index
                    .entry(cache_key(history, intent, None))
                    .or_insert_with(|| {
                        distinct.push(intent);
                        distinct.len() - 1
                    })
            })
            .collect::<Vec<_>>();

        let results = with_batch_pool(self.config.batch_threads, || {
            distinct
                .par_iter()
                .map(|intent| {
                    let prediction = self.analyze(history, intent, None);
                    if let Err(err) = &prediction {
                        log::warn!("round {} analysis failed: {err}", intent.round_number);
                    }
                    prediction
                })
                .collect::<Vec<_>>()
        });

        let entries = intents
            .into_iter()
            .zip(slots)
            .map(|(intent, slot)| BatchEntry {
                intent,
                prediction: results[slot].clone(),
            })
            .collect::<Vec<_>>();
        log::info!(
            "analyzed {} rounds ({} distinct) of {} in {:?}",
            entries.len(),
            results.len(),
            history.context.match_id,
            started.elapsed()
        );
        entries
    }
}

fn cache_key(
    history: &MatchHistory,
    intent: &QueryIntent,
    retake: Option<&RetakeInput>,
) -> CacheKey {
    CacheKey::new(history, intent.round_number, &intent.hypothetical_action)
        .with_context(&(intent, retake))
}

/// The question a coach most often asks about a round: what if we had bought differently?
pub fn default_intent(history: &MatchHistory, round_number: u32) -> Option<QueryIntent> {
    let round = history.rounds.get(round_number.checked_sub(1)? as usize)?;
    let (original, hypothetical) = match round.round_type {
        RoundType::Full => ("full buy", "save"),
        RoundType::Force => ("force buy", "save"),
        RoundType::Eco => ("eco", "force buy"),
        RoundType::Pistol => ("pistol", "save"),
    };
    Some(QueryIntent {
        round_number,
        decision_axis: DecisionAxis::Economic,
        original_action: original.to_string(),
        hypothetical_action: hypothetical.to_string(),
        game: history.context.game,
    })
}

fn check_intent(history: &MatchHistory, intent: &QueryIntent) -> Result<()> {
    check_round_number(&history.rounds, intent.round_number)?;
    if intent.game != history.context.game {
        return Err(EngineError::InvalidIntent(format!(
            "query is about {} but match {} is {}",
            intent.game.as_str(),
            history.context.match_id,
            history.context.game.as_str()
        )));
    }
    if intent.original_action.trim().is_empty() || intent.hypothetical_action.trim().is_empty() {
        return Err(EngineError::InvalidIntent(
            "original and hypothetical actions must both be named".to_string(),
        ));
    }
    Ok(())
}

/// Retaking pins the modified round to the analyzer's conversion rate. Saving concedes the
/// round, banks the surviving loadouts and pins the next round to the post-save odds.
fn retake_branches(
    modification: &Modification,
    analysis: &RetakeAnalysis,
    input: &RetakeInput,
) -> (Branch, Branch) {
    let round = modification.round_number;
    let bank = input.telemetry.team_bank.unwrap_or(0).max(0);
    let save_delta = ModificationDelta {
        economy: (analysis.preserved_value - bank).max(0),
        momentum: analysis.save_impact.momentum_penalty,
        ..ModificationDelta::none()
    };

    let bare = |m: Modification| Branch {
        modification: m,
        delta: ModificationDelta::none(),
        overrides: Vec::new(),
    };
    let retake_branch =
        |m: Modification| bare(m).with_override(round, analysis.retake_success_probability);
    let save_branch = |m: Modification| {
        bare(m)
            .with_delta(save_delta.clone())
            .with_override(round, 0.0)
            .with_override(round + 1, analysis.save_impact.next_round_win_probability)
    };

    let actual = modification.as_played();
    if ActionKind::classify(&modification.original_action) == ActionKind::Retake {
        (retake_branch(actual), save_branch(modification.clone()))
    } else {
        (save_branch(actual), retake_branch(modification.clone()))
    }
}

fn merge_degradations(primary: &SimulationSummary, secondary: &SimulationSummary) -> Vec<Degradation> {
    let mut out = primary.degradations.clone();
    for d in &secondary.degradations {
        if !out.contains(d) {
            out.push(d.clone());
        }
    }
    out
}

fn with_batch_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(err) => {
            log::warn!("batch pool unavailable ({err}); running inline");
            action()
        }
    }
}
