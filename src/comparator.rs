//! Actual-vs-hypothetical comparison and the recommendation sentence shown to coaches.

use serde::{Deserialize, Serialize};

use crate::error::Degradation;
use crate::monte_carlo::SimulationSummary;
use crate::retake::{RetakeAnalysis, RetakeCall};

pub const STRONG_DELTA: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    FavorsHypothetical,
    FavorsActual,
    Inconclusive,
}

impl Verdict {
    pub fn from_delta(delta: f64) -> Verdict {
        if delta > STRONG_DELTA {
            Verdict::FavorsHypothetical
        } else if delta < -STRONG_DELTA {
            Verdict::FavorsActual
        } else {
            Verdict::Inconclusive
        }
    }
}

/// Values substituted into a recommendation template. Percentages are already rounded.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateArgs<'a> {
    pub original_action: &'a str,
    pub hypothetical_action: &'a str,
    pub actual_pct: i64,
    pub hypothetical_pct: i64,
    pub delta_pct: i64,
}

pub trait RecommendationTemplates: Send + Sync {
    fn favors_hypothetical(&self, args: &TemplateArgs<'_>) -> String;
    fn favors_actual(&self, args: &TemplateArgs<'_>) -> String;
    fn inconclusive(&self, args: &TemplateArgs<'_>) -> String;

    fn render(&self, verdict: Verdict, args: &TemplateArgs<'_>) -> String {
        match verdict {
            Verdict::FavorsHypothetical => self.favors_hypothetical(args),
            Verdict::FavorsActual => self.favors_actual(args),
            Verdict::Inconclusive => self.inconclusive(args),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedTemplates;

impl RecommendationTemplates for FixedTemplates {
    fn favors_hypothetical(&self, args: &TemplateArgs<'_>) -> String {
        format!(
            "'{}' would have been the better call: {}% match win probability against {}% for \
             '{}' ({:+} points).",
            args.hypothetical_action,
            args.hypothetical_pct,
            args.actual_pct,
            args.original_action,
            args.delta_pct
        )
    }

    fn favors_actual(&self, args: &TemplateArgs<'_>) -> String {
        format!(
            "Stick with '{}': it carried a {}% match win probability, while '{}' drops that to \
             {}% ({:+} points).",
            args.original_action,
            args.actual_pct,
            args.hypothetical_action,
            args.hypothetical_pct,
            args.delta_pct
        )
    }

    fn inconclusive(&self, args: &TemplateArgs<'_>) -> String {
        format!(
            "No clear edge either way: '{}' at {}% against '{}' at {}% ({:+} points). Review the \
             round on film before changing the approach.",
            args.hypothetical_action,
            args.hypothetical_pct,
            args.original_action,
            args.actual_pct,
            args.delta_pct
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub delta: f64,
    pub verdict: Verdict,
    pub recommendation: String,
    pub key_findings: Vec<String>,
}

fn pct(p: f64) -> i64 {
    (p * 100.0).round() as i64
}

pub fn compare(
    actual: &SimulationSummary,
    hypothetical: &SimulationSummary,
    original_action: &str,
    hypothetical_action: &str,
    retake: Option<&RetakeAnalysis>,
    degradations: &[Degradation],
    templates: &dyn RecommendationTemplates,
) -> Comparison {
    let delta = hypothetical.win_probability - actual.win_probability;
    let verdict = Verdict::from_delta(delta);
    let args = TemplateArgs {
        original_action,
        hypothetical_action,
        actual_pct: pct(actual.win_probability),
        hypothetical_pct: pct(hypothetical.win_probability),
        delta_pct: pct(hypothetical.win_probability) - pct(actual.win_probability),
    };
    let recommendation = templates.render(verdict, &args);

    let mut findings = vec![format!(
        "Match win probability moves from {}% to {}% ({:+} points)",
        args.actual_pct, args.hypothetical_pct, args.delta_pct
    )];

    let actual_score = actual.most_likely_score_key();
    let hyp_score = hypothetical.most_likely_score_key();
    if actual_score == hyp_score {
        findings.push(format!("Most likely final score stays {hyp_score}"));
    } else {
        findings.push(format!("Most likely final score shifts from {actual_score} to {hyp_score}"));
    }

    let ci = &hypothetical.confidence_interval;
    findings.push(format!(
        "{:.0}% of simulated outcomes land between {:+.0} and {:+.0} rounds of the real result",
        ci.confidence_level * 100.0,
        ci.lower,
        ci.upper
    ));

    let strongest = hypothetical
        .modification_round
        .factors
        .iter()
        .max_by(|a, b| a.contribution.abs().total_cmp(&b.contribution.abs()));
    if let Some(factor) = strongest
        && factor.contribution.abs() > 1e-9
    {
        findings.push(format!(
            "Round {} hinges most on {} ({:+.1} points)",
            hypothetical
                .sample
                .trace
                .first()
                .map(|t| t.round)
                .unwrap_or_default(),
            factor.name.replace('_', " "),
            factor.contribution * 100.0
        ));
    }

    if let Some(analysis) = retake {
        let call = match analysis.call {
            RetakeCall::Save => "save",
            RetakeCall::Retake => "retake",
            RetakeCall::BothViable => "either option",
        };
        findings.push(format!(
            "{} retake converts {}%; saving keeps next-round odds at {}% (model call: {call})",
            analysis.matchup,
            pct(analysis.retake_success_probability),
            pct(analysis.save_impact.next_round_win_probability)
        ));
    }

    for degradation in degradations {
        findings.push(format!("Caveat: {degradation}"));
    }

    Comparison {
        delta,
        verdict,
        recommendation,
        key_findings: findings,
    }
}
