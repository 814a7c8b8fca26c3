use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::engine::BatchEntry;
use crate::state::MatchHistory;

pub struct ExportReport {
    pub rounds: usize,
    pub distribution_rows: usize,
    pub findings: usize,
    pub errors: Vec<String>,
}

/// Writes a whole-match batch to a workbook with Rounds, Distributions and Findings sheets.
pub fn export_match_report(
    path: &Path,
    history: &MatchHistory,
    entries: &[BatchEntry],
) -> Result<ExportReport> {
    let mut round_rows = vec![header(&[
        "match_id",
        "round",
        "round_type",
        "winner",
        "original_action",
        "hypothetical_action",
        "actual_win_prob",
        "hypothetical_win_prob",
        "delta",
        "most_likely_score",
        "ci_lower",
        "ci_upper",
        "confidence",
        "valid",
        "recommendation",
    ])];
    let mut dist_rows = vec![header(&["round", "score", "probability"])];
    let mut finding_rows = vec![header(&["round", "finding"])];
    let mut errors = Vec::new();

    for entry in entries {
        let round_number = entry.intent.round_number;
        let round = history
            .rounds
            .get(round_number.saturating_sub(1) as usize);
        let prediction = match &entry.prediction {
            Ok(p) => p,
            Err(err) => {
                errors.push(format!("round {round_number}: {err}"));
                continue;
            }
        };

        round_rows.push(vec![
            prediction.match_id.clone(),
            round_number.to_string(),
            round
                .map(|r| r.round_type.as_str().to_string())
                .unwrap_or_default(),
            round
                .map(|r| history.context.side_name(r.winner).to_string())
                .unwrap_or_default(),
            prediction.original_action.clone(),
            prediction.hypothetical_action.clone(),
            fmt_prob(prediction.actual_win_probability),
            fmt_prob(prediction.win_probability),
            format!("{:+.4}", prediction.probability_delta()),
            prediction.most_likely_score.clone(),
            format!("{:.1}", prediction.confidence_interval.lower),
            format!("{:.1}", prediction.confidence_interval.upper),
            format!("{:.3}", prediction.confidence),
            if prediction.validation.is_valid {
                "yes".to_string()
            } else {
                "no".to_string()
            },
            prediction.recommendation.clone(),
        ]);

        for (score, p) in &prediction.score_distribution {
            dist_rows.push(vec![round_number.to_string(), score.clone(), fmt_prob(*p)]);
        }
        for finding in &prediction.key_findings {
            finding_rows.push(vec![round_number.to_string(), finding.clone()]);
        }
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Rounds")?;
        write_rows(sheet, &round_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Distributions")?;
        write_rows(sheet, &dist_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Findings")?;
        write_rows(sheet, &finding_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        rounds: round_rows.len().saturating_sub(1),
        distribution_rows: dist_rows.len().saturating_sub(1),
        findings: finding_rows.len().saturating_sub(1),
        errors,
    })
}

fn header(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn fmt_prob(p: f64) -> String {
    format!("{p:.4}")
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
