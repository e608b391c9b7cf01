//! Presentation layer - renders decisions, calibration state and statistics
//!
//! Everything here is read-only over what the core decided. Reason text is
//! produced only in this module.

use std::fmt;

use crate::calibration::CalibrationStatus;
use crate::config::defaults::MAX_LOCALIZATION_CANDIDATES;
use crate::estimator::TrainingReport;
use crate::localizer::Localization;
use crate::pipeline::{EvaluationStats, ReadingOutcome};
use crate::types::{FusionResult, Reason};

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::FlowWithinTolerance { deviation, tolerance } => write!(
                f,
                "flow within tolerance ({:+.1}% vs ±{:.0}%)",
                deviation * 100.0,
                tolerance * 100.0
            ),
            Reason::FlowExcess { observed, expected, deviation } => write!(
                f,
                "flow {:.1} L/min exceeds expected {:.1} L/min by {:.1}%: water unaccounted for",
                observed,
                expected,
                deviation * 100.0
            ),
            Reason::FlowDeficit { observed, expected, deviation } => write!(
                f,
                "flow {:.1} L/min below expected {:.1} L/min by {:.1}%: possible blockage or sensor fault",
                observed,
                expected,
                deviation.abs() * 100.0
            ),
            Reason::PressureConsistent { observed, expected, deviation } => write!(
                f,
                "pressure {:.1} psi consistent with expected {:.1} psi ({:+.1}%)",
                observed,
                expected,
                deviation * 100.0
            ),
            Reason::PressureDrop { observed, expected, deviation } => write!(
                f,
                "pressure {:.1} psi is {:.1}% below expected {:.1} psi",
                observed,
                deviation.abs() * 100.0,
                expected
            ),
            Reason::SignalsAgree => write!(f, "flow and pressure signals agree"),
            Reason::AwaitingPersistence { streak, required } => {
                write!(f, "awaiting persistence ({streak}/{required} readings)")
            }
            Reason::PersistentAnomaly { streak } => {
                write!(f, "anomaly persisted for {streak} consecutive readings")
            }
            Reason::CalibrationApplied { offset } => {
                write!(f, "segment baseline offset {offset:+.2} L/min applied")
            }
            Reason::LocalizedEffect => write!(f, "effect confined to this segment"),
            Reason::NetworkWideEffect => write!(f, "correlated anomaly in adjacent segments"),
        }
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// One line per decision, for streaming output.
pub fn decision_line(result: &FusionResult, localization: Option<&Localization>) -> String {
    let mut line = format!(
        "[{}] t={} {:<7} conf={:.2} flow={:.1}/{:.1} L/min ({:+.1}%) p={:.1} psi",
        result.segment_id,
        result.timestamp,
        result.status,
        result.confidence,
        result.verdict.residual + result.expected.value,
        result.expected.value,
        result.flow_deviation() * 100.0,
        result.verdict.observed_pressure,
    );
    if let Some(top) = localization.and_then(Localization::most_probable) {
        line.push_str(&format!(
            " → likely {} ({}, {:.0}%)",
            top.segment,
            top.position,
            top.confidence * 100.0
        ));
    }
    line
}

/// Multi-line rendering: status line, every reason, top localization candidates.
pub fn decision_detail(result: &FusionResult, localization: Option<&Localization>) -> String {
    let mut out = format!(
        "{} {} @ {} (confidence {:.0}%)\n",
        result.status,
        result.segment_id,
        result.timestamp,
        result.confidence * 100.0
    );
    for reason in &result.reasons {
        out.push_str(&format!("  - {reason}\n"));
    }
    if let Some(loc) = localization.filter(|l| !l.is_empty()) {
        out.push_str("  Probable location:\n");
        for (rank, c) in loc.candidates.iter().take(MAX_LOCALIZATION_CANDIDATES).enumerate() {
            out.push_str(&format!(
                "    {}. {:<16} {:<10} {:>5.1}%\n",
                rank + 1,
                c.segment.as_str(),
                c.position.to_string(),
                c.confidence * 100.0
            ));
        }
    }
    out
}

/// One line per outcome, including undetermined readings.
pub fn outcome_line(outcome: &ReadingOutcome) -> String {
    match outcome {
        ReadingOutcome::Decided {
            index,
            result,
            localization,
        } => format!("#{index:<6} {}", decision_line(result, localization.as_ref())),
        ReadingOutcome::Undetermined { index, segment, error } => {
            format!("#{index:<6} [{segment}] UNDETERMINED: {error}")
        }
    }
}

// ============================================================================
// Summaries
// ============================================================================

impl fmt::Display for EvaluationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Evaluation: {} readings ({} normal, {} suspect, {} leak, {} undetermined)",
            self.total(),
            self.normal,
            self.suspect,
            self.leak,
            self.undetermined
        )
    }
}

/// Summary table of decision counts and accuracy against ground truth.
pub fn stats_summary(stats: &EvaluationStats) -> String {
    let mut out = String::from("Detection Statistics:\n");
    out.push_str(&format!("  Readings processed:   {}\n", stats.total()));
    out.push_str(&format!("  NORMAL:               {}\n", stats.normal));
    out.push_str(&format!("  SUSPECT:              {}\n", stats.suspect));
    out.push_str(&format!("  LEAK:                 {}\n", stats.leak));
    out.push_str(&format!("  Undetermined:         {}\n", stats.undetermined));

    if stats.labeled() == 0 {
        out.push_str("  No ground truth labels; accuracy not computed\n");
        return out;
    }
    out.push_str(&format!(
        "\nConfusion Matrix ({} labelled, {} unlabelled):\n",
        stats.labeled(),
        stats.unlabeled
    ));
    out.push_str("                     actual leak   actual normal\n");
    out.push_str(&format!(
        "  flagged            {:>11}   {:>13}\n",
        stats.true_positive, stats.false_positive
    ));
    out.push_str(&format!(
        "  not flagged        {:>11}   {:>13}\n",
        stats.false_negative, stats.true_negative
    ));
    out.push_str(&format!("  Accuracy:             {}\n", percent_cell(stats.accuracy())));
    out.push_str(&format!("  Precision:            {}\n", percent_cell(stats.precision())));
    out.push_str(&format!("  Recall:               {}\n", percent_cell(stats.recall())));
    out
}

fn percent_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}%"))
}

/// Per-segment calibration state, one row per segment.
pub fn calibration_table(status: &[CalibrationStatus]) -> String {
    let mut out = format!(
        "{:<16} {:>9} {:>9} {:>10} {:>9} {:>6}  {}\n",
        "Segment", "Samples", "Mean", "Variance", "Offset", "Cals", "Blocked"
    );
    for s in status {
        out.push_str(&format!(
            "{:<16} {:>4}/{:<4} {:>9.3} {:>10.3} {:>9.3} {:>6}  {}\n",
            s.segment.as_str(),
            s.samples,
            s.window_size,
            s.mean,
            s.variance,
            s.offset,
            s.calibrations_applied,
            if s.leak_in_window { "leak in window" } else { "-" }
        ));
    }
    out
}

/// Goodness-of-fit lines for a freshly trained model.
pub fn training_summary(report: &TrainingReport) -> String {
    let mut out = format!(
        "Training: {} rows (R² {:.4}, MAE {:.3} L/min)\n",
        report.train_rows, report.train_r2, report.train_mae
    );
    match (report.holdout_r2, report.holdout_mae) {
        (Some(r2), Some(mae)) => out.push_str(&format!(
            "Holdout:  {} rows (R² {:.4}, MAE {:.3} L/min)\n",
            report.holdout_rows, r2, mae
        )),
        _ => out.push_str("Holdout:  skipped (too few rows)\n"),
    }
    out
}
