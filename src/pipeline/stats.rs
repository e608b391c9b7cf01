//! Evaluation statistics against ground-truth leak labels

use serde::{Deserialize, Serialize};

use crate::types::Status;

/// Decision counts and a confusion matrix where SUSPECT and LEAK are positive.
///
/// Undetermined readings and readings without a label are counted but kept
/// out of the confusion matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub normal: u64,
    pub suspect: u64,
    pub leak: u64,
    pub undetermined: u64,
    /// Decided readings with no ground truth
    pub unlabeled: u64,
    pub true_positive: u64,
    pub false_positive: u64,
    pub true_negative: u64,
    pub false_negative: u64,
}

impl EvaluationStats {
    pub fn record(&mut self, status: Status, ground_truth: Option<bool>) {
        match status {
            Status::Normal => self.normal += 1,
            Status::Suspect => self.suspect += 1,
            Status::Leak => self.leak += 1,
        }
        match (status.is_anomalous(), ground_truth) {
            (_, None) => self.unlabeled += 1,
            (true, Some(true)) => self.true_positive += 1,
            (true, Some(false)) => self.false_positive += 1,
            (false, Some(false)) => self.true_negative += 1,
            (false, Some(true)) => self.false_negative += 1,
        }
    }

    pub fn record_undetermined(&mut self) {
        self.undetermined += 1;
    }

    /// Readings that reached a decision
    pub fn decided(&self) -> u64 {
        self.normal + self.suspect + self.leak
    }

    pub fn total(&self) -> u64 {
        self.decided() + self.undetermined
    }

    /// Decided readings that carried a label
    pub fn labeled(&self) -> u64 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    /// Percentage of labelled readings classified correctly
    pub fn accuracy(&self) -> Option<f64> {
        percent(self.true_positive + self.true_negative, self.labeled())
    }

    /// Percentage of positive decisions that were real leaks
    pub fn precision(&self) -> Option<f64> {
        percent(self.true_positive, self.true_positive + self.false_positive)
    }

    /// Percentage of real leaks that were flagged
    pub fn recall(&self) -> Option<f64> {
        percent(self.true_positive, self.true_positive + self.false_negative)
    }
}

fn percent(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64 * 100.0)
}
