//! Model training with a seeded holdout split
//!
//! The caller hands over rows it has already partitioned to confirmed-normal
//! operation (`partition_normal`). A leak-labelled row reaching `train` is a
//! caller bug and is rejected, never filtered out silently.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::info;

use super::{EstimatorError, LinearFlowModel};
use crate::config::EstimatorConfig;
use crate::types::{FeatureVector, Reading};

// ============================================================================
// Training Report
// ============================================================================

/// Goodness of fit for a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub train_r2: f64,
    pub train_mae: f64,
    /// None when the data set was too small to hold out rows
    pub holdout_r2: Option<f64>,
    pub holdout_mae: Option<f64>,
}

/// Model plus the metrics it was accepted with.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub model: LinearFlowModel,
    pub report: TrainingReport,
}

// ============================================================================
// Partitioning
// ============================================================================

/// Split history into confirmed-normal rows and everything else.
///
/// Rows without a ground-truth label are not confirmed normal and land in
/// the second group alongside leak-labelled rows.
pub fn partition_normal(rows: &[Reading]) -> (Vec<Reading>, Vec<Reading>) {
    rows.iter()
        .cloned()
        .partition(|r| r.leak_flag == Some(false))
}

// ============================================================================
// Training
// ============================================================================

/// Train the expected-flow model on normal-only rows.
///
/// With at least `min_rows_for_holdout` rows a seeded `holdout_fraction`
/// share is held out and the model is fit on the rest; smaller sets are fit
/// on every row and report training metrics only.
pub fn train(rows: &[Reading], config: &EstimatorConfig) -> Result<TrainedModel, EstimatorError> {
    let mut samples: Vec<(FeatureVector, f64)> = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        if row.is_labeled_leak() {
            return Err(EstimatorError::MislabeledRow { index });
        }
        row.validate()
            .map_err(|source| EstimatorError::InvalidRow { index, source })?;
        samples.push((row.features(), row.flow_rate));
    }

    let holdout_rows = if samples.len() >= config.min_rows_for_holdout && config.holdout_fraction > 0.0 {
        (samples.len() as f64 * config.holdout_fraction).ceil() as usize
    } else {
        0
    };

    let (train_set, holdout_set) = if holdout_rows > 0 {
        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut rng = StdRng::seed_from_u64(config.seed);
        order.shuffle(&mut rng);
        let (holdout_idx, train_idx) = order.split_at(holdout_rows);
        (
            train_idx.iter().map(|&i| samples[i]).collect::<Vec<_>>(),
            holdout_idx.iter().map(|&i| samples[i]).collect::<Vec<_>>(),
        )
    } else {
        (samples, Vec::new())
    };

    let model = LinearFlowModel::fit(&train_set)?;
    let (train_r2, train_mae) = fit_metrics(&model, &train_set);
    let (holdout_r2, holdout_mae) = if holdout_set.is_empty() {
        (None, None)
    } else {
        let (r2, mae) = fit_metrics(&model, &holdout_set);
        (Some(r2), Some(mae))
    };

    let report = TrainingReport {
        train_rows: train_set.len(),
        holdout_rows: holdout_set.len(),
        train_r2,
        train_mae,
        holdout_r2,
        holdout_mae,
    };
    info!(
        train_rows = report.train_rows,
        holdout_rows = report.holdout_rows,
        train_r2 = report.train_r2,
        holdout_r2 = ?report.holdout_r2,
        holdout_mae = ?report.holdout_mae,
        "Expected-flow model trained"
    );
    Ok(TrainedModel { model, report })
}

/// (R², mean absolute error) of the model on a sample set.
fn fit_metrics(model: &LinearFlowModel, samples: &[(FeatureVector, f64)]) -> (f64, f64) {
    let predictions: Vec<f64> = samples.iter().map(|(x, _)| model.predict_features(x)).collect();
    let observed: Vec<f64> = samples.iter().map(|(_, y)| *y).collect();
    (
        r_squared(&observed, &predictions),
        mean_absolute_error(&observed, &predictions),
    )
}

/// Coefficient of determination.
///
/// For constant targets: 1.0 on a perfect fit, 0.0 otherwise.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    if observed.is_empty() {
        return 0.0;
    }
    let mean = observed.mean();
    let ss_tot: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = observed
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn mean_absolute_error(observed: &[f64], predicted: &[f64]) -> f64 {
    if observed.is_empty() {
        return 0.0;
    }
    observed
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p).abs())
        .sum::<f64>()
        / observed.len() as f64
}
