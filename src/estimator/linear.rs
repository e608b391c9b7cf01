//! Ordinary least squares flow model
//!
//! Fits `flow = w · features + intercept` on standardized features by solving
//! the normal equations with Gaussian elimination and partial pivoting.
//! Standardizing first keeps the system well conditioned when features live
//! on very different scales (RPM in the thousands, vibration near 1).

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::{EstimatorError, FlowEstimator};
use crate::config::defaults::SINGULAR_PIVOT_EPSILON;
use crate::types::{FeatureVector, FEATURE_NAMES, NUM_FEATURES};

/// Trained linear expected-flow model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFlowModel {
    /// One weight per feature, in `FeatureVector` order
    pub weights: [f64; NUM_FEATURES],
    pub intercept: f64,
}

impl LinearFlowModel {
    pub fn new(weights: [f64; NUM_FEATURES], intercept: f64) -> Self {
        Self { weights, intercept }
    }

    /// Fit by least squares on (features, observed flow) pairs.
    ///
    /// Fails with `InsufficientData` when there are fewer rows than
    /// parameters, a feature is constant, or features are collinear.
    pub fn fit(samples: &[(FeatureVector, f64)]) -> Result<Self, EstimatorError> {
        let n = samples.len();
        if n == 0 {
            return Err(EstimatorError::InsufficientData(
                "no normal rows to train on".to_string(),
            ));
        }
        if n < NUM_FEATURES + 1 {
            return Err(EstimatorError::InsufficientData(format!(
                "{n} rows for {} parameters",
                NUM_FEATURES + 1
            )));
        }

        // Column statistics for standardization
        let mut means = [0.0; NUM_FEATURES];
        let mut stds = [0.0; NUM_FEATURES];
        for j in 0..NUM_FEATURES {
            let column = samples.iter().map(|(x, _)| x.0[j]);
            means[j] = column.clone().mean();
            stds[j] = column.population_std_dev();
            if !(stds[j] > 1e-12 * means[j].abs().max(1.0)) {
                return Err(EstimatorError::InsufficientData(format!(
                    "feature '{}' is constant across training rows",
                    FEATURE_NAMES[j]
                )));
            }
        }
        let y_mean = samples.iter().map(|(_, y)| *y).mean();

        // Normal equations: (ZᵀZ) β = Zᵀ(y − ȳ)
        let mut gram = [[0.0; NUM_FEATURES]; NUM_FEATURES];
        let mut rhs = [0.0; NUM_FEATURES];
        for (x, y) in samples {
            let mut z = [0.0; NUM_FEATURES];
            for j in 0..NUM_FEATURES {
                z[j] = (x.0[j] - means[j]) / stds[j];
            }
            let centered = y - y_mean;
            for r in 0..NUM_FEATURES {
                rhs[r] += z[r] * centered;
                for c in 0..NUM_FEATURES {
                    gram[r][c] += z[r] * z[c];
                }
            }
        }

        let beta = solve_linear_system(gram, rhs, n as f64).ok_or_else(|| {
            EstimatorError::InsufficientData(
                "collinear features make the design matrix rank-deficient".to_string(),
            )
        })?;

        // Back to the original feature scale
        let mut weights = [0.0; NUM_FEATURES];
        let mut intercept = y_mean;
        for j in 0..NUM_FEATURES {
            weights[j] = beta[j] / stds[j];
            intercept -= weights[j] * means[j];
        }
        Ok(Self { weights, intercept })
    }

    /// Raw prediction; callers validate features first.
    pub fn predict_features(&self, features: &FeatureVector) -> f64 {
        self.weights
            .iter()
            .zip(features.0.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept
    }
}

impl FlowEstimator for LinearFlowModel {
    fn predict_raw(&self, features: &FeatureVector) -> f64 {
        self.predict_features(features)
    }
}

/// Gaussian elimination with partial pivoting.
///
/// `scale` sets the singularity threshold; for a standardized Gram matrix the
/// diagonal equals the row count. Returns `None` when a pivot vanishes.
fn solve_linear_system(
    mut a: [[f64; NUM_FEATURES]; NUM_FEATURES],
    mut b: [f64; NUM_FEATURES],
    scale: f64,
) -> Option<[f64; NUM_FEATURES]> {
    let tolerance = SINGULAR_PIVOT_EPSILON * scale;

    for col in 0..NUM_FEATURES {
        let pivot_row = (col..NUM_FEATURES)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if !(a[pivot_row][col].abs() > tolerance) {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..NUM_FEATURES {
            let factor = a[row][col] / a[col][col];
            for k in col..NUM_FEATURES {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; NUM_FEATURES];
    for row in (0..NUM_FEATURES).rev() {
        let tail: f64 = ((row + 1)..NUM_FEATURES).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
