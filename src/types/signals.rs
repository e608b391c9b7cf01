//! Per-reading intermediate signals (estimator and physics outputs)

use serde::{Deserialize, Serialize};

use super::FeatureVector;

/// Expected flow for one reading, as produced by the estimator.
///
/// `value = raw + calibration_offset`. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedFlow {
    /// Uncalibrated regression output (L/min)
    pub raw: f64,
    /// Per-segment baseline offset applied on top of `raw` (L/min)
    pub calibration_offset: f64,
    /// Calibration-adjusted expected flow (L/min)
    pub value: f64,
    /// Features the prediction was computed from
    pub features: FeatureVector,
}

impl ExpectedFlow {
    pub fn new(raw: f64, calibration_offset: f64, features: FeatureVector) -> Self {
        Self {
            raw,
            calibration_offset,
            value: raw + calibration_offset,
            features,
        }
    }

    /// True when a non-zero calibration offset moved the expectation.
    pub fn is_calibrated(&self) -> bool {
        self.calibration_offset != 0.0
    }
}

/// Structured result of the physics consistency checks for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsVerdict {
    /// observed − expected flow, signed (L/min)
    pub residual: f64,
    /// residual relative to the expected flow (fraction, signed)
    pub relative_deviation: f64,
    /// |relative_deviation| exceeded the deviation tolerance
    pub conservation_violated: bool,
    /// Friction loss implied by the observed flow (PSI)
    pub expected_pressure_drop: f64,
    /// Reference pressure minus the implied friction loss (PSI)
    pub expected_pressure: f64,
    /// Observed pressure
    pub observed_pressure: f64,
    /// (observed − expected pressure) / expected pressure, signed
    pub pressure_deviation: f64,
    /// Pressure fell below the physics expectation by more than the tolerance
    pub pressure_anomaly: bool,
    /// Anomaly present here without a correlated anomaly in adjacent non-downstream segments
    pub localized_effect: bool,
}

impl PhysicsVerdict {
    /// True when at least one physics check fired.
    pub fn any_anomaly(&self) -> bool {
        self.conservation_violated || self.pressure_anomaly
    }

    /// True when both checks fired.
    pub fn both_anomalous(&self) -> bool {
        self.conservation_violated && self.pressure_anomaly
    }
}
