//! Expected-Flow Estimator
//!
//! Predicts the flow a segment should carry from its operating conditions
//! (pressure, temperature, pump speed, operational hours, vibration). The
//! model is trained once on confirmed-normal history and is stateless at
//! inference; per-segment bias is handled by the calibration store, not here.
//!
//! ## Architecture
//! - `linear`: ordinary least squares model (`LinearFlowModel`)
//! - `training`: holdout split, fit metrics and normal-row partitioning
//! - `checkpoint`: versioned, checksummed JSON persistence
//!
//! ## Usage
//!
//! ```ignore
//! let (normal, _) = partition_normal(&history);
//! let trained = train(&normal, &config.estimator)?;
//! let expected = trained.model.expected_flow(&reading, &store)?;
//! ```

pub mod checkpoint;
pub mod linear;
pub mod training;

pub use checkpoint::{load_model, save_model, ModelCheckpoint};
pub use linear::LinearFlowModel;
pub use training::{partition_normal, train, TrainedModel, TrainingReport};

use thiserror::Error;

use crate::calibration::CalibrationStore;
use crate::types::{ExpectedFlow, FeatureVector, InvalidInputError, Reading, SegmentId};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum EstimatorError {
    /// Not enough independent normal rows to determine every parameter
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    #[error("Training row {index} is labelled as a leak; train on normal rows only")]
    MislabeledRow { index: usize },

    #[error("Training row {index}: {source}")]
    InvalidRow {
        index: usize,
        #[source]
        source: InvalidInputError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Schema version mismatch: file has v{0}, expected v{1}")]
    SchemaMismatch(u32, u32),

    #[error("Model checksum mismatch: file has {stored}, parameters hash to {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("Feature layout mismatch: file has {0:?}")]
    FeatureMismatch(Vec<String>),
}

// ============================================================================
// Estimator Seam
// ============================================================================

/// Anything that maps a feature vector to an expected flow.
///
/// Implemented by the trained `LinearFlowModel`; tests and fixed-baseline
/// deployments can substitute `ConstantFlowEstimator`.
pub trait FlowEstimator {
    /// Raw expected flow (L/min) for features already known to be finite.
    fn predict_raw(&self, features: &FeatureVector) -> f64;

    /// Validated prediction for one segment's features.
    fn predict(&self, segment: &SegmentId, features: &FeatureVector) -> Result<f64, InvalidInputError> {
        features.validate(segment)?;
        let raw = self.predict_raw(features);
        if !raw.is_finite() {
            return Err(InvalidInputError::new(segment, "expected_flow", raw));
        }
        Ok(raw)
    }

    /// Calibration-adjusted expectation for a reading.
    ///
    /// Reads the store's offset for the segment (0.0 when absent) and never
    /// writes to it.
    fn expected_flow(
        &self,
        reading: &Reading,
        store: &CalibrationStore,
    ) -> Result<ExpectedFlow, InvalidInputError> {
        let features = reading.features();
        let raw = self.predict(&reading.segment_id, &features)?;
        Ok(ExpectedFlow::new(raw, store.offset_for(&reading.segment_id), features))
    }
}

/// Estimator that expects the same flow under every condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantFlowEstimator(pub f64);

impl FlowEstimator for ConstantFlowEstimator {
    fn predict_raw(&self, _features: &FeatureVector) -> f64 {
        self.0
    }
}

impl<E: FlowEstimator + ?Sized> FlowEstimator for Box<E> {
    fn predict_raw(&self, features: &FeatureVector) -> f64 {
        (**self).predict_raw(features)
    }
}
