//! LeakWatch: Water Distribution Leak Detection
//!
//! Per-reading leak detection for pipe segments, fusing a learned flow
//! expectation with hydraulic consistency checks.
//!
//! ## Architecture
//!
//! - **Estimator**: expected flow from operating conditions (linear model)
//! - **Physics Engine**: flow residual and pressure-flow consistency checks
//! - **Calibration**: per-segment residual windows and baseline offsets
//! - **Fusion**: NORMAL / SUSPECT / LEAK decision with confidence and reasons
//! - **Localizer**: ranks the segments around an anomaly
//! - **Pipeline**: drives the above reading by reading over a topology

pub mod calibration;
pub mod config;
pub mod dataset;
pub mod estimator;
pub mod fusion;
pub mod localizer;
pub mod physics_engine;
pub mod pipeline;
pub mod report;
pub mod topology;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export configuration
pub use config::LeakConfig;

// Re-export commonly used types
pub use types::{
    ExpectedFlow, FeatureVector, FusionResult, InvalidInputError, PhysicsVerdict, Reading,
    Reason, SegmentId, Status,
};

// Re-export pipeline stages
pub use calibration::{CalibrationError, CalibrationStore};
pub use estimator::{EstimatorError, FlowEstimator, LinearFlowModel};
pub use fusion::{DetectionError, FusionEngine};
pub use localizer::{Localization, Localizer, RankedSegment};
pub use physics_engine::ConsistencyChecker;
pub use pipeline::{EvaluationStats, LeakPipeline, ReadingOutcome};
pub use topology::{NetworkTopology, Position};
