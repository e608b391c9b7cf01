//! Fusion & Decision Engine
//!
//! Combines the estimator's expected flow and the physics verdict for one
//! reading into NORMAL / SUSPECT / LEAK, a confidence and an ordered list of
//! reasons, then feeds the reading's residual back into the calibration store.
//!
//! ## Decision Table
//!
//! | Flow deviation | Pressure anomaly | Persisted | Status  |
//! |----------------|------------------|-----------|---------|
//! | ≤ tolerance    | no               | -         | NORMAL  |
//! | ≤ tolerance    | yes              | -         | SUSPECT |
//! | > tolerance    | no               | -         | SUSPECT |
//! | > tolerance    | yes              | no        | SUSPECT |
//! | > tolerance    | yes              | yes       | LEAK    |
//!
//! "Persisted" means both signals fired on `persistence_requirement`
//! consecutive readings of the segment.

pub mod confidence;

pub use confidence::score_confidence;

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::calibration::{CalibrationError, CalibrationStore};
use crate::config::{ConfidenceWeights, DetectionConfig, LeakConfig};
use crate::types::{
    ExpectedFlow, FusionResult, InvalidInputError, PhysicsVerdict, Reading, Reason, SegmentId,
    Status,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

// ============================================================================
// Streak State
// ============================================================================

/// Consecutive-reading counters for one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStreaks {
    /// Readings with at least one signal firing
    pub anomaly: u32,
    /// Readings with flow and pressure both firing
    pub joint: u32,
}

impl SegmentStreaks {
    fn advance(self, verdict: &PhysicsVerdict) -> Self {
        Self {
            anomaly: if verdict.any_anomaly() { self.anomaly.saturating_add(1) } else { 0 },
            joint: if verdict.both_anomalous() { self.joint.saturating_add(1) } else { 0 },
        }
    }
}

// ============================================================================
// Fusion Engine
// ============================================================================

pub struct FusionEngine {
    detection: DetectionConfig,
    weights: ConfidenceWeights,
    streaks: HashMap<SegmentId, SegmentStreaks>,
}

impl FusionEngine {
    pub fn new(detection: DetectionConfig, weights: ConfidenceWeights) -> Self {
        Self {
            detection,
            weights,
            streaks: HashMap::new(),
        }
    }

    pub fn from_config(config: &LeakConfig) -> Self {
        Self::new(config.detection.clone(), config.confidence_weights.clone())
    }

    /// Current streaks for a segment (zero when never seen)
    pub fn streaks(&self, segment: &SegmentId) -> SegmentStreaks {
        self.streaks.get(segment).copied().unwrap_or_default()
    }

    /// Forget a segment's streaks. Operator action, paired with a calibration reset.
    pub fn reset_segment(&mut self, segment: &SegmentId) {
        self.streaks.remove(segment);
    }

    /// Decide one reading and record its residual in the store.
    ///
    /// On error nothing is mutated: neither the store nor the streaks.
    pub fn decide(
        &mut self,
        store: &mut CalibrationStore,
        reading: &Reading,
        expected: &ExpectedFlow,
        verdict: &PhysicsVerdict,
    ) -> Result<FusionResult, DetectionError> {
        reading.validate()?;
        let segment = &reading.segment_id;
        for (field, value) in [
            ("expected_flow", expected.value),
            ("raw_expected_flow", expected.raw),
            ("relative_deviation", verdict.relative_deviation),
            ("pressure_deviation", verdict.pressure_deviation),
        ] {
            if !value.is_finite() {
                return Err(InvalidInputError::new(segment, field, value).into());
            }
        }

        let streaks = self.streaks(segment).advance(verdict);
        let status = self.classify(verdict, streaks);
        let confidence = score_confidence(status, verdict, streaks.anomaly, &self.detection, &self.weights);
        let reasons = self.reasons(status, expected, verdict, streaks);

        // Residual against the raw prediction so the offset converges on the bias
        let raw_residual = reading.flow_rate - expected.raw;
        store.record_at(segment, reading.timestamp, raw_residual, status == Status::Leak)?;
        self.streaks.insert(segment.clone(), streaks);

        if status == Status::Leak {
            info!(
                segment = %segment,
                timestamp = reading.timestamp,
                deviation = verdict.relative_deviation,
                confidence = confidence,
                streak = streaks.joint,
                "LEAK detected"
            );
        } else {
            debug!(
                segment = %segment,
                timestamp = reading.timestamp,
                status = %status,
                deviation = verdict.relative_deviation,
                confidence = confidence,
                "Reading decided"
            );
        }

        Ok(FusionResult {
            segment_id: segment.clone(),
            timestamp: reading.timestamp,
            status,
            confidence,
            reasons,
            expected: *expected,
            verdict: *verdict,
            anomaly_streak: streaks.anomaly,
        })
    }

    fn classify(&self, verdict: &PhysicsVerdict, streaks: SegmentStreaks) -> Status {
        match (verdict.conservation_violated, verdict.pressure_anomaly) {
            (false, false) => Status::Normal,
            (true, true) if streaks.joint >= self.detection.persistence_requirement => Status::Leak,
            _ => Status::Suspect,
        }
    }

    fn reasons(
        &self,
        status: Status,
        expected: &ExpectedFlow,
        verdict: &PhysicsVerdict,
        streaks: SegmentStreaks,
    ) -> Vec<Reason> {
        let mut reasons = Vec::with_capacity(5);
        let observed_flow = expected.value + verdict.residual;

        reasons.push(if !verdict.conservation_violated {
            Reason::FlowWithinTolerance {
                deviation: verdict.relative_deviation,
                tolerance: self.detection.deviation_tolerance,
            }
        } else if verdict.relative_deviation > 0.0 {
            Reason::FlowExcess {
                observed: observed_flow,
                expected: expected.value,
                deviation: verdict.relative_deviation,
            }
        } else {
            Reason::FlowDeficit {
                observed: observed_flow,
                expected: expected.value,
                deviation: verdict.relative_deviation,
            }
        });

        reasons.push(if verdict.pressure_anomaly {
            Reason::PressureDrop {
                observed: verdict.observed_pressure,
                expected: verdict.expected_pressure,
                deviation: verdict.pressure_deviation,
            }
        } else {
            Reason::PressureConsistent {
                observed: verdict.observed_pressure,
                expected: verdict.expected_pressure,
                deviation: verdict.pressure_deviation,
            }
        });

        if verdict.both_anomalous() {
            reasons.push(Reason::SignalsAgree);
            reasons.push(if status == Status::Leak {
                Reason::PersistentAnomaly { streak: streaks.joint }
            } else {
                Reason::AwaitingPersistence {
                    streak: streaks.joint,
                    required: self.detection.persistence_requirement,
                }
            });
        }

        if expected.is_calibrated() {
            reasons.push(Reason::CalibrationApplied {
                offset: expected.calibration_offset,
            });
        }

        if status.is_anomalous() {
            reasons.push(if verdict.localized_effect {
                Reason::LocalizedEffect
            } else {
                Reason::NetworkWideEffect
            });
        }

        reasons
    }
}

// ============================================================================
// Tests
// ============================================================================
