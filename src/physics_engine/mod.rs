//! Physics Engine Module
//!
//! Deterministic consistency checks for pipe segment readings.
//! All math here is pure physics - no learning and no I/O.
//!
//! ## Checks
//! - Conservation of flow: observed vs calibrated expected flow
//! - Pressure-flow relationship: observed pressure vs friction-loss model
//! - Localized effect: anomaly here without a correlated anomaly in
//!   adjacent non-downstream segments

pub mod hydraulics;

pub use hydraulics::{
    expected_pressure_psi, flow_velocity, friction_pressure_drop_psi, PipeCoefficients,
};

use std::collections::HashMap;

use crate::config::{DetectionConfig, LeakConfig, PhysicsConfig, SegmentConfig};
use crate::types::{ExpectedFlow, InvalidInputError, PhysicsVerdict, Reading, SegmentId};

// ============================================================================
// Consistency Checker
// ============================================================================

/// Stateless physics consistency checker.
///
/// Holds only configuration; identical inputs always give identical verdicts.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    detection: DetectionConfig,
    physics: PhysicsConfig,
    pipes: HashMap<SegmentId, PipeCoefficients>,
}

impl ConsistencyChecker {
    pub fn new(detection: DetectionConfig, physics: PhysicsConfig, segments: &[SegmentConfig]) -> Self {
        let pipes = segments
            .iter()
            .map(|s| (s.id.clone(), PipeCoefficients::for_segment(&physics, s)))
            .collect();
        Self {
            detection,
            physics,
            pipes,
        }
    }

    pub fn from_config(config: &LeakConfig) -> Self {
        Self::new(config.detection.clone(), config.physics.clone(), &config.segments)
    }

    /// Coefficients used for a segment (configured or network defaults)
    pub fn pipe_for(&self, segment: &SegmentId) -> PipeCoefficients {
        self.pipes
            .get(segment)
            .copied()
            .unwrap_or_else(|| PipeCoefficients::from_defaults(&self.physics))
    }

    /// Evaluate a reading assuming no adjacent segment is anomalous.
    pub fn evaluate(
        &self,
        reading: &Reading,
        expected: &ExpectedFlow,
    ) -> Result<PhysicsVerdict, InvalidInputError> {
        self.evaluate_with_neighbors(reading, expected, false)
    }

    /// Evaluate a reading against its expected flow and the friction model.
    ///
    /// `adjacent_anomalous` reports whether an upstream or sibling segment
    /// currently shows an anomaly; it only affects the localized-effect flag.
    pub fn evaluate_with_neighbors(
        &self,
        reading: &Reading,
        expected: &ExpectedFlow,
        adjacent_anomalous: bool,
    ) -> Result<PhysicsVerdict, InvalidInputError> {
        reading.validate()?;
        if !expected.value.is_finite() {
            return Err(InvalidInputError::new(
                &reading.segment_id,
                "expected_flow",
                expected.value,
            ));
        }

        // Conservation of flow
        let residual = reading.flow_rate - expected.value;
        let denominator = expected.value.abs().max(self.detection.min_expected_flow);
        let relative_deviation = residual / denominator;
        let conservation_violated = relative_deviation.abs() > self.detection.deviation_tolerance;

        // Pressure-flow relationship
        let pipe = self.pipe_for(&reading.segment_id);
        let expected_pressure_drop = friction_pressure_drop_psi(reading.flow_rate, &pipe, &self.physics);
        let expected_pressure = (pipe.reference_pressure_psi - expected_pressure_drop).max(0.0);
        let pressure_deviation = if expected_pressure > 0.0 {
            (reading.pressure - expected_pressure) / expected_pressure
        } else {
            0.0
        };
        // Only a shortfall is anomalous; a rise is reported but not flagged
        let pressure_anomaly = pressure_deviation < -self.detection.pressure_tolerance;

        let localized_effect = (conservation_violated || pressure_anomaly) && !adjacent_anomalous;

        Ok(PhysicsVerdict {
            residual,
            relative_deviation,
            conservation_violated,
            expected_pressure_drop,
            expected_pressure,
            observed_pressure: reading.pressure,
            pressure_deviation,
            pressure_anomaly,
            localized_effect,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::reading;
    use crate::types::FeatureVector;

    fn checker() -> ConsistencyChecker {
        ConsistencyChecker::from_config(&LeakConfig::default())
    }

    fn expected(value: f64) -> ExpectedFlow {
        ExpectedFlow::new(value, 0.0, FeatureVector([0.0; 5]))
    }

    #[test]
    fn test_matching_flow_and_pressure_is_consistent() {
        let verdict = checker()
            .evaluate(&reading("P1", 1, 50.0, 100.0), &expected(50.0))
            .unwrap();
        assert_eq!(verdict.residual, 0.0);
        assert!(!verdict.conservation_violated);
        assert!(!verdict.pressure_anomaly);
        assert!(!verdict.localized_effect);
        assert!(verdict.pressure_deviation.abs() < 1e-5);
    }

    #[test]
    fn test_flow_excess_and_pressure_drop() {
        let verdict = checker()
            .evaluate(&reading("P1", 1, 65.0, 85.0), &expected(50.0))
            .unwrap();
        assert_eq!(verdict.residual, 15.0);
        assert!((verdict.relative_deviation - 0.3).abs() < 1e-12);
        assert!(verdict.conservation_violated);
        assert!(verdict.pressure_anomaly);
        assert!((verdict.pressure_deviation + 0.15).abs() < 1e-4);
        assert!(verdict.localized_effect);
        assert!(verdict.both_anomalous());
    }

    #[test]
    fn test_deviation_at_tolerance_is_not_violation() {
        // 57.5 vs 50 is exactly 15%
        let verdict = checker()
            .evaluate(&reading("P1", 1, 57.5, 100.0), &expected(50.0))
            .unwrap();
        assert!(!verdict.conservation_violated);
    }

    #[test]
    fn test_pressure_rise_is_not_anomalous() {
        let verdict = checker()
            .evaluate(&reading("P1", 1, 50.0, 130.0), &expected(50.0))
            .unwrap();
        assert!(verdict.pressure_deviation > 0.25);
        assert!(!verdict.pressure_anomaly);
    }

    #[test]
    fn test_small_expected_flow_uses_floor() {
        let verdict = checker()
            .evaluate(&reading("P1", 1, 0.5, 100.0), &expected(0.0))
            .unwrap();
        assert!((verdict.relative_deviation - 0.5).abs() < 1e-12);
        assert!(verdict.relative_deviation.is_finite());
    }

    #[test]
    fn test_correlated_neighbor_clears_localized_flag() {
        let verdict = checker()
            .evaluate_with_neighbors(&reading("P1", 1, 65.0, 85.0), &expected(50.0), true)
            .unwrap();
        assert!(verdict.conservation_violated);
        assert!(!verdict.localized_effect);
    }

    #[test]
    fn test_segment_reference_pressure_from_config() {
        let mut config = LeakConfig::default();
        config.segments.push(SegmentConfig {
            id: SegmentId::new("LOW"),
            from: None,
            to: None,
            length_m: None,
            diameter_m: None,
            roughness: None,
            reference_pressure_psi: Some(60.0),
        });
        let checker = ConsistencyChecker::from_config(&config);
        let low = checker.evaluate(&reading("LOW", 1, 50.0, 60.0), &expected(50.0)).unwrap();
        assert!(!low.pressure_anomaly, "60 psi is nominal for this segment");
        let other = checker.evaluate(&reading("P1", 1, 50.0, 60.0), &expected(50.0)).unwrap();
        assert!(other.pressure_anomaly, "60 psi is a 40% drop against the default reference");
    }

    #[test]
    fn test_non_finite_inputs_rejected() {
        let mut r = reading("P1", 1, 50.0, 100.0);
        r.pressure = f64::INFINITY;
        let err = checker().evaluate(&r, &expected(50.0)).unwrap_err();
        assert_eq!(err.field, "pressure");

        let err = checker()
            .evaluate(&reading("P1", 1, 50.0, 100.0), &expected(f64::NAN))
            .unwrap_err();
        assert_eq!(err.field, "expected_flow");
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let c = checker();
        let r = reading("P1", 7, 61.3, 91.2);
        let e = expected(49.7);
        assert_eq!(c.evaluate(&r, &e).unwrap(), c.evaluate(&r, &e).unwrap());
    }
}
