//! 3-factor confidence scoring for fusion decisions

use crate::config::{ConfidenceWeights, DetectionConfig};
use crate::types::{PhysicsVerdict, Status};

/// Score confidence in a decided status.
///
/// NORMAL: full confidence at zero deviation, reduced by the deviation
/// weight as the deviation approaches the tolerance.
///
/// SUSPECT / LEAK: deviation 50%, signal agreement 30%, persistence 20%
/// (default weights). Non-decreasing in |deviation| for a fixed agreement
/// and streak.
pub fn score_confidence(
    status: Status,
    verdict: &PhysicsVerdict,
    anomaly_streak: u32,
    detection: &DetectionConfig,
    weights: &ConfidenceWeights,
) -> f64 {
    let score = match status {
        Status::Normal => {
            1.0 - weights.deviation * scaled(verdict.relative_deviation, detection.deviation_tolerance)
        }
        Status::Suspect | Status::Leak => {
            weights.deviation * scaled(verdict.relative_deviation, detection.deviation_saturation)
                + weights.agreement * score_agreement(verdict)
                + weights.persistence * score_persistence(anomaly_streak)
        }
    };
    score.clamp(0.0, 1.0)
}

/// |deviation| / scale, saturating at 1.0
fn scaled(deviation: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 1.0;
    }
    (deviation.abs() / scale).min(1.0)
}

/// Agreement: 1.0 when flow and pressure both fired
fn score_agreement(verdict: &PhysicsVerdict) -> f64 {
    if verdict.both_anomalous() {
        1.0
    } else {
        0.0
    }
}

/// Persistence: 1 − 0.5^streak, so each extra reading adds half the remaining gap
fn score_persistence(streak: u32) -> f64 {
    1.0 - 0.5_f64.powi(streak.min(64) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(deviation: f64, pressure_anomaly: bool) -> PhysicsVerdict {
        PhysicsVerdict {
            residual: deviation * 50.0,
            relative_deviation: deviation,
            conservation_violated: deviation.abs() > 0.15,
            expected_pressure_drop: 0.0,
            expected_pressure: 100.0,
            observed_pressure: if pressure_anomaly { 85.0 } else { 100.0 },
            pressure_deviation: if pressure_anomaly { -0.15 } else { 0.0 },
            pressure_anomaly,
            localized_effect: true,
        }
    }

    fn score(status: Status, v: &PhysicsVerdict, streak: u32) -> f64 {
        score_confidence(
            status,
            v,
            streak,
            &DetectionConfig::default(),
            &ConfidenceWeights::default(),
        )
    }

    #[test]
    fn test_normal_zero_deviation_is_certain() {
        assert_eq!(score(Status::Normal, &verdict(0.0, false), 0), 1.0);
    }

    #[test]
    fn test_normal_confidence_falls_toward_tolerance() {
        let near = score(Status::Normal, &verdict(0.14, false), 0);
        let far = score(Status::Normal, &verdict(0.02, false), 0);
        assert!(near < far);
        assert!(near >= 0.5);
    }

    #[test]
    fn test_persistent_agreeing_leak() {
        // 0.5 × 0.6 + 0.3 + 0.2 × 0.75
        let c = score(Status::Leak, &verdict(0.3, true), 2);
        assert!((c - 0.75).abs() < 1e-12, "confidence {c}");
    }

    #[test]
    fn test_anomalous_confidence_monotonic_in_deviation() {
        let mut previous = 0.0;
        for step in 0..40 {
            let deviation = 0.16 + step as f64 * 0.02;
            let c = score(Status::Suspect, &verdict(deviation, true), 1);
            assert!(c >= previous, "confidence dropped at deviation {deviation}");
            previous = c;
        }
        // Negative deviations are scored on magnitude
        assert_eq!(
            score(Status::Suspect, &verdict(-0.4, false), 1),
            score(Status::Suspect, &verdict(0.4, false), 1)
        );
    }

    #[test]
    fn test_confidence_always_in_unit_interval() {
        for &dev in &[0.0, 0.1, 0.5, 3.0, -7.0] {
            for status in [Status::Normal, Status::Suspect, Status::Leak] {
                for streak in [0, 1, 5, 1000] {
                    let c = score(status, &verdict(dev, true), streak);
                    assert!((0.0..=1.0).contains(&c));
                }
            }
        }
    }
}
