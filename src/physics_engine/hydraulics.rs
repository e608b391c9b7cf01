//! Pipe hydraulics for water distribution segments
//!
//! Simplified steady-state relationships only:
//! - Mean flow velocity from volumetric flow and bore
//! - Darcy–Weisbach friction loss with a roughness-scaled friction factor
//! - Expected outlet pressure from a reference inlet pressure

use serde::{Deserialize, Serialize};

use crate::config::defaults::{LPM_TO_M3_PER_S, PA_TO_PSI};
use crate::config::{PhysicsConfig, SegmentConfig};

// ============================================================================
// Pipe Coefficients
// ============================================================================

/// Resolved physical description of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipeCoefficients {
    /// Pipe length (m)
    pub length_m: f64,
    /// Internal diameter (m)
    pub diameter_m: f64,
    /// Dimensionless roughness; friction factor = roughness × friction_scale
    pub roughness: f64,
    /// Inlet pressure the friction loss is subtracted from (PSI)
    pub reference_pressure_psi: f64,
}

impl PipeCoefficients {
    /// Network-wide defaults from `[physics]`
    pub fn from_defaults(physics: &PhysicsConfig) -> Self {
        Self {
            length_m: physics.default_length_m,
            diameter_m: physics.default_diameter_m,
            roughness: physics.default_roughness,
            reference_pressure_psi: physics.reference_pressure_psi,
        }
    }

    /// Segment overrides layered on the network defaults
    pub fn for_segment(physics: &PhysicsConfig, segment: &SegmentConfig) -> Self {
        let base = Self::from_defaults(physics);
        Self {
            length_m: segment.length_m.unwrap_or(base.length_m),
            diameter_m: segment.diameter_m.unwrap_or(base.diameter_m),
            roughness: segment.roughness.unwrap_or(base.roughness),
            reference_pressure_psi: segment
                .reference_pressure_psi
                .unwrap_or(base.reference_pressure_psi),
        }
    }

    /// Cross-sectional area of the bore (m²)
    pub fn area_m2(&self) -> f64 {
        let radius = self.diameter_m / 2.0;
        std::f64::consts::PI * radius * radius
    }
}

// ============================================================================
// Friction Loss
// ============================================================================

/// Mean flow velocity in m/s for a flow in L/min.
///
/// Returns 0.0 for a non-positive bore.
pub fn flow_velocity(flow_lpm: f64, pipe: &PipeCoefficients) -> f64 {
    let area = pipe.area_m2();
    if area <= 0.0 {
        return 0.0;
    }
    flow_lpm * LPM_TO_M3_PER_S / area
}

/// Friction pressure loss along the segment, in PSI.
///
/// Formula: ΔP = f × (L / D) × (ρ v² / 2)
///
/// Where:
/// - f = roughness × friction_scale
/// - L = pipe length (m), D = diameter (m)
/// - ρ = water density (kg/m³), v = mean velocity (m/s)
///
/// Loss is symmetric in flow direction.
pub fn friction_pressure_drop_psi(
    flow_lpm: f64,
    pipe: &PipeCoefficients,
    physics: &PhysicsConfig,
) -> f64 {
    if pipe.diameter_m <= 0.0 {
        return 0.0;
    }
    let velocity = flow_velocity(flow_lpm, pipe);
    let friction_factor = pipe.roughness * physics.friction_scale;
    let dynamic_pressure = physics.water_density_kg_m3 * velocity * velocity / 2.0;
    let drop_pa = friction_factor * (pipe.length_m / pipe.diameter_m) * dynamic_pressure;
    drop_pa * PA_TO_PSI
}

/// Pressure expected at the measurement point for a given flow, floored at 0.
pub fn expected_pressure_psi(flow_lpm: f64, pipe: &PipeCoefficients, physics: &PhysicsConfig) -> f64 {
    (pipe.reference_pressure_psi - friction_pressure_drop_psi(flow_lpm, pipe, physics)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_pipe() -> (PipeCoefficients, PhysicsConfig) {
        let physics = PhysicsConfig::default();
        (PipeCoefficients::from_defaults(&physics), physics)
    }

    #[test]
    fn test_velocity_for_default_bore() {
        let (pipe, _) = default_pipe();
        // 60 L/min = 0.001 m³/s over π·0.15² m²
        let v = flow_velocity(60.0, &pipe);
        assert!((v - 0.001 / (std::f64::consts::PI * 0.0225)).abs() < 1e-12);
    }

    #[test]
    fn test_friction_drop_known_value() {
        let (pipe, physics) = default_pipe();
        // f = 0.001, L/D = 3333.3, v ≈ 0.015326 m/s → ΔP ≈ 0.3915 Pa
        let drop = friction_pressure_drop_psi(65.0, &pipe, &physics);
        assert!((drop - 0.3915 * PA_TO_PSI).abs() < 1e-6, "drop {drop}");
    }

    #[test]
    fn test_friction_drop_grows_quadratically() {
        let (pipe, physics) = default_pipe();
        let d1 = friction_pressure_drop_psi(100.0, &pipe, &physics);
        let d2 = friction_pressure_drop_psi(200.0, &pipe, &physics);
        assert!((d2 / d1 - 4.0).abs() < 1e-9);
        assert_eq!(
            friction_pressure_drop_psi(-100.0, &pipe, &physics),
            d1,
            "loss must not depend on direction"
        );
    }

    #[test]
    fn test_expected_pressure_floored_at_zero() {
        let physics = PhysicsConfig::default();
        let pipe = PipeCoefficients {
            length_m: 5000.0,
            diameter_m: 0.02,
            roughness: 0.5,
            reference_pressure_psi: 10.0,
        };
        assert_eq!(expected_pressure_psi(5000.0, &pipe, &physics), 0.0);
    }

    #[test]
    fn test_segment_overrides_layer_on_defaults() {
        let physics = PhysicsConfig::default();
        let segment = SegmentConfig {
            id: "P1".into(),
            from: None,
            to: None,
            length_m: Some(250.0),
            diameter_m: None,
            roughness: None,
            reference_pressure_psi: Some(80.0),
        };
        let pipe = PipeCoefficients::for_segment(&physics, &segment);
        assert_eq!(pipe.length_m, 250.0);
        assert_eq!(pipe.diameter_m, 0.3);
        assert_eq!(pipe.reference_pressure_psi, 80.0);
    }
}
