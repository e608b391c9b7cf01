//! System-wide default constants.
//!
//! Unit conversions and fixed values that are not operator-tunable.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Units
// ============================================================================

/// Pascals to pounds per square inch.
pub const PA_TO_PSI: f64 = 0.000145038;

/// Litres per minute to cubic metres per second.
pub const LPM_TO_M3_PER_S: f64 = 1.0 / 60_000.0;

// ============================================================================
// Estimator
// ============================================================================

/// Version of the persisted model format. Bumped on incompatible changes.
pub const MODEL_SCHEMA_VERSION: u32 = 1;

/// Default file the `train` subcommand writes the model to.
pub const DEFAULT_MODEL_PATH: &str = "leakwatch-model.json";

/// Pivot magnitude below which the normal equations are treated as singular.
pub const SINGULAR_PIVOT_EPSILON: f64 = 1e-10;

// ============================================================================
// Localization
// ============================================================================

/// Maximum candidates reported per LEAK decision.
pub const MAX_LOCALIZATION_CANDIDATES: usize = 10;

// ============================================================================
// Simulation
// ============================================================================

/// Sampling interval of generated readings (seconds).
pub const SIMULATION_INTERVAL_SECS: u64 = 60;

/// Baseline flow of a healthy simulated segment (L/min).
pub const SIMULATION_BASE_FLOW_LPM: f64 = 50.0;
