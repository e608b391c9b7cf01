//! Leak Detection Configuration - all tuning constants as operator-tunable TOML values
//!
//! Each struct implements `Default` with the values the detector was tuned
//! with, so behaviour is unchanged when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::SegmentId;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "LEAKWATCH_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "leakwatch.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a monitored water network.
///
/// Load with `LeakConfig::load()` which searches:
/// 1. `$LEAKWATCH_CONFIG` env var
/// 2. `./leakwatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeakConfig {
    /// Network identification
    #[serde(default)]
    pub network: NetworkInfo,

    /// Flow / pressure tolerances and persistence
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Confidence scoring weights
    #[serde(default)]
    pub confidence_weights: ConfidenceWeights,

    /// Per-segment online calibration
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Friction model coefficients
    #[serde(default)]
    pub physics: PhysicsConfig,

    /// Candidate ranking weights
    #[serde(default)]
    pub localization: LocalizationConfig,

    /// Expected-flow model training
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Per-segment topology and pipe coefficients
    #[serde(default)]
    pub segments: Vec<SegmentConfig>,
}

impl LeakConfig {
    /// Load configuration using the standard search order:
    /// 1. `$LEAKWATCH_CONFIG` environment variable
    /// 2. `./leakwatch.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), network = %config.network.name, "Loaded config from LEAKWATCH_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from LEAKWATCH_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "LEAKWATCH_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(network = %config.network.name, "Loaded config from ./leakwatch.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./leakwatch.toml, using defaults");
                }
            }
        }

        info!("No leakwatch.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys only produce warnings; validation failures are errors.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the configuration to a TOML file (temp file, then rename).
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, contents).map_err(|e| ConfigError::Io(tmp_path.clone(), e))?;
        std::fs::rename(&tmp_path, path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Look up the configured coefficients for a segment, if any.
    pub fn segment(&self, id: &SegmentId) -> Option<&SegmentConfig> {
        self.segments.iter().find(|s| &s.id == id)
    }

    /// Validate all values, collecting every problem rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let d = &self.detection;

        Self::check_fraction(d.deviation_tolerance, "detection.deviation_tolerance", &mut errors);
        Self::check_fraction(d.pressure_tolerance, "detection.pressure_tolerance", &mut errors);
        Self::check_positive(d.deviation_saturation, "detection.deviation_saturation", &mut errors);
        Self::check_positive(d.min_expected_flow, "detection.min_expected_flow", &mut errors);
        if d.persistence_requirement == 0 {
            errors.push("detection.persistence_requirement must be >= 1".to_string());
        }

        let w = &self.confidence_weights;
        Self::check_weights(
            &[w.deviation, w.agreement, w.persistence],
            "confidence_weights",
            &mut errors,
        );

        let c = &self.calibration;
        if c.window_size < 2 {
            errors.push(format!(
                "calibration.window_size ({}) must be >= 2 to measure variance",
                c.window_size
            ));
        }
        Self::check_positive(c.variance_threshold, "calibration.variance_threshold", &mut errors);

        let p = &self.physics;
        Self::check_positive(p.water_density_kg_m3, "physics.water_density_kg_m3", &mut errors);
        Self::check_positive(p.friction_scale, "physics.friction_scale", &mut errors);
        Self::check_positive(p.default_roughness, "physics.default_roughness", &mut errors);
        Self::check_positive(p.default_length_m, "physics.default_length_m", &mut errors);
        Self::check_positive(p.default_diameter_m, "physics.default_diameter_m", &mut errors);
        Self::check_positive(p.reference_pressure_psi, "physics.reference_pressure_psi", &mut errors);

        let l = &self.localization;
        Self::check_weights(
            &[l.deviation_weight, l.directional_weight, l.recency_weight],
            "localization",
            &mut errors,
        );
        Self::check_fraction(l.consumption_bonus, "localization.consumption_bonus", &mut errors);

        let e = &self.estimator;
        if !e.holdout_fraction.is_finite() || e.holdout_fraction < 0.0 || e.holdout_fraction >= 1.0 {
            errors.push(format!(
                "estimator.holdout_fraction ({}) must be in [0, 1)",
                e.holdout_fraction
            ));
        }

        for (i, s) in self.segments.iter().enumerate() {
            let name = format!("segments[{i}] ({})", s.id);
            for (field, value) in [
                ("length_m", s.length_m),
                ("diameter_m", s.diameter_m),
                ("roughness", s.roughness),
                ("reference_pressure_psi", s.reference_pressure_psi),
            ] {
                if let Some(v) = value {
                    Self::check_positive(v, &format!("{name}.{field}"), &mut errors);
                }
            }
            if self.segments[..i].iter().any(|other| other.id == s.id) {
                errors.push(format!("{name}: duplicate segment id"));
            }
        }

        // Physical range validation
        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_fraction(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            errors.push(format!("{name} ({value}) must be in (0, 1]"));
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} ({value}) must be a finite value > 0"));
        }
    }

    fn check_weights(weights: &[f64], name: &str, errors: &mut Vec<String>) {
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            errors.push(format!("{name}: weights must be finite and non-negative"));
            return;
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 0.01 {
            errors.push(format!("{name}: weights sum to {sum:.3}, expected 1.0 (±0.01)"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Network Info
// ============================================================================

/// Identification metadata. Not used for logic; appears in logs and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(default = "default_network_name")]
    pub name: String,

    #[serde(default)]
    pub operator: String,
}

fn default_network_name() -> String { "Unnamed Network".to_string() }

impl Default for NetworkInfo {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            operator: String::new(),
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

/// Tolerances and persistence for the fusion decision table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Relative flow deviation above which the conservation check fires.
    #[serde(default = "default_deviation_tolerance")]
    pub deviation_tolerance: f64,

    /// Relative pressure shortfall below the friction model that counts as a drop.
    #[serde(default = "default_pressure_tolerance")]
    pub pressure_tolerance: f64,

    /// Consecutive readings with both signals firing required for LEAK.
    #[serde(default = "default_persistence_requirement")]
    pub persistence_requirement: u32,

    /// Relative deviation at which the confidence deviation term saturates.
    #[serde(default = "default_deviation_saturation")]
    pub deviation_saturation: f64,

    /// Floor for the expected flow when computing relative deviation (L/min).
    #[serde(default = "default_min_expected_flow")]
    pub min_expected_flow: f64,
}

fn default_deviation_tolerance() -> f64 { 0.15 }
fn default_pressure_tolerance() -> f64 { 0.10 }
fn default_persistence_requirement() -> u32 { 2 }
fn default_deviation_saturation() -> f64 { 0.5 }
fn default_min_expected_flow() -> f64 { 1.0 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            deviation_tolerance: default_deviation_tolerance(),
            pressure_tolerance: default_pressure_tolerance(),
            persistence_requirement: default_persistence_requirement(),
            deviation_saturation: default_deviation_saturation(),
            min_expected_flow: default_min_expected_flow(),
        }
    }
}

// ============================================================================
// Confidence Weights
// ============================================================================

/// Weights of the three confidence terms. Must sum to approximately 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    /// Relative deviation magnitude
    #[serde(default = "default_weight_deviation")]
    pub deviation: f64,

    /// Bonus when flow and pressure signals both fire
    #[serde(default = "default_weight_agreement")]
    pub agreement: f64,

    /// Consecutive anomalous readings, with diminishing increments
    #[serde(default = "default_weight_persistence")]
    pub persistence: f64,
}

fn default_weight_deviation() -> f64 { 0.5 }
fn default_weight_agreement() -> f64 { 0.3 }
fn default_weight_persistence() -> f64 { 0.2 }

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            deviation: default_weight_deviation(),
            agreement: default_weight_agreement(),
            persistence: default_weight_persistence(),
        }
    }
}

// ============================================================================
// Calibration
// ============================================================================

/// Parameters controlling per-segment baseline calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Number of most recent residuals kept per segment.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Window variance (L/min²) below which the residual is treated as steady bias.
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,
}

fn default_window_size() -> usize { 20 }
fn default_variance_threshold() -> f64 { 1.0 }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            variance_threshold: default_variance_threshold(),
        }
    }
}

// ============================================================================
// Physics
// ============================================================================

/// Friction model coefficients and network-wide pipe defaults.
///
/// Segment entries in `[[segments]]` override the pipe defaults per segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    #[serde(default = "default_density")]
    pub water_density_kg_m3: f64,

    /// Friction factor = roughness × friction_scale
    #[serde(default = "default_friction_scale")]
    pub friction_scale: f64,

    #[serde(default = "default_roughness")]
    pub default_roughness: f64,

    #[serde(default = "default_length")]
    pub default_length_m: f64,

    #[serde(default = "default_diameter")]
    pub default_diameter_m: f64,

    /// Pressure at the segment inlet that drops are measured from (PSI).
    #[serde(default = "default_reference_pressure")]
    pub reference_pressure_psi: f64,
}

fn default_density() -> f64 { 1000.0 }
fn default_friction_scale() -> f64 { 0.1 }
fn default_roughness() -> f64 { 0.01 }
fn default_length() -> f64 { 1000.0 }
fn default_diameter() -> f64 { 0.3 }
fn default_reference_pressure() -> f64 { 100.0 }

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            water_density_kg_m3: default_density(),
            friction_scale: default_friction_scale(),
            default_roughness: default_roughness(),
            default_length_m: default_length(),
            default_diameter_m: default_diameter(),
            reference_pressure_psi: default_reference_pressure(),
        }
    }
}

// ============================================================================
// Localization
// ============================================================================

/// Candidate scoring weights for leak localization. Weights must sum to ~1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationConfig {
    #[serde(default = "default_loc_deviation")]
    pub deviation_weight: f64,

    #[serde(default = "default_loc_directional")]
    pub directional_weight: f64,

    #[serde(default = "default_loc_recency")]
    pub recency_weight: f64,

    /// Directional score for a downstream segment showing both pressure loss
    /// and a flow increase (consumption rather than loss).
    #[serde(default = "default_consumption_bonus")]
    pub consumption_bonus: f64,
}

fn default_loc_deviation() -> f64 { 0.5 }
fn default_loc_directional() -> f64 { 0.3 }
fn default_loc_recency() -> f64 { 0.2 }
fn default_consumption_bonus() -> f64 { 0.25 }

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            deviation_weight: default_loc_deviation(),
            directional_weight: default_loc_directional(),
            recency_weight: default_loc_recency(),
            consumption_bonus: default_consumption_bonus(),
        }
    }
}

// ============================================================================
// Estimator
// ============================================================================

/// Expected-flow model training parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Fraction of normal rows held out to report generalisation metrics.
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,

    /// Seed for the holdout shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Below this many rows the model fits on everything and skips the holdout.
    #[serde(default = "default_min_rows_for_holdout")]
    pub min_rows_for_holdout: usize,
}

fn default_holdout_fraction() -> f64 { 0.3 }
fn default_seed() -> u64 { 42 }
fn default_min_rows_for_holdout() -> usize { 20 }

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            holdout_fraction: default_holdout_fraction(),
            seed: default_seed(),
            min_rows_for_holdout: default_min_rows_for_holdout(),
        }
    }
}

// ============================================================================
// Segments
// ============================================================================

/// Per-segment topology and pipe coefficients.
///
/// Unset coefficients fall back to the `[physics]` defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub id: SegmentId,

    /// Upstream junction
    #[serde(default)]
    pub from: Option<String>,

    /// Downstream junction
    #[serde(default)]
    pub to: Option<String>,

    #[serde(default)]
    pub length_m: Option<f64>,

    #[serde(default)]
    pub diameter_m: Option<f64>,

    #[serde(default)]
    pub roughness: Option<f64>,

    #[serde(default)]
    pub reference_pressure_psi: Option<f64>,
}

// ============================================================================
// Tests
// ============================================================================
