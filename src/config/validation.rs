//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for LeakConfig.
///
/// Kept in step with the struct hierarchy in leak_config.rs. Keys inside
/// `[[segments]]` entries appear as `segments.<field>`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [network]
        "network",
        "network.name",
        "network.operator",
        // [detection]
        "detection",
        "detection.deviation_tolerance",
        "detection.pressure_tolerance",
        "detection.persistence_requirement",
        "detection.deviation_saturation",
        "detection.min_expected_flow",
        // [confidence_weights]
        "confidence_weights",
        "confidence_weights.deviation",
        "confidence_weights.agreement",
        "confidence_weights.persistence",
        // [calibration]
        "calibration",
        "calibration.window_size",
        "calibration.variance_threshold",
        // [physics]
        "physics",
        "physics.water_density_kg_m3",
        "physics.friction_scale",
        "physics.default_roughness",
        "physics.default_length_m",
        "physics.default_diameter_m",
        "physics.reference_pressure_psi",
        // [localization]
        "localization",
        "localization.deviation_weight",
        "localization.directional_weight",
        "localization.recency_weight",
        "localization.consumption_bonus",
        // [estimator]
        "estimator",
        "estimator.holdout_fraction",
        "estimator.seed",
        "estimator.min_rows_for_holdout",
        // [[segments]]
        "segments",
        "segments.id",
        "segments.from",
        "segments.to",
        "segments.length_m",
        "segments.diameter_m",
        "segments.roughness",
        "segments.reference_pressure_psi",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`. Arrays of tables contribute their entries' keys
/// under the array's own path, deduplicated.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        for nested in walk_toml_keys(item, &path) {
                            if !keys.contains(&nested) {
                                keys.push(nested);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 {
            if let Some((_, best_dist)) = best {
                if dist < best_dist {
                    best = Some((k, dist));
                }
            } else {
                best = Some((k, dist));
            }
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns. Existing configs
/// always continue to work.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let found = walk_toml_keys(&value, "");
    let mut warnings = Vec::new();

    for key in &found {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(key, &known);
            let message = format!("Unknown config key '{key}'");
            warnings.push(ValidationWarning {
                field: key.clone(),
                message,
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Physical Range Validation
// ============================================================================

fn range_warning(field: &str, message: String) -> ValidationWarning {
    ValidationWarning {
        field: field.to_string(),
        message,
        suggestion: None,
    }
}

/// Validate physical ranges on a parsed LeakConfig.
///
/// Returns (errors, warnings): errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(
    config: &super::LeakConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let p = &config.physics;

    // Water density: anything outside 900-1100 kg/m³ is not water
    let rho = p.water_density_kg_m3;
    if rho < 900.0 || rho > 1100.0 {
        errors.push(format!(
            "physics.water_density_kg_m3 = {rho:.1} is outside physical range (900-1100 kg/m³)"
        ));
    }

    // Pipe diameter: 10 mm service lines to 5 m trunk mains
    let diameters = std::iter::once(("physics.default_diameter_m".to_string(), p.default_diameter_m))
        .chain(config.segments.iter().filter_map(|s| {
            s.diameter_m.map(|d| (format!("segments ({}).diameter_m", s.id), d))
        }));
    for (field, d) in diameters {
        if d < 0.01 || d > 5.0 {
            errors.push(format!(
                "{field} = {d:.3} is outside physical range (0.01-5 m)"
            ));
        }
    }

    // Reference pressure: distribution networks run roughly 20-150 psi
    let pressures = std::iter::once(("physics.reference_pressure_psi".to_string(), p.reference_pressure_psi))
        .chain(config.segments.iter().filter_map(|s| {
            s.reference_pressure_psi
                .map(|v| (format!("segments ({}).reference_pressure_psi", s.id), v))
        }));
    for (field, v) in pressures {
        if v < 20.0 || v > 150.0 {
            warnings.push(range_warning(
                &field,
                format!("{field} = {v:.1} is outside typical range (20-150 psi)"),
            ));
        }
    }

    // Roughness is dimensionless here; values above 1 make the friction model meaningless
    if p.default_roughness > 1.0 {
        warnings.push(range_warning(
            "physics.default_roughness",
            format!(
                "default_roughness = {:.3} is outside typical range (0-1)",
                p.default_roughness
            ),
        ));
    }

    let tol = config.detection.deviation_tolerance;
    if tol < 0.05 || tol > 0.5 {
        warnings.push(range_warning(
            "detection.deviation_tolerance",
            format!("deviation_tolerance = {tol:.2} is outside typical range (0.05-0.5)"),
        ));
    }

    if config.detection.persistence_requirement > 20 {
        warnings.push(range_warning(
            "detection.persistence_requirement",
            format!(
                "persistence_requirement = {} delays LEAK decisions by many readings",
                config.detection.persistence_requirement
            ),
        ));
    }

    if config.calibration.window_size > 1000 {
        warnings.push(range_warning(
            "calibration.window_size",
            format!(
                "calibration.window_size = {} makes offsets very slow to adapt",
                config.calibration.window_size
            ),
        ));
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
