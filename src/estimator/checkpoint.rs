//! Expected-flow model persistence.
//!
//! Models are stored as JSON with a schema version, the feature layout they
//! were trained on and an MD5 checksum over the exact parameter bits, so a
//! restored model predicts bit-identically or fails to load.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{EstimatorError, LinearFlowModel, TrainingReport};
use crate::config::defaults::MODEL_SCHEMA_VERSION;
use crate::types::FEATURE_NAMES;

/// On-disk form of a trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    /// Format version for compatibility checks.
    pub schema_version: u32,
    /// Feature order the weights apply to.
    pub features: Vec<String>,
    pub model: LinearFlowModel,
    /// MD5 over the weight and intercept bit patterns.
    pub checksum: String,
    /// RFC 3339 time the checkpoint was written.
    pub trained_at: String,
    #[serde(default)]
    pub report: Option<TrainingReport>,
}

impl ModelCheckpoint {
    pub fn new(model: LinearFlowModel, report: Option<TrainingReport>) -> Self {
        Self {
            schema_version: MODEL_SCHEMA_VERSION,
            features: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            model,
            checksum: parameter_checksum(&model),
            trained_at: Utc::now().to_rfc3339(),
            report,
        }
    }

    /// Check version, feature layout and checksum.
    pub fn verify(&self) -> Result<(), EstimatorError> {
        if self.schema_version != MODEL_SCHEMA_VERSION {
            return Err(EstimatorError::SchemaMismatch(
                self.schema_version,
                MODEL_SCHEMA_VERSION,
            ));
        }
        if self.features.len() != FEATURE_NAMES.len()
            || self.features.iter().zip(FEATURE_NAMES.iter()).any(|(a, b)| a != b)
        {
            return Err(EstimatorError::FeatureMismatch(self.features.clone()));
        }
        let computed = parameter_checksum(&self.model);
        if computed != self.checksum {
            return Err(EstimatorError::ChecksumMismatch {
                stored: self.checksum.clone(),
                computed,
            });
        }
        Ok(())
    }
}

/// Hex MD5 digest of the model parameters' IEEE-754 bit patterns.
pub fn parameter_checksum(model: &LinearFlowModel) -> String {
    let mut bytes = Vec::with_capacity((model.weights.len() + 1) * 8);
    for w in model.weights.iter().chain(std::iter::once(&model.intercept)) {
        bytes.extend_from_slice(&w.to_bits().to_le_bytes());
    }
    format!("{:x}", md5::compute(&bytes))
}

/// Save a model atomically (write temp file, then rename).
pub fn save_model(
    model: &LinearFlowModel,
    report: Option<&TrainingReport>,
    path: &Path,
) -> Result<(), EstimatorError> {
    let checkpoint = ModelCheckpoint::new(*model, report.cloned());
    let json = serde_json::to_string_pretty(&checkpoint)?;

    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    info!(path = %path.display(), checksum = %checkpoint.checksum, "Model saved");
    Ok(())
}

/// Load and verify a model.
pub fn load_model(path: &Path) -> Result<ModelCheckpoint, EstimatorError> {
    let data = std::fs::read(path)?;
    let checkpoint: ModelCheckpoint = serde_json::from_slice(&data)?;
    checkpoint.verify()?;
    info!(
        path = %path.display(),
        trained_at = %checkpoint.trained_at,
        "Model loaded"
    );
    Ok(checkpoint)
}
