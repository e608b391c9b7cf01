//! Sensor reading types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of a modeled pipe section between two junctions.
///
/// Ordered lexicographically; the localizer relies on this ordering to break
/// ties deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SegmentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A reading field that was not a finite number.
///
/// Local to the offending reading: the reading is reported as undetermined
/// and processing of later readings continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("invalid input on segment '{segment}': {field} = {value} is not a finite number")]
pub struct InvalidInputError {
    pub segment: SegmentId,
    pub field: String,
    pub value: f64,
}

impl InvalidInputError {
    pub fn new(segment: &SegmentId, field: &str, value: f64) -> Self {
        Self {
            segment: segment.clone(),
            field: field.to_string(),
            value,
        }
    }
}

/// One timestamped observation of a pipe segment.
///
/// Produced by the external data source and consumed read-only by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub segment_id: SegmentId,
    /// Unix seconds; strictly increasing per segment
    pub timestamp: u64,
    /// Line pressure (PSI)
    pub pressure: f64,
    /// Observed flow rate (L/min)
    pub flow_rate: f64,
    /// Water temperature (°C)
    pub temperature: f64,
    /// Pump/pipe vibration (mm/s RMS)
    pub vibration: f64,
    /// Rotational speed of the feeding pump (RPM)
    pub rpm: f64,
    /// Cumulative operational hours of the segment's equipment
    pub operational_hours: f64,
    /// Ground-truth leak flag, for evaluation only. Never read by the decision logic.
    #[serde(default)]
    pub leak_flag: Option<bool>,
    /// Supply zone the segment draws from (topology source node)
    #[serde(default)]
    pub zone: Option<String>,
    /// Block the segment feeds (topology target node)
    #[serde(default)]
    pub block: Option<String>,
}

impl Reading {
    /// Check that every numeric field is finite.
    ///
    /// Returns the first offending field in declaration order.
    pub fn validate(&self) -> Result<(), InvalidInputError> {
        let fields = [
            ("pressure", self.pressure),
            ("flow_rate", self.flow_rate),
            ("temperature", self.temperature),
            ("vibration", self.vibration),
            ("rpm", self.rpm),
            ("operational_hours", self.operational_hours),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, value)) => Err(InvalidInputError::new(&self.segment_id, name, *value)),
            None => Ok(()),
        }
    }

    /// Regression features in the estimator's fixed order.
    pub fn features(&self) -> FeatureVector {
        FeatureVector([
            self.pressure,
            self.temperature,
            self.rpm,
            self.operational_hours,
            self.vibration,
        ])
    }

    /// True when ground truth is present and marks a leak.
    pub fn is_labeled_leak(&self) -> bool {
        self.leak_flag == Some(true)
    }
}

/// Number of regression features
pub const NUM_FEATURES: usize = 5;

/// Feature names, matching the order of `FeatureVector`
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "pressure",
    "temperature",
    "rpm",
    "operational_hours",
    "vibration",
];

/// Fixed ordered tuple {pressure, temperature, rotational speed, operational hours, vibration}.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; NUM_FEATURES]);

impl FeatureVector {
    pub fn values(&self) -> &[f64; NUM_FEATURES] {
        &self.0
    }

    /// Check every feature is finite, naming the first offender.
    pub fn validate(&self, segment: &SegmentId) -> Result<(), InvalidInputError> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.0.iter()) {
            if !value.is_finite() {
                return Err(InvalidInputError::new(segment, name, *value));
            }
        }
        Ok(())
    }
}
