//! Fusion decision output types

use serde::{Deserialize, Serialize};

use super::{ExpectedFlow, PhysicsVerdict, SegmentId};

/// Decision status for a single reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Both signals silent
    Normal,
    /// One signal fired, or both fired but have not yet persisted
    Suspect,
    /// Both signals fired and persisted
    Leak,
}

impl Status {
    pub fn is_anomalous(&self) -> bool {
        !matches!(self, Status::Normal)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Normal => write!(f, "NORMAL"),
            Status::Suspect => write!(f, "SUSPECT"),
            Status::Leak => write!(f, "LEAK"),
        }
    }
}

/// One justification for a decision.
///
/// Closed set of kinds, each with the numeric values that drove it. Text is
/// produced only by the presentation layer (`report`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    /// |deviation| within tolerance
    FlowWithinTolerance { deviation: f64, tolerance: f64 },
    /// Observed flow above expectation beyond tolerance: water unaccounted for
    FlowExcess { observed: f64, expected: f64, deviation: f64 },
    /// Observed flow below expectation beyond tolerance: blockage or sensor fault
    FlowDeficit { observed: f64, expected: f64, deviation: f64 },
    /// Pressure within tolerance of the friction model
    PressureConsistent { observed: f64, expected: f64, deviation: f64 },
    /// Pressure below the friction model beyond tolerance
    PressureDrop { observed: f64, expected: f64, deviation: f64 },
    /// Flow and pressure signals both fired on this reading
    SignalsAgree,
    /// Both signals fired but not yet on enough consecutive readings
    AwaitingPersistence { streak: u32, required: u32 },
    /// Both signals fired on `streak` consecutive readings
    PersistentAnomaly { streak: u32 },
    /// Expected flow includes a learned baseline offset
    CalibrationApplied { offset: f64 },
    /// Anomaly confined to this segment
    LocalizedEffect,
    /// Adjacent upstream or sibling segments show a correlated anomaly
    NetworkWideEffect,
}

/// Decision for one reading: status, confidence and the reasons behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub segment_id: SegmentId,
    pub timestamp: u64,
    pub status: Status,
    /// Confidence in `status`, in [0, 1]
    pub confidence: f64,
    /// Ordered justification; never empty
    pub reasons: Vec<Reason>,
    /// Estimator output the decision was made against
    pub expected: ExpectedFlow,
    /// Physics checks the decision was made against
    pub verdict: PhysicsVerdict,
    /// Consecutive readings of this segment with at least one signal firing
    pub anomaly_streak: u32,
}

impl FusionResult {
    pub fn is_anomalous(&self) -> bool {
        self.status.is_anomalous()
    }

    /// Signed relative flow deviation against the calibrated expectation
    pub fn flow_deviation(&self) -> f64 {
        self.verdict.relative_deviation
    }
}
