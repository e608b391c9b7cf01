//! Segment Calibration Store - per-segment online baseline correction
//!
//! Every decided reading leaves its flow residual (observed − raw expected)
//! in a bounded per-segment window. When a segment's window is full, steady
//! (variance below threshold) and free of LEAK decisions, the residual mean
//! becomes the segment's baseline offset and is added to future expectations.
//!
//! ## Rules
//!
//! - Offsets are replaced, never accumulated: `offset = mean(window)`
//! - A single LEAK decision anywhere in the window blocks recalibration, so a
//!   real leak is never absorbed into the baseline
//! - Records are created lazily and only removed by an explicit `reset`
//! - `record_at` enforces strictly increasing timestamps per segment
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = CalibrationStore::new(config.calibration.clone());
//! store.record_at(&segment, timestamp, residual, status == Status::Leak)?;
//! let offset = store.offset_for(&segment);
//! ```

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CalibrationConfig;
use crate::types::SegmentId;

// ============================================================================
// Error Types
// ============================================================================

/// Calibration misuse: out-of-order records or operator actions on empty state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("Out-of-order record for segment {segment}: timestamp {timestamp} is before {last}")]
    OutOfOrder {
        segment: SegmentId,
        last: u64,
        timestamp: u64,
    },

    #[error("No residuals recorded for segment {0}")]
    NoResiduals(SegmentId),

    #[error("Segment {segment} has {leak_entries} LEAK decision(s) in its calibration window")]
    LeakInWindow { segment: SegmentId, leak_entries: usize },

    #[error("Non-finite residual {value} for segment {segment}")]
    NonFiniteResidual { segment: SegmentId, value: f64 },
}

// ============================================================================
// Calibration Record
// ============================================================================

/// One residual in a segment's window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualEntry {
    /// observed − raw expected flow (L/min)
    pub residual: f64,
    /// The decision for this reading was LEAK
    pub leak_flagged: bool,
}

/// Rolling residual window and applied offset for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    window: VecDeque<ResidualEntry>,
    capacity: usize,
    /// LEAK-flagged entries currently inside the window
    leak_entries: usize,
    mean: f64,
    variance: f64,
    offset: f64,
    last_timestamp: Option<u64>,
    calibrations_applied: u32,
}

impl CalibrationRecord {
    fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            leak_entries: 0,
            mean: 0.0,
            variance: 0.0,
            offset: 0.0,
            last_timestamp: None,
            calibrations_applied: 0,
        }
    }

    fn push(&mut self, entry: ResidualEntry) {
        if self.window.len() == self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                if evicted.leak_flagged {
                    self.leak_entries -= 1;
                }
            }
        }
        if entry.leak_flagged {
            self.leak_entries += 1;
        }
        self.window.push_back(entry);

        self.mean = self.window.iter().map(|e| e.residual).mean();
        self.variance = if self.window.len() > 1 {
            self.window.iter().map(|e| e.residual).population_variance()
        } else {
            0.0
        };
    }

    /// Residuals in arrival order, oldest first
    pub fn window(&self) -> impl Iterator<Item = &ResidualEntry> {
        self.window.iter()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.window.len() == self.capacity
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance of the window
    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    pub fn calibrations_applied(&self) -> u32 {
        self.calibrations_applied
    }

    /// True when at least one window entry came from a LEAK decision
    pub fn has_leak_in_window(&self) -> bool {
        self.leak_entries > 0
    }
}

// ============================================================================
// Calibration Store
// ============================================================================

/// Snapshot of one segment's calibration state, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub segment: SegmentId,
    pub samples: usize,
    pub window_size: usize,
    pub mean: f64,
    pub variance: f64,
    pub offset: f64,
    pub calibrations_applied: u32,
    pub leak_in_window: bool,
}

/// Keyed-by-segment calibration state for one run.
///
/// The only mutable state shared across readings. Owned by the driver and
/// handed to the fusion engine by `&mut`.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    config: CalibrationConfig,
    records: HashMap<SegmentId, CalibrationRecord>,
}

impl CalibrationStore {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Append a residual without timestamp ordering checks.
    ///
    /// Returns the new offset when this record triggered a recalibration.
    pub fn record(
        &mut self,
        segment: &SegmentId,
        residual: f64,
        leak_flagged: bool,
    ) -> Result<Option<f64>, CalibrationError> {
        if !residual.is_finite() {
            return Err(CalibrationError::NonFiniteResidual {
                segment: segment.clone(),
                value: residual,
            });
        }
        let capacity = self.config.window_size;
        let record = self
            .records
            .entry(segment.clone())
            .or_insert_with(|| CalibrationRecord::new(capacity));
        record.push(ResidualEntry {
            residual,
            leak_flagged,
        });
        Ok(Self::try_calibrate(&self.config, segment, record))
    }

    /// Append a residual, rejecting a timestamp earlier than the segment's
    /// last one. A repeated timestamp is accepted.
    pub fn record_at(
        &mut self,
        segment: &SegmentId,
        timestamp: u64,
        residual: f64,
        leak_flagged: bool,
    ) -> Result<Option<f64>, CalibrationError> {
        if let Some(last) = self.records.get(segment).and_then(CalibrationRecord::last_timestamp) {
            if timestamp < last {
                return Err(CalibrationError::OutOfOrder {
                    segment: segment.clone(),
                    last,
                    timestamp,
                });
            }
        }
        let applied = self.record(segment, residual, leak_flagged)?;
        if let Some(record) = self.records.get_mut(segment) {
            record.last_timestamp = Some(timestamp);
        }
        Ok(applied)
    }

    fn try_calibrate(
        config: &CalibrationConfig,
        segment: &SegmentId,
        record: &mut CalibrationRecord,
    ) -> Option<f64> {
        if !record.is_full() {
            return None;
        }
        if record.has_leak_in_window() {
            debug!(segment = %segment, "LEAK in calibration window, offset held");
            return None;
        }
        if record.variance >= config.variance_threshold {
            return None;
        }
        let previous = record.offset;
        record.offset = record.mean;
        record.calibrations_applied += 1;
        if (record.offset - previous).abs() > f64::EPSILON {
            info!(
                segment = %segment,
                previous = previous,
                offset = record.offset,
                variance = record.variance,
                "Calibration offset updated"
            );
        }
        Some(record.offset)
    }

    /// Current baseline offset for a segment, 0.0 when never calibrated.
    pub fn offset_for(&self, segment: &SegmentId) -> f64 {
        self.records.get(segment).map(|r| r.offset).unwrap_or(0.0)
    }

    pub fn get(&self, segment: &SegmentId) -> Option<&CalibrationRecord> {
        self.records.get(segment)
    }

    /// Apply the current window mean immediately, regardless of fill level
    /// or variance. Operator action. Refused while the window holds a LEAK
    /// decision.
    pub fn force_calibrate(&mut self, segment: &SegmentId) -> Result<f64, CalibrationError> {
        let record = self
            .records
            .get_mut(segment)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| CalibrationError::NoResiduals(segment.clone()))?;
        if record.has_leak_in_window() {
            warn!(
                segment = %segment,
                leak_entries = record.leak_entries,
                "Forced calibration refused, LEAK in window"
            );
            return Err(CalibrationError::LeakInWindow {
                segment: segment.clone(),
                leak_entries: record.leak_entries,
            });
        }
        record.offset = record.mean;
        record.calibrations_applied += 1;
        info!(
            segment = %segment,
            offset = record.offset,
            samples = record.len(),
            "Calibration forced by operator"
        );
        Ok(record.offset)
    }

    /// Drop a segment's record. Returns true when one existed.
    pub fn reset(&mut self, segment: &SegmentId) -> bool {
        let existed = self.records.remove(segment).is_some();
        if existed {
            info!(segment = %segment, "Calibration reset");
        }
        existed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Status of every segment, sorted by segment id.
    pub fn status(&self) -> Vec<CalibrationStatus> {
        let mut out: Vec<CalibrationStatus> = self
            .records
            .iter()
            .map(|(segment, r)| CalibrationStatus {
                segment: segment.clone(),
                samples: r.len(),
                window_size: r.capacity,
                mean: r.mean,
                variance: r.variance,
                offset: r.offset,
                calibrations_applied: r.calibrations_applied,
                leak_in_window: r.has_leak_in_window(),
            })
            .collect();
        out.sort_by(|a, b| a.segment.cmp(&b.segment));
        out
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store(window_size: usize) -> CalibrationStore {
        CalibrationStore::new(CalibrationConfig {
            window_size,
            variance_threshold: 1.0,
        })
    }

    fn seg() -> SegmentId {
        SegmentId::new("Z1_B1_P1")
    }

    #[test]
    fn test_offset_defaults_to_zero() {
        let store = store(20);
        assert_eq!(store.offset_for(&seg()), 0.0);
        assert!(store.get(&seg()).is_none());
    }

    #[test]
    fn test_steady_bias_becomes_offset_once_window_full() {
        let mut store = store(20);
        for i in 0..19 {
            let applied = store.record(&seg(), 5.0 + (i % 3) as f64 * 0.25, false).unwrap();
            assert!(applied.is_none(), "window not yet full at sample {i}");
        }
        assert_eq!(store.offset_for(&seg()), 0.0);

        let applied = store.record(&seg(), 5.25, false).unwrap();
        let offset = applied.expect("full steady window should calibrate");
        assert!((offset - 5.25).abs() < 0.1, "offset {offset}");
        assert_eq!(store.offset_for(&seg()), offset);
        assert_eq!(store.get(&seg()).unwrap().calibrations_applied(), 1);
    }

    #[test]
    fn test_offset_replaced_not_accumulated() {
        let mut store = store(5);
        for _ in 0..5 {
            store.record(&seg(), 4.0, false).unwrap();
        }
        assert_eq!(store.offset_for(&seg()), 4.0);
        for _ in 0..5 {
            store.record(&seg(), 4.0, false).unwrap();
        }
        assert_eq!(store.offset_for(&seg()), 4.0, "offset must not grow to 8.0");
    }

    #[test]
    fn test_leak_in_window_blocks_calibration() {
        let mut store = store(5);
        store.record(&seg(), 3.0, true).unwrap();
        for _ in 0..4 {
            assert!(store.record(&seg(), 3.0, false).unwrap().is_none());
        }
        assert_eq!(store.offset_for(&seg()), 0.0);
        assert!(store.get(&seg()).unwrap().has_leak_in_window());

        // LEAK entry evicted on the next record
        let applied = store.record(&seg(), 3.0, false).unwrap();
        assert_eq!(applied, Some(3.0));
        assert!(!store.get(&seg()).unwrap().has_leak_in_window());
    }

    #[test]
    fn test_noisy_window_does_not_calibrate() {
        let mut store = store(4);
        for r in [0.0, 10.0, -10.0, 5.0, -5.0, 8.0] {
            store.record(&seg(), r, false).unwrap();
        }
        assert_eq!(store.offset_for(&seg()), 0.0);
        assert!(store.get(&seg()).unwrap().variance() > 1.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut store = store(3);
        for r in [1.0, 2.0, 3.0, 4.0, 5.0] {
            store.record(&seg(), r, false).unwrap();
        }
        let record = store.get(&seg()).unwrap();
        assert_eq!(record.len(), 3);
        let residuals: Vec<f64> = record.window().map(|e| e.residual).collect();
        assert_eq!(residuals, vec![3.0, 4.0, 5.0]);
        assert!((record.mean() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_record_at_rejects_out_of_order() {
        let mut store = store(20);
        store.record_at(&seg(), 100, 1.0, false).unwrap();
        let err = store.record_at(&seg(), 50, 1.0, false).unwrap_err();
        assert!(matches!(err, CalibrationError::OutOfOrder { last: 100, timestamp: 50, .. }));
        assert_eq!(store.get(&seg()).unwrap().len(), 1, "rejected records must not be stored");

        // A repeated timestamp is not a replay
        store.record_at(&seg(), 100, 2.0, false).unwrap();
        assert_eq!(store.get(&seg()).unwrap().len(), 2);
        assert_eq!(store.get(&seg()).unwrap().last_timestamp(), Some(100));

        // Other segments have independent clocks
        store.record_at(&SegmentId::new("Z2_B1_P1"), 10, 1.0, false).unwrap();
    }

    #[test]
    fn test_non_finite_residual_rejected() {
        let mut store = store(20);
        let err = store.record(&seg(), f64::NAN, false).unwrap_err();
        assert!(matches!(err, CalibrationError::NonFiniteResidual { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_force_calibrate_and_reset() {
        let mut store = store(20);
        assert_eq!(
            store.force_calibrate(&seg()),
            Err(CalibrationError::NoResiduals(seg()))
        );

        store.record(&seg(), 2.0, false).unwrap();
        store.record(&seg(), 4.0, false).unwrap();
        assert_eq!(store.force_calibrate(&seg()), Ok(3.0));
        assert_eq!(store.offset_for(&seg()), 3.0);

        assert!(store.reset(&seg()));
        assert_eq!(store.offset_for(&seg()), 0.0);
        assert!(!store.reset(&seg()));
    }

    #[test]
    fn test_force_calibrate_refused_with_leak_in_window() {
        let mut store = store(20);
        store.record(&seg(), 10.0, false).unwrap();
        store.record(&seg(), 10.0, true).unwrap();
        assert_eq!(
            store.force_calibrate(&seg()),
            Err(CalibrationError::LeakInWindow {
                segment: seg(),
                leak_entries: 1
            })
        );
        assert_eq!(store.offset_for(&seg()), 0.0);
        assert_eq!(store.get(&seg()).unwrap().calibrations_applied(), 0);
    }

    #[test]
    fn test_status_sorted_by_segment() {
        let mut store = store(20);
        store.record(&SegmentId::new("B"), 1.0, false).unwrap();
        store.record(&SegmentId::new("A"), 1.0, true).unwrap();
        let status = store.status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].segment.as_str(), "A");
        assert!(status[0].leak_in_window);
        assert_eq!(status[1].window_size, 20);
    }
}
