//! Shared builders for unit tests

use crate::types::{Reading, SegmentId};

/// Reading with fixed auxiliary sensors and no ground-truth label.
pub(crate) fn reading(segment: &str, timestamp: u64, flow: f64, pressure: f64) -> Reading {
    Reading {
        segment_id: SegmentId::new(segment),
        timestamp,
        pressure,
        flow_rate: flow,
        temperature: 18.0,
        vibration: 1.2,
        rpm: 1450.0,
        operational_hours: 1200.0,
        leak_flag: None,
        zone: None,
        block: None,
    }
}
