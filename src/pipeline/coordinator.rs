//! Leak Pipeline - owns the detection core and drives it reading by reading
//!
//! ## Per-Reading Flow
//!
//! 1. Estimator: calibration-adjusted expected flow (reads the store)
//! 2. Consistency checker: flow residual and pressure-flow check, with the
//!    localized-effect flag derived from adjacent segments' latest decisions
//! 3. Fusion engine: status, confidence, reasons; records the residual
//! 4. Localizer: only for SUSPECT / LEAK, over the segment's neighbourhood

use std::collections::HashMap;
use tracing::{debug, warn};

use super::EvaluationStats;
use crate::calibration::CalibrationStore;
use crate::config::LeakConfig;
use crate::estimator::FlowEstimator;
use crate::fusion::{DetectionError, FusionEngine};
use crate::localizer::{Candidate, Localization, Localizer};
use crate::physics_engine::ConsistencyChecker;
use crate::topology::{NetworkTopology, Position};
use crate::types::{FusionResult, Reading, SegmentId};

// ============================================================================
// Outcome
// ============================================================================

/// Result of processing one reading.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingOutcome {
    Decided {
        /// Position of the reading in the input stream
        index: usize,
        result: FusionResult,
        /// Present only for SUSPECT and LEAK decisions
        localization: Option<Localization>,
    },
    /// The reading could not be evaluated; nothing was recorded for it
    Undetermined {
        index: usize,
        segment: SegmentId,
        error: DetectionError,
    },
}

impl ReadingOutcome {
    pub fn index(&self) -> usize {
        match self {
            ReadingOutcome::Decided { index, .. } | ReadingOutcome::Undetermined { index, .. } => *index,
        }
    }

    pub fn result(&self) -> Option<&FusionResult> {
        match self {
            ReadingOutcome::Decided { result, .. } => Some(result),
            ReadingOutcome::Undetermined { .. } => None,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        matches!(self, ReadingOutcome::Undetermined { .. })
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Detection core plus its per-run state.
pub struct LeakPipeline<E: FlowEstimator> {
    estimator: E,
    checker: ConsistencyChecker,
    engine: FusionEngine,
    localizer: Localizer,
    store: CalibrationStore,
    topology: NetworkTopology,
    latest: HashMap<SegmentId, FusionResult>,
    stats: EvaluationStats,
}

impl<E: FlowEstimator> LeakPipeline<E> {
    /// Build a pipeline with a fresh calibration store.
    pub fn new(estimator: E, config: &LeakConfig, topology: NetworkTopology) -> Self {
        Self {
            estimator,
            checker: ConsistencyChecker::from_config(config),
            engine: FusionEngine::from_config(config),
            localizer: Localizer::new(config.localization.clone(), config.detection.deviation_saturation),
            store: CalibrationStore::new(config.calibration.clone()),
            topology,
            latest: HashMap::new(),
            stats: EvaluationStats::default(),
        }
    }

    /// Process one reading. Never panics on bad input; failures become `Undetermined`.
    pub fn process(&mut self, index: usize, reading: &Reading) -> ReadingOutcome {
        match self.decide(reading) {
            Ok(result) => {
                self.stats.record(result.status, reading.leak_flag);
                let localization = result.is_anomalous().then(|| self.localize(&result));
                self.latest.insert(result.segment_id.clone(), result.clone());
                ReadingOutcome::Decided {
                    index,
                    result,
                    localization,
                }
            }
            Err(error) => {
                warn!(index = index, segment = %reading.segment_id, error = %error, "Reading undetermined");
                self.stats.record_undetermined();
                ReadingOutcome::Undetermined {
                    index,
                    segment: reading.segment_id.clone(),
                    error,
                }
            }
        }
    }

    /// Process readings in order.
    pub fn run(&mut self, readings: &[Reading]) -> Vec<ReadingOutcome> {
        readings
            .iter()
            .enumerate()
            .map(|(i, r)| self.process(i, r))
            .collect()
    }

    fn decide(&mut self, reading: &Reading) -> Result<FusionResult, DetectionError> {
        let expected = self.estimator.expected_flow(reading, &self.store)?;
        let adjacent_anomalous = self.adjacent_anomalous(&reading.segment_id);
        let verdict = self
            .checker
            .evaluate_with_neighbors(reading, &expected, adjacent_anomalous)?;
        self.engine.decide(&mut self.store, reading, &expected, &verdict)
    }

    /// Whether any upstream or sibling segment's latest decision is anomalous
    fn adjacent_anomalous(&self, segment: &SegmentId) -> bool {
        self.topology
            .upstream(segment)
            .iter()
            .chain(self.topology.siblings(segment).iter())
            .any(|id| self.latest.get(id).is_some_and(FusionResult::is_anomalous))
    }

    fn localize(&self, result: &FusionResult) -> Localization {
        let neighborhood = self.topology.neighborhood(&result.segment_id);
        let candidates: Vec<Candidate<'_>> = neighborhood
            .iter()
            .filter_map(|(id, position)| match position {
                Position::Origin => Some(Candidate::new(*position, result)),
                _ => self.latest.get(id).map(|r| Candidate::new(*position, r)),
            })
            .collect();
        let localization = self.localizer.localize(&candidates, result);
        if let Some(top) = localization.most_probable() {
            debug!(
                segment = %result.segment_id,
                candidate = %top.segment,
                confidence = top.confidence,
                "Localized anomaly"
            );
        }
        localization
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    /// Operator access for forced calibration
    pub fn store_mut(&mut self) -> &mut CalibrationStore {
        &mut self.store
    }

    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    pub fn stats(&self) -> &EvaluationStats {
        &self.stats
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Latest decision for a segment
    pub fn latest(&self, segment: &SegmentId) -> Option<&FusionResult> {
        self.latest.get(segment)
    }

    /// Clear a segment's calibration and streaks. Operator action.
    pub fn reset_segment(&mut self, segment: &SegmentId) {
        self.store.reset(segment);
        self.engine.reset_segment(segment);
        self.latest.remove(segment);
    }
}
