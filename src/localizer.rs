//! Localizer - ranks candidate segments around an anomaly
//!
//! Each candidate is scored from its own latest decision:
//!
//! ```text
//! score = w_dev × deviation + w_dir × directional + w_rec × recency
//! ```
//!
//! - deviation: the candidate's |flow deviation| (or pressure shortfall, if
//!   larger) on the confidence saturation scale
//! - directional: during a LEAK, a downstream segment losing pressure without
//!   gaining flow points at a loss between it and the origin
//! - recency: the most recently anomalous candidates
//!
//! Scores are normalized to confidences summing to 1. Segment granularity only.

use serde::{Deserialize, Serialize};

use crate::config::LocalizationConfig;
use crate::topology::Position;
use crate::types::{FusionResult, SegmentId, Status};

/// A segment to rank, with its latest decision.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub position: Position,
    pub result: &'a FusionResult,
}

impl<'a> Candidate<'a> {
    pub fn new(position: Position, result: &'a FusionResult) -> Self {
        Self { position, result }
    }

    pub fn segment(&self) -> &SegmentId {
        &self.result.segment_id
    }
}

/// One ranked segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSegment {
    pub segment: SegmentId,
    pub position: Position,
    /// Weighted score before normalization
    pub score: f64,
    /// Share of the total score, in [0, 1]
    pub confidence: f64,
}

/// Ranked candidates, most probable first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Localization {
    pub candidates: Vec<RankedSegment>,
}

impl Localization {
    pub fn most_probable(&self) -> Option<&RankedSegment> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub struct Localizer {
    config: LocalizationConfig,
    deviation_saturation: f64,
}

impl Localizer {
    pub fn new(config: LocalizationConfig, deviation_saturation: f64) -> Self {
        Self {
            config,
            deviation_saturation,
        }
    }

    /// Rank candidates for the current decision.
    ///
    /// Deterministic: ties are broken by lowest segment id. A segment listed
    /// more than once is scored on its first entry.
    pub fn localize(&self, candidates: &[Candidate<'_>], current: &FusionResult) -> Localization {
        let mut unique: Vec<&Candidate<'_>> = Vec::with_capacity(candidates.len());
        for c in candidates {
            if !unique.iter().any(|u| u.segment() == c.segment()) {
                unique.push(c);
            }
        }
        if unique.is_empty() {
            return Localization::default();
        }

        let freshest = unique
            .iter()
            .filter(|c| c.result.is_anomalous())
            .map(|c| c.result.timestamp)
            .max();

        let mut ranked: Vec<RankedSegment> = unique
            .iter()
            .map(|c| {
                let score = self.config.deviation_weight * self.score_deviation(c.result)
                    + self.config.directional_weight * self.score_directional(c, current)
                    + self.config.recency_weight * score_recency(c.result, freshest);
                RankedSegment {
                    segment: c.segment().clone(),
                    position: c.position,
                    score,
                    confidence: 0.0,
                }
            })
            .collect();

        // Sum in id order so the total does not depend on input order
        ranked.sort_by(|a, b| a.segment.cmp(&b.segment));
        let total: f64 = ranked.iter().map(|r| r.score).sum();
        let n = ranked.len() as f64;
        for r in ranked.iter_mut() {
            r.confidence = if total > 0.0 { r.score / total } else { 1.0 / n };
        }

        ranked.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.segment.cmp(&b.segment))
        });
        Localization { candidates: ranked }
    }

    fn score_deviation(&self, result: &FusionResult) -> f64 {
        let scale = |v: f64| {
            if self.deviation_saturation > 0.0 {
                (v.abs() / self.deviation_saturation).min(1.0)
            } else {
                1.0
            }
        };
        let flow = scale(result.verdict.relative_deviation);
        if result.verdict.pressure_anomaly {
            flow.max(scale(result.verdict.pressure_deviation))
        } else {
            flow
        }
    }

    fn score_directional(&self, candidate: &Candidate<'_>, current: &FusionResult) -> f64 {
        if current.status != Status::Leak || candidate.position != Position::Downstream {
            return 0.0;
        }
        let verdict = &candidate.result.verdict;
        let flow_excess = verdict.conservation_violated && verdict.relative_deviation > 0.0;
        match (verdict.pressure_anomaly, flow_excess) {
            (true, false) => 1.0,
            (true, true) => self.config.consumption_bonus,
            _ => 0.0,
        }
    }
}

fn score_recency(result: &FusionResult, freshest: Option<u64>) -> f64 {
    match freshest {
        Some(t) if result.is_anomalous() && result.timestamp == t => 1.0,
        _ => 0.0,
    }
}
