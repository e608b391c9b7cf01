//! Network topology: directed graph of junctions joined by pipe segments
//!
//! Nodes are junctions (supply zones, blocks, valves); each segment is one
//! directed edge `from → to` in the direction of supply. The core only asks
//! adjacency questions of it: which segments feed this one, which it feeds,
//! and which share its inlet.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::SegmentConfig;
use crate::types::{Reading, SegmentId};

/// Where a candidate sits relative to the segment under investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// The segment that raised the anomaly
    Origin,
    /// Feeds the origin's inlet junction
    Upstream,
    /// Fed by the origin's outlet junction
    Downstream,
    /// Shares the origin's inlet junction
    Sibling,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Origin => write!(f, "origin"),
            Position::Upstream => write!(f, "upstream"),
            Position::Downstream => write!(f, "downstream"),
            Position::Sibling => write!(f, "sibling"),
        }
    }
}

/// One directed edge of the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEdge {
    pub segment: SegmentId,
    pub from: String,
    pub to: String,
}

/// Read-only adjacency view of the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    edges: BTreeMap<SegmentId, SegmentEdge>,
}

impl NetworkTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a segment's edge.
    pub fn add_segment(&mut self, segment: SegmentId, from: impl Into<String>, to: impl Into<String>) {
        let edge = SegmentEdge {
            segment: segment.clone(),
            from: from.into(),
            to: to.into(),
        };
        self.edges.insert(segment, edge);
    }

    /// Zone → block edges from reading metadata, one per distinct segment.
    ///
    /// The first reading carrying both zone and block defines the edge.
    pub fn from_readings(readings: &[Reading]) -> Self {
        let mut topology = Self::new();
        for r in readings {
            if topology.edges.contains_key(&r.segment_id) {
                continue;
            }
            if let (Some(zone), Some(block)) = (&r.zone, &r.block) {
                topology.add_segment(r.segment_id.clone(), zone.clone(), block.clone());
            }
        }
        debug!(segments = topology.len(), "Topology derived from readings");
        topology
    }

    /// Layer configured `[[segments]]` junctions over this topology.
    ///
    /// Entries with both `from` and `to` replace any derived edge.
    pub fn apply_config(&mut self, segments: &[SegmentConfig]) {
        for s in segments {
            match (&s.from, &s.to) {
                (Some(from), Some(to)) => self.add_segment(s.id.clone(), from.clone(), to.clone()),
                (None, None) => {}
                _ => warn!(segment = %s.id, "Segment config needs both 'from' and 'to'; topology entry ignored"),
            }
        }
    }

    pub fn contains(&self, segment: &SegmentId) -> bool {
        self.edges.contains_key(segment)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Segments ending at this segment's inlet
    pub fn upstream(&self, segment: &SegmentId) -> Vec<SegmentId> {
        self.matching(segment, |origin, e| e.to == origin.from)
    }

    /// Segments starting at this segment's outlet
    pub fn downstream(&self, segment: &SegmentId) -> Vec<SegmentId> {
        self.matching(segment, |origin, e| e.from == origin.to)
    }

    /// Other segments leaving the same inlet junction
    pub fn siblings(&self, segment: &SegmentId) -> Vec<SegmentId> {
        self.matching(segment, |origin, e| e.from == origin.from)
    }

    fn matching(&self, segment: &SegmentId, pred: impl Fn(&SegmentEdge, &SegmentEdge) -> bool) -> Vec<SegmentId> {
        let Some(origin) = self.edges.get(segment) else {
            return Vec::new();
        };
        self.edges
            .values()
            .filter(|e| &e.segment != segment && pred(origin, e))
            .map(|e| e.segment.clone())
            .collect()
    }

    /// The segment itself plus every adjacent segment with its position.
    ///
    /// A segment that is both upstream and a sibling (a loop) is reported
    /// once, as upstream. Sorted by position then id.
    pub fn neighborhood(&self, segment: &SegmentId) -> Vec<(SegmentId, Position)> {
        let mut out: BTreeMap<SegmentId, Position> = BTreeMap::new();
        out.insert(segment.clone(), Position::Origin);
        for (ids, position) in [
            (self.upstream(segment), Position::Upstream),
            (self.downstream(segment), Position::Downstream),
            (self.siblings(segment), Position::Sibling),
        ] {
            for id in ids {
                out.entry(id).or_insert(position);
            }
        }
        let mut list: Vec<(SegmentId, Position)> = out.into_iter().collect();
        list.sort_by_key(|(id, p)| (position_rank(*p), id.clone()));
        list
    }
}

fn position_rank(p: Position) -> u8 {
    match p {
        Position::Origin => 0,
        Position::Upstream => 1,
        Position::Downstream => 2,
        Position::Sibling => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::reading;

    /// Main → Junction_A feeds A1 and A2; A1 ends at Block_1 which feeds B1.
    fn chain() -> NetworkTopology {
        let mut t = NetworkTopology::new();
        t.add_segment("MAIN".into(), "Reservoir", "Junction_A");
        t.add_segment("A1".into(), "Junction_A", "Block_1");
        t.add_segment("A2".into(), "Junction_A", "Block_2");
        t.add_segment("B1".into(), "Block_1", "Block_3");
        t
    }

    #[test]
    fn test_adjacency_queries() {
        let t = chain();
        let a1 = SegmentId::new("A1");
        assert_eq!(t.upstream(&a1), vec![SegmentId::new("MAIN")]);
        assert_eq!(t.downstream(&a1), vec![SegmentId::new("B1")]);
        assert_eq!(t.siblings(&a1), vec![SegmentId::new("A2")]);
        assert!(t.upstream(&SegmentId::new("MAIN")).is_empty());
        assert!(t.downstream(&SegmentId::new("unknown")).is_empty());
    }

    #[test]
    fn test_neighborhood_positions() {
        let t = chain();
        let n = t.neighborhood(&SegmentId::new("A1"));
        assert_eq!(
            n,
            vec![
                (SegmentId::new("A1"), Position::Origin),
                (SegmentId::new("MAIN"), Position::Upstream),
                (SegmentId::new("B1"), Position::Downstream),
                (SegmentId::new("A2"), Position::Sibling),
            ]
        );
    }

    #[test]
    fn test_from_readings_builds_zone_block_edges() {
        let mut r1 = reading("Z1_B1_P1", 1, 50.0, 100.0);
        r1.zone = Some("Zone_1".into());
        r1.block = Some("Block_1".into());
        let mut r2 = reading("Z1_B1_P2", 1, 50.0, 100.0);
        r2.zone = Some("Zone_1".into());
        r2.block = Some("Block_1".into());
        let r3 = reading("NO_META", 1, 50.0, 100.0);

        let t = NetworkTopology::from_readings(&[r1.clone(), r2, r3, r1]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.siblings(&SegmentId::new("Z1_B1_P1")), vec![SegmentId::new("Z1_B1_P2")]);
        assert!(!t.contains(&SegmentId::new("NO_META")));
    }

    #[test]
    fn test_config_overrides_derived_edges() {
        let mut t = chain();
        t.apply_config(&[
            SegmentConfig {
                id: "B1".into(),
                from: Some("Block_2".into()),
                to: Some("Block_3".into()),
                length_m: None,
                diameter_m: None,
                roughness: None,
                reference_pressure_psi: None,
            },
            SegmentConfig {
                id: "HALF".into(),
                from: Some("Block_2".into()),
                to: None,
                length_m: None,
                diameter_m: None,
                roughness: None,
                reference_pressure_psi: None,
            },
        ]);
        assert!(t.downstream(&SegmentId::new("A1")).is_empty());
        assert_eq!(t.downstream(&SegmentId::new("A2")), vec![SegmentId::new("B1")]);
        assert!(!t.contains(&SegmentId::new("HALF")));
    }
}
