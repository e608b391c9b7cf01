//! Shared data structures for the leak detection pipeline
//!
//! This module defines the core types passed between pipeline stages:
//! - Input: `Reading`, `SegmentId`, `FeatureVector`
//! - Intermediate signals: `ExpectedFlow`, `PhysicsVerdict`
//! - Output: `Status`, `Reason`, `FusionResult`
//! - Errors shared by every stage: `InvalidInputError`

mod reading;
mod signals;
mod decision;

pub use reading::*;
pub use signals::*;
pub use decision::*;
