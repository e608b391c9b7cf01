//! Processing Pipeline Module
//!
//! Drives readings through the detection core one at a time:
//!
//! ```text
//! reading ─▶ Estimator ─▶ Consistency Checker ─▶ Fusion Engine ─▶ Localizer
//!               ▲                                   │   (SUSPECT / LEAK only)
//!               └──── Calibration Store ◀───────────┘
//! ```
//!
//! Single-threaded and synchronous. A reading that fails validation is
//! reported as undetermined and leaves every piece of state untouched.

mod coordinator;
mod stats;

pub use coordinator::{LeakPipeline, ReadingOutcome};
pub use stats::EvaluationStats;
