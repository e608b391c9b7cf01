//! Network Configuration Module
//!
//! Provides detection, calibration, physics and localization settings loaded
//! from a TOML file, so every tuning constant is operator-adjustable.
//!
//! ## Loading Order
//!
//! 1. `LEAKWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `leakwatch.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The configuration is passed explicitly to each component; there is no
//! process-wide instance, so tests can build isolated pipelines.
//!
//! ```ignore
//! let config = LeakConfig::load();
//! let engine = FusionEngine::new(config.detection.clone(), config.confidence_weights.clone());
//! ```

mod leak_config;
pub mod defaults;
pub mod validation;

pub use leak_config::*;
