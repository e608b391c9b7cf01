//! Water Network Simulation
//!
//! Generates synthetic segment readings for testing LeakWatch.
//! Simulates:
//! - Normal operation with correlated flow, pressure and pump speed
//! - A persistent flow-meter bias on one segment (calibration should absorb it)
//! - A leak event on another segment (flow excess plus pressure loss)
//! - Recovery after the leak is repaired
//!
//! # Usage
//! ```bash
//! ./simulation --hours 24 --seed 7 > history.csv
//! ./simulation --format jsonl --zones 3 > history.jsonl
//! ```

use anyhow::Result;
use clap::{Parser, ValueEnum};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::{self, Write};

use leakwatch::config::defaults::{SIMULATION_BASE_FLOW_LPM, SIMULATION_INTERVAL_SECS};
use leakwatch::dataset::{csv_row, CSV_HEADER};
use leakwatch::types::{Reading, SegmentId};

// ============================================================================
// Network Constants
// ============================================================================

/// Baseline line pressure (psi)
const BASE_PRESSURE: f64 = 98.0;
/// Baseline pump speed (RPM)
const BASE_RPM: f64 = 1450.0;
/// Baseline water temperature (°C)
const BASE_TEMPERATURE: f64 = 16.0;
/// Baseline vibration (mm/s RMS)
const BASE_VIBRATION: f64 = 1.2;
/// Start of the simulated day (2024-01-01T00:00:00Z)
const START_TIMESTAMP: u64 = 1_704_067_200;
/// Reported flow multiplier on the biased meter
const SENSOR_BIAS: f64 = 1.20;
/// Flow multiplier on the leaking segment at full severity
const LEAK_FLOW_GAIN: f64 = 0.40;
/// Pressure loss on the leaking segment at full severity (fraction)
const LEAK_PRESSURE_LOSS: f64 = 0.20;
/// Pressure loss felt by the leaking segment's siblings (fraction)
const SIBLING_PRESSURE_LOSS: f64 = 0.04;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "leakwatch-simulation")]
#[command(about = "Synthetic water network readings for LeakWatch testing")]
#[command(version = "1.0")]
struct Args {
    /// Simulated duration in hours (1-168)
    #[arg(short = 'H', long, default_value = "24", value_parser = clap::value_parser!(u32).range(1..=168))]
    hours: u32,

    /// Seconds between readings of one segment
    #[arg(long, default_value_t = SIMULATION_INTERVAL_SECS)]
    interval: u64,

    /// Number of supply zones (1-9)
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u32).range(1..=9))]
    zones: u32,

    /// Pipe segments per zone (2-9)
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(2..=9))]
    pipes: u32,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Suppress mission log (only output readings)
    #[arg(short, long)]
    quiet: bool,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Jsonl,
}

// ============================================================================
// Simulation Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Healthy network (0-50%)
    NormalOperation,
    /// Flow meter on one segment starts over-reading (50-65%); persists
    SensorBias,
    /// Leak on one segment (65-85%)
    LeakEvent,
    /// Leak repaired (85-100%)
    Recovery,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::NormalOperation => "Normal Operation",
            Phase::SensorBias => "Sensor Bias (Flow Meter Drift)",
            Phase::LeakEvent => "Leak Event",
            Phase::Recovery => "Recovery (Leak Repaired)",
        }
    }

    fn from_progress(progress: f64) -> Self {
        match progress {
            p if p < 0.50 => Phase::NormalOperation,
            p if p < 0.65 => Phase::SensorBias,
            p if p < 0.85 => Phase::LeakEvent,
            _ => Phase::Recovery,
        }
    }

    fn bias_active(&self) -> bool {
        !matches!(self, Phase::NormalOperation)
    }
}

// ============================================================================
// Simulation State
// ============================================================================

struct SimSegment {
    id: SegmentId,
    zone: String,
    block: String,
    /// Share of the base flow this segment carries
    demand: f64,
    operational_hours: f64,
}

struct SimulationState {
    rng: StdRng,
    current_phase: Phase,
    sim_time_seconds: u64,
    total_duration_seconds: u64,
    interval: u64,
    segments: Vec<SimSegment>,
    biased: usize,
    leaking: usize,

    // Statistics
    readings_generated: u64,
    leak_readings: u64,

    // Normal distributions
    small_noise: Normal<f64>,
    medium_noise: Normal<f64>,
}

impl SimulationState {
    fn new(args: &Args) -> Result<Self> {
        let mut rng = match args.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut segments = Vec::new();
        for z in 1..=args.zones {
            for p in 1..=args.pipes {
                segments.push(SimSegment {
                    id: SegmentId::new(format!("Z{z}_B{p}_P1")),
                    zone: format!("Zone_{z}"),
                    block: format!("Block_{z}_{p}"),
                    demand: rng.gen_range(0.8..1.2),
                    operational_hours: rng.gen_range(500.0..5000.0),
                });
            }
        }
        // First segment drifts, the last one leaks
        let leaking = segments.len() - 1;

        Ok(Self {
            rng,
            current_phase: Phase::NormalOperation,
            sim_time_seconds: 0,
            total_duration_seconds: u64::from(args.hours) * 3600,
            interval: args.interval.max(1),
            segments,
            biased: 0,
            leaking,
            readings_generated: 0,
            leak_readings: 0,
            small_noise: Normal::new(0.0, 0.01)?,
            medium_noise: Normal::new(0.0, 0.03)?,
        })
    }

    fn progress(&self) -> f64 {
        self.sim_time_seconds as f64 / self.total_duration_seconds as f64
    }

    fn update_phase(&mut self) -> bool {
        let new_phase = Phase::from_progress(self.progress());
        if new_phase != self.current_phase {
            self.current_phase = new_phase;
            true
        } else {
            false
        }
    }

    /// Severity ramp of the leak within its phase, 0 → 1
    fn leak_severity(&self) -> f64 {
        ((self.progress() - 0.65) / 0.05).clamp(0.0, 1.0)
    }

    /// One reading per segment at the current time step
    fn generate_step(&mut self) -> Vec<Reading> {
        let timestamp = START_TIMESTAMP + self.sim_time_seconds;
        let hours_step = self.interval as f64 / 3600.0;
        let leak_zone = self.segments[self.leaking].zone.clone();
        let leak_active = self.current_phase == Phase::LeakEvent;
        let severity = self.leak_severity();

        // Network-wide pump speed shared by every segment at this step
        let rpm = BASE_RPM * (1.0 + self.small_noise.sample(&mut self.rng));

        let mut readings = Vec::with_capacity(self.segments.len());
        for i in 0..self.segments.len() {
            let noise_p = self.small_noise.sample(&mut self.rng);
            let noise_f = self.small_noise.sample(&mut self.rng);
            let noise_v = self.medium_noise.sample(&mut self.rng);
            let temperature = BASE_TEMPERATURE + self.rng.gen_range(-0.5..0.5);

            let segment = &mut self.segments[i];
            segment.operational_hours += hours_step;

            let mut pressure = BASE_PRESSURE * (1.0 + noise_p);
            let vibration = BASE_VIBRATION * (1.0 + noise_v);
            // Healthy flow follows pump speed and line pressure
            let mut flow = SIMULATION_BASE_FLOW_LPM
                * segment.demand
                * (rpm / BASE_RPM)
                * (1.0 + 0.5 * (pressure - BASE_PRESSURE) / BASE_PRESSURE)
                * (1.0 + noise_f);

            let mut leak_flag = false;
            if leak_active && i == self.leaking {
                flow *= 1.0 + LEAK_FLOW_GAIN * severity;
                pressure *= 1.0 - LEAK_PRESSURE_LOSS * severity;
                leak_flag = severity > 0.0;
            } else if leak_active && segment.zone == leak_zone {
                pressure *= 1.0 - SIBLING_PRESSURE_LOSS * severity;
            }
            if self.current_phase.bias_active() && i == self.biased {
                flow *= SENSOR_BIAS;
            }
            if leak_flag {
                self.leak_readings += 1;
            }

            readings.push(Reading {
                segment_id: segment.id.clone(),
                timestamp,
                pressure,
                flow_rate: flow,
                temperature,
                vibration,
                rpm,
                operational_hours: segment.operational_hours,
                leak_flag: Some(leak_flag),
                zone: Some(segment.zone.clone()),
                block: Some(segment.block.clone()),
            });
        }
        self.readings_generated += readings.len() as u64;
        readings
    }
}

// ============================================================================
// Logging Utilities
// ============================================================================

fn format_time(seconds: u64) -> String {
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

fn log_mission(time: u64, message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[{}] {}", format_time(time), message);
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    let mut state = SimulationState::new(&args)?;
    let q = args.quiet;

    let steps = state.total_duration_seconds / state.interval;
    log_mission(0, &"=".repeat(70), q);
    log_mission(0, "WATER NETWORK SIMULATION v1.0", q);
    log_mission(0, "LeakWatch Test Data Generator", q);
    log_mission(0, &"=".repeat(70), q);
    log_mission(0, &format!("  Segments: {} ({} zones × {} pipes)", state.segments.len(), args.zones, args.pipes), q);
    log_mission(0, &format!("  Duration: {} hours ({} steps, {}s interval)", args.hours, steps, state.interval), q);
    log_mission(0, &format!("  Biased meter: {}", state.segments[state.biased].id), q);
    log_mission(0, &format!("  Leaking segment: {}", state.segments[state.leaking].id), q);
    if let Some(seed) = args.seed {
        log_mission(0, &format!("  Random seed: {seed}"), q);
    }
    log_mission(0, "", q);
    log_mission(0, "SCENARIO PHASES:", q);
    log_mission(0, "  0-50%:   Normal Operation", q);
    log_mission(0, "  50-65%:  Sensor Bias (persists to the end)", q);
    log_mission(0, "  65-85%:  Leak Event", q);
    log_mission(0, "  85-100%: Recovery", q);
    log_mission(0, &"=".repeat(70), q);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.format == Format::Csv {
        writeln!(out, "{CSV_HEADER}")?;
    }

    while state.sim_time_seconds < state.total_duration_seconds {
        if state.update_phase() {
            log_mission(state.sim_time_seconds, &format!(">>> PHASE: {}", state.current_phase.name()), q);
        }

        for reading in state.generate_step() {
            match args.format {
                Format::Csv => writeln!(out, "{}", csv_row(&reading))?,
                Format::Jsonl => writeln!(out, "{}", serde_json::to_string(&reading)?)?,
            }
        }
        state.sim_time_seconds += state.interval;
    }
    out.flush()?;

    log_mission(state.sim_time_seconds, &"=".repeat(70), q);
    log_mission(state.sim_time_seconds, "SIMULATION COMPLETE", q);
    log_mission(state.sim_time_seconds, &format!("Total readings: {}", state.readings_generated), q);
    log_mission(state.sim_time_seconds, &format!("Leak readings: {}", state.leak_readings), q);
    log_mission(state.sim_time_seconds, &"=".repeat(70), q);
    Ok(())
}
