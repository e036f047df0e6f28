//! # Simulation Configuration
//!
//! Configuration for the encoder simulation: tick timing, session length,
//! motion/backlash ranges, correction thresholds and the waypoint profile.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [simulation]
//! sampling_interval = 0.5
//! session_duration = 60.0
//! pulses_per_revolution = 200
//! backlash_enabled = true
//! correction_enabled = true
//! seed = 42
//!
//! [motion]
//! step_min = 1.0
//! step_max = 2.0
//! backlash_min = 0.01
//! backlash_max = 0.2
//!
//! [correction]
//! proximity_threshold = 0.25
//!
//! [waypoints]
//! half_amplitude = 6.35
//! dwell = 2.0
//! ```
//!
//! Every field has a default, so an empty file gives the reference setup.
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use encoder_sim::config::Config;
//! let config: Config = toml::from_str("[simulation]\nsampling_interval = 0.1\n").unwrap();
//! assert_eq!(config.simulation.sampling_interval, 0.1);
//! assert_eq!(config.waypoints.targets().len(), 8);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("sampling interval must be a positive number of seconds, got {0}")]
    InvalidSamplingInterval(f64),
    #[error("pulses per revolution must be greater than zero")]
    InvalidPulsesPerRevolution,
    #[error("session duration must be zero or a positive number of seconds, got {0}")]
    InvalidSessionDuration(f64),
    #[error("invalid {name} range [{min}, {max}]")]
    InvalidRange { name: &'static str, min: f64, max: f64 },
    #[error("{name} must be a non-negative finite value, got {value}")]
    NegativeValue { name: &'static str, value: f64 },
    #[error("waypoint sequence must contain at least one target")]
    EmptyWaypoints,
    #[error("waypoint {index} is not a finite position: {value}")]
    InvalidWaypoint { index: usize, value: f64 },
    #[error("{name} of {value} seconds is not representable as a duration")]
    DurationOutOfRange { name: &'static str, value: f64 },
    #[error("backlash maximum {backlash_max} must be smaller than the minimum step {step_min}")]
    BacklashExceedsStep { backlash_max: f64, step_min: f64 },
}

/// Top-level configuration. Immutable for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub waypoints: WaypointConfig,
}

/// Session-level settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Seconds between ticks.
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval: f64,
    /// Seconds per session; 0 means unbounded.
    #[serde(default)]
    pub session_duration: f64,
    /// Encoder resolution. Reported, not used by the motion model.
    #[serde(default = "default_pulses_per_revolution")]
    pub pulses_per_revolution: u32,
    #[serde(default = "default_true")]
    pub backlash_enabled: bool,
    #[serde(default = "default_true")]
    pub correction_enabled: bool,
    /// Seed for the step/backlash generator. Entropy-seeded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sampling_interval: default_sampling_interval(),
            session_duration: 0.0,
            pulses_per_revolution: default_pulses_per_revolution(),
            backlash_enabled: true,
            correction_enabled: true,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Tick interval. Rejects values that truncate to zero or overflow `Duration`.
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        if !(self.sampling_interval.is_finite() && self.sampling_interval > 0.0) {
            return Err(ConfigError::InvalidSamplingInterval(self.sampling_interval));
        }
        match Duration::try_from_secs_f64(self.sampling_interval) {
            Ok(interval) if !interval.is_zero() => Ok(interval),
            Ok(_) => Err(ConfigError::InvalidSamplingInterval(self.sampling_interval)),
            Err(_) => Err(ConfigError::DurationOutOfRange {
                name: "sampling_interval",
                value: self.sampling_interval,
            }),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.session_duration > 0.0
    }
}

/// Per-tick displacement ranges, in millimeters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MotionConfig {
    #[serde(default = "default_step_min")]
    pub step_min: f64,
    #[serde(default = "default_step_max")]
    pub step_max: f64,
    #[serde(default = "default_backlash_min")]
    pub backlash_min: f64,
    #[serde(default = "default_backlash_max")]
    pub backlash_max: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            step_min: default_step_min(),
            step_max: default_step_max(),
            backlash_min: default_backlash_min(),
            backlash_max: default_backlash_max(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CorrectionConfig {
    /// Distance to target (mm) under which the loop snaps to target.
    #[serde(default = "default_proximity_threshold")]
    pub proximity_threshold: f64,
    /// Corrections smaller than this (mm) are not counted.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: default_proximity_threshold(),
            epsilon: default_epsilon(),
        }
    }
}

/// Waypoint profile and dwell time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WaypointConfig {
    /// Half amplitude `d` of the triangular profile `[0, d, 2d, d, 0, -d, -2d, -d]`.
    #[serde(default = "default_half_amplitude")]
    pub half_amplitude: f64,
    /// Explicit target list; replaces the triangular profile when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<f64>>,
    /// Seconds to hold at each reached target.
    #[serde(default = "default_dwell")]
    pub dwell: f64,
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            half_amplitude: default_half_amplitude(),
            targets: None,
            dwell: default_dwell(),
        }
    }
}

impl WaypointConfig {
    /// Resolved target list.
    pub fn targets(&self) -> Vec<f64> {
        match &self.targets {
            Some(targets) => targets.clone(),
            None => triangular_profile(self.half_amplitude),
        }
    }

    pub fn dwell_duration(&self) -> Result<Duration, ConfigError> {
        check_non_negative("dwell", self.dwell)?;
        Duration::try_from_secs_f64(self.dwell).map_err(|_| ConfigError::DurationOutOfRange {
            name: "dwell",
            value: self.dwell,
        })
    }
}

/// `[0, d, 2d, d, 0, -d, -2d, -d]`
pub fn triangular_profile(half_amplitude: f64) -> Vec<f64> {
    let d = half_amplitude;
    vec![0.0, d, 2.0 * d, d, 0.0, -d, -2.0 * d, -d]
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        sim.interval()?;
        if sim.pulses_per_revolution == 0 {
            return Err(ConfigError::InvalidPulsesPerRevolution);
        }
        if !(sim.session_duration.is_finite() && sim.session_duration >= 0.0) {
            return Err(ConfigError::InvalidSessionDuration(sim.session_duration));
        }

        check_range("step", self.motion.step_min, self.motion.step_max)?;
        check_range("backlash", self.motion.backlash_min, self.motion.backlash_max)?;
        // Backlash must never reverse a step, or travel never reaches the target.
        if self.motion.backlash_max >= self.motion.step_min {
            return Err(ConfigError::BacklashExceedsStep {
                backlash_max: self.motion.backlash_max,
                step_min: self.motion.step_min,
            });
        }

        check_non_negative("proximity_threshold", self.correction.proximity_threshold)?;
        check_non_negative("epsilon", self.correction.epsilon)?;
        self.waypoints.dwell_duration()?;

        let targets = self.waypoints.targets();
        if targets.is_empty() {
            return Err(ConfigError::EmptyWaypoints);
        }
        if let Some((index, &value)) = targets.iter().enumerate().find(|(_, t)| !t.is_finite()) {
            return Err(ConfigError::InvalidWaypoint { index, value });
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

fn check_range(name: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min.is_finite() && max.is_finite() && min >= 0.0 && min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvalidRange { name, min, max })
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeValue { name, value })
    }
}

fn default_sampling_interval() -> f64 {
    0.5
}
fn default_pulses_per_revolution() -> u32 {
    200
}
fn default_true() -> bool {
    true
}
fn default_step_min() -> f64 {
    1.0
}
fn default_step_max() -> f64 {
    2.0
}
fn default_backlash_min() -> f64 {
    0.01
}
fn default_backlash_max() -> f64 {
    0.2
}
fn default_proximity_threshold() -> f64 {
    0.25
}
fn default_epsilon() -> f64 {
    1e-6
}
fn default_half_amplitude() -> f64 {
    6.35
}
fn default_dwell() -> f64 {
    2.0
}

/// Load and validate a TOML configuration file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to parse config TOML: {}", e);
            return Err(ConfigError::Toml(e));
        }
    };
    config.validate()?;
    Ok(config)
}
