// src/motion/mod.rs - Waypoint sequencing, displacement and correction models

pub mod correction;
pub mod model;
pub mod waypoint;

pub use correction::{CorrectionModel, CorrectionOutcome};
pub use model::{Displacement, FixedSource, MotionModel, RandomSource, StepSource};
pub use waypoint::{WaypointSequence, WaypointSequencer};

use serde::{Deserialize, Serialize};

/// Direction of travel toward the current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn signum(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Forward => "Fwd",
            Direction::Reverse => "Rev",
        }
    }
}

/// Sequencer phase. `Idle` only when no run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Approaching,
    Holding,
}
