// encoder-sim: linear positioning stage driven by an incremental encoder,
// with backlash and closed-loop correction, stepping through cyclic waypoints.

pub mod config;
pub mod engine;
pub mod export;
pub mod motion;
pub mod simulator;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use engine::{Engine, EngineError, SessionReport};
pub use motion::{Direction, Phase};
pub use simulator::{Event, EventKind, Sample, SessionHistory, Simulation, SimulationState};
pub use telemetry::Telemetry;
