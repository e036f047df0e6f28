// src/simulator/mod.rs - Session controller: per-tick motion, correction and session reset
pub mod clock;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::motion::{
    CorrectionModel, Direction, MotionModel, Phase, RandomSource, StepSource, WaypointSequencer,
};
use crate::simulator::clock::{Clock, SimClock};

/// One tick's telemetry record. Never mutated after emission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub elapsed_time: f64,
    pub position: f64,
    pub velocity: f64,
    pub absolute_error: f64,
    pub correction_flag: bool,
    pub correction_magnitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Waypoint achieved; value is the position.
    Reached,
    /// Snap applied; value is the target snapped to.
    Correction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub elapsed_time: f64,
    pub value: f64,
}

/// Samples and events of the active session. Cleared on session reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub samples: Vec<Sample>,
    pub reached: Vec<Event>,
    pub corrections: Vec<Event>,
}

impl SessionHistory {
    pub fn clear(&mut self) {
        self.samples.clear();
        self.reached.clear();
        self.corrections.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.reached.is_empty() && self.corrections.is_empty()
    }
}

/// Point-in-time view of a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub session_id: Uuid,
    pub position: f64,
    pub velocity: f64,
    pub cumulative_distance: f64,
    pub correction_count: u64,
    pub elapsed_time: f64,
    pub waypoint_index: usize,
    pub target: f64,
    pub direction: Option<Direction>,
    pub phase: Phase,
    /// Session time of the last motion tick, seconds.
    pub last_tick_time: f64,
    pub last_position: f64,
}

impl SimulationState {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            position: 0.0,
            velocity: 0.0,
            cumulative_distance: 0.0,
            correction_count: 0,
            elapsed_time: 0.0,
            waypoint_index: 0,
            target: 0.0,
            direction: None,
            phase: Phase::Idle,
            last_tick_time: 0.0,
            last_position: 0.0,
        }
    }

    pub fn absolute_error(&self) -> f64 {
        (self.target - self.position).abs()
    }
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Motion tick. `reached` is set when this tick landed on the target.
    Moved {
        sample: Sample,
        correction: Option<Event>,
        reached: Option<Event>,
    },
    /// Already at the target when the tick started.
    Reached { event: Event },
    /// Dwelling at the target; no motion.
    Holding { remaining: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub outcome: TickOutcome,
    /// The session boundary was crossed at the end of this tick.
    pub session_reset: bool,
}

impl Tick {
    pub fn sample(&self) -> Option<&Sample> {
        match &self.outcome {
            TickOutcome::Moved { sample, .. } => Some(sample),
            _ => None,
        }
    }

    /// Events recorded by this tick, in order.
    pub fn events(&self) -> Vec<Event> {
        match &self.outcome {
            TickOutcome::Moved { correction, reached, .. } => {
                correction.iter().chain(reached.iter()).copied().collect()
            }
            TickOutcome::Reached { event } => vec![*event],
            TickOutcome::Holding { .. } => Vec::new(),
        }
    }

    /// The reached event of this tick, if it landed on or started at the target.
    pub fn reached(&self) -> Option<&Event> {
        match &self.outcome {
            TickOutcome::Moved { reached, .. } => reached.as_ref(),
            TickOutcome::Reached { event } => Some(event),
            TickOutcome::Holding { .. } => None,
        }
    }
}

/// Owns all mutable session state and advances it one tick at a time.
pub struct Simulation {
    config: Config,
    sequencer: WaypointSequencer,
    motion: MotionModel,
    correction: CorrectionModel,
    source: Box<dyn StepSource>,
    interval: Duration,
    state: SimulationState,
    history: SessionHistory,
    started: bool,
    session_start: Duration,
    last_tick: Duration,
}

impl Simulation {
    /// Build from a validated config, drawing steps from the config's seed.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let source = RandomSource::from_seed_option(config.simulation.seed);
        Self::with_source(config, Box::new(source))
    }

    pub fn with_source(config: Config, source: Box<dyn StepSource>) -> Result<Self, ConfigError> {
        config.validate()?;
        let interval = config.simulation.interval()?;
        let sequencer = WaypointSequencer::from_config(&config.waypoints)?;
        let motion = MotionModel::new(config.motion.clone(), config.simulation.backlash_enabled);
        let correction =
            CorrectionModel::new(config.correction.clone(), config.simulation.correction_enabled);
        let mut state = SimulationState::new();
        state.target = sequencer.current_target();
        Ok(Self {
            config,
            sequencer,
            motion,
            correction,
            source,
            interval,
            state,
            history: SessionHistory::default(),
            started: false,
            session_start: Duration::ZERO,
            last_tick: Duration::ZERO,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn sequencer(&self) -> &WaypointSequencer {
        &self.sequencer
    }

    pub fn into_parts(self) -> (SimulationState, SessionHistory) {
        (self.state, self.history)
    }

    /// Mark the run as stopped.
    pub fn halt(&mut self) {
        self.state.phase = Phase::Idle;
        self.state.velocity = 0.0;
    }

    fn begin(&mut self, now: Duration) {
        self.started = true;
        self.session_start = now;
        self.last_tick = now;
        self.state.phase = Phase::Approaching;
        tracing::info!(
            "Session {} started: {} waypoints, interval {}s, {} PPR",
            self.state.session_id,
            self.sequencer.sequence().len(),
            self.config.simulation.sampling_interval,
            self.config.simulation.pulses_per_revolution
        );
    }

    /// Advance the session to `now`.
    pub fn tick(&mut self, now: Duration) -> Tick {
        if !self.started {
            self.begin(now);
        }
        self.state.elapsed_time = secs(now.saturating_sub(self.session_start));

        let outcome = match self.sequencer.phase() {
            Phase::Holding => {
                if self.sequencer.release_if_elapsed(now) {
                    // Velocity restarts from the end of the dwell.
                    self.last_tick = now;
                    self.approach(now)
                } else {
                    TickOutcome::Holding {
                        remaining: self.sequencer.dwell_remaining(now).unwrap_or_default(),
                    }
                }
            }
            _ => self.approach(now),
        };

        self.state.phase = self.sequencer.phase();
        self.state.waypoint_index = self.sequencer.index();
        self.state.target = self.sequencer.current_target();

        let session_reset = self.check_session_boundary(now);
        Tick {
            outcome,
            session_reset,
        }
    }

    fn approach(&mut self, now: Duration) -> TickOutcome {
        let target = self.sequencer.current_target();
        let position = self.state.position;

        let Some(direction) = self.sequencer.direction_to(position) else {
            self.state.direction = None;
            return TickOutcome::Reached {
                event: self.record_reached(now),
            };
        };
        self.state.direction = Some(direction);

        let displacement =
            self.motion
                .displacement(position, target, direction, self.source.as_mut());
        let moved = if displacement.clamped {
            target
        } else {
            position + displacement.tentative
        };
        let corrected = self.correction.apply(moved, target);

        let dt = secs(now.saturating_sub(self.last_tick));
        let velocity = if dt > 0.0 {
            (corrected.position - self.state.last_position) / dt
        } else {
            0.0
        };

        self.state.position = corrected.position;
        self.state.velocity = velocity;
        self.state.cumulative_distance += displacement.tentative.abs();
        self.state.last_position = corrected.position;
        self.state.last_tick_time = self.state.elapsed_time;
        self.last_tick = now;

        let correction = corrected.applied.then(|| {
            self.state.correction_count += 1;
            let event = Event {
                kind: EventKind::Correction,
                elapsed_time: self.state.elapsed_time,
                value: target,
            };
            self.history.corrections.push(event);
            event
        });

        let sample = Sample {
            elapsed_time: self.state.elapsed_time,
            position: corrected.position,
            velocity,
            absolute_error: (target - corrected.position).abs(),
            correction_flag: corrected.applied,
            correction_magnitude: corrected.amount,
        };
        self.history.samples.push(sample);
        tracing::trace!(
            "t={:.2}s pos={:.3} vel={:.3} err={:.3} dir={}",
            sample.elapsed_time,
            sample.position,
            sample.velocity,
            sample.absolute_error,
            direction.label()
        );

        let reached = self
            .sequencer
            .direction_to(corrected.position)
            .is_none()
            .then(|| self.record_reached(now));

        TickOutcome::Moved {
            sample,
            correction,
            reached,
        }
    }

    fn record_reached(&mut self, now: Duration) -> Event {
        let event = Event {
            kind: EventKind::Reached,
            elapsed_time: self.state.elapsed_time,
            value: self.state.position,
        };
        self.history.reached.push(event);
        self.sequencer.begin_hold(now);
        tracing::debug!(
            "Reached waypoint {} at {:.2} mm, holding {:?}",
            self.sequencer.index(),
            event.value,
            self.sequencer.dwell()
        );
        event
    }

    fn check_session_boundary(&mut self, now: Duration) -> bool {
        let sim = &self.config.simulation;
        if !sim.is_bounded() || self.state.elapsed_time < sim.session_duration {
            return false;
        }
        // Position and velocity carry over as the new session's starting point.
        self.session_start = now;
        self.last_tick = now;
        self.state.last_position = self.state.position;
        self.state.last_tick_time = 0.0;
        self.state.elapsed_time = 0.0;
        self.state.cumulative_distance = 0.0;
        self.state.correction_count = 0;
        self.state.session_id = Uuid::new_v4();
        self.history.clear();
        tracing::info!("Session duration elapsed; starting session {}", self.state.session_id);
        true
    }

    /// How long the tick loop should suspend after a tick at `now`.
    pub fn next_pause(&self, now: Duration) -> Duration {
        match self.sequencer.dwell_remaining(now) {
            Some(remaining) if !remaining.is_zero() => remaining,
            _ => self.interval,
        }
    }

    /// Run against a simulated clock, without sleeping, until `duration` of
    /// simulated time has passed. Returns the number of ticks taken.
    pub fn run_batch<F>(&mut self, clock: &mut SimClock, duration: Duration, mut on_tick: F) -> usize
    where
        F: FnMut(&Tick, &SimulationState),
    {
        let end = clock.now() + duration;
        let mut ticks = 0;
        while clock.now() < end {
            let tick = self.tick(clock.now());
            on_tick(&tick, &self.state);
            ticks += 1;
            let pause = self.next_pause(clock.now());
            clock.advance(pause);
        }
        ticks
    }
}

fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}
