// src/motion/waypoint.rs - Cyclic waypoint sequencer and dwell state machine
use std::time::Duration;

use crate::config::{ConfigError, WaypointConfig};
use crate::motion::{Direction, Phase};

/// Positions closer than this (mm) count as "at target".
pub const TARGET_TOLERANCE: f64 = 1e-9;

/// Ordered, cyclic list of target positions in millimeters.
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointSequence {
    targets: Vec<f64>,
}

impl WaypointSequence {
    pub fn new(targets: Vec<f64>) -> Result<Self, ConfigError> {
        if targets.is_empty() {
            return Err(ConfigError::EmptyWaypoints);
        }
        if let Some((index, &value)) = targets.iter().enumerate().find(|(_, t)| !t.is_finite()) {
            return Err(ConfigError::InvalidWaypoint { index, value });
        }
        Ok(Self { targets })
    }

    /// Triangular oscillation `[0, d, 2d, d, 0, -d, -2d, -d]`.
    pub fn triangular(half_amplitude: f64) -> Result<Self, ConfigError> {
        Self::new(crate::config::triangular_profile(half_amplitude))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, index: usize) -> f64 {
        self.targets[index % self.targets.len()]
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }
}

/// Walks a [`WaypointSequence`] through the Approaching -> Holding -> advance cycle.
///
/// The sequencer never terminates on its own; it loops until the caller stops ticking it.
#[derive(Debug, Clone)]
pub struct WaypointSequencer {
    sequence: WaypointSequence,
    index: usize,
    dwell: Duration,
    hold_started: Option<Duration>,
}

impl WaypointSequencer {
    pub fn new(sequence: WaypointSequence, dwell: Duration) -> Self {
        Self {
            sequence,
            index: 0,
            dwell,
            hold_started: None,
        }
    }

    pub fn from_config(config: &WaypointConfig) -> Result<Self, ConfigError> {
        let sequence = WaypointSequence::new(config.targets())?;
        Ok(Self::new(sequence, config.dwell_duration()?))
    }

    pub fn current_target(&self) -> f64 {
        self.sequence.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sequence(&self) -> &WaypointSequence {
        &self.sequence
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Direction of travel from `position` toward the current target,
    /// `None` once the target is reached.
    pub fn direction_to(&self, position: f64) -> Option<Direction> {
        let delta = self.current_target() - position;
        if delta.abs() <= TARGET_TOLERANCE {
            None
        } else if delta > 0.0 {
            Some(Direction::Forward)
        } else {
            Some(Direction::Reverse)
        }
    }

    /// Move to the next target, wrapping at the end of the sequence.
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.sequence.len();
        self.hold_started = None;
    }

    pub fn phase(&self) -> Phase {
        if self.hold_started.is_some() {
            Phase::Holding
        } else {
            Phase::Approaching
        }
    }

    /// Enter the dwell at the current target.
    pub fn begin_hold(&mut self, now: Duration) {
        self.hold_started = Some(now);
    }

    /// Remaining dwell at `now`, or `None` when not holding.
    pub fn dwell_remaining(&self, now: Duration) -> Option<Duration> {
        self.hold_started
            .map(|since| self.dwell.saturating_sub(now.saturating_sub(since)))
    }

    /// Advance once the dwell has fully elapsed. Returns true if it advanced.
    pub fn release_if_elapsed(&mut self, now: Duration) -> bool {
        match self.dwell_remaining(now) {
            Some(remaining) if remaining.is_zero() => {
                self.advance();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_follows_sign_of_error() {
        let seq = WaypointSequencer::new(WaypointSequence::new(vec![5.0]).unwrap(), Duration::ZERO);
        assert_eq!(seq.direction_to(0.0), Some(Direction::Forward));
        assert_eq!(seq.direction_to(10.0), Some(Direction::Reverse));
        assert_eq!(seq.direction_to(5.0), None);
        assert_eq!(seq.direction_to(5.0 + 1e-12), None);
    }

    #[test]
    fn hold_then_release() {
        let mut seq = WaypointSequencer::new(
            WaypointSequence::new(vec![0.0, 1.0]).unwrap(),
            Duration::from_secs(2),
        );
        assert_eq!(seq.phase(), Phase::Approaching);
        seq.begin_hold(Duration::from_secs(10));
        assert_eq!(seq.phase(), Phase::Holding);
        assert_eq!(seq.dwell_remaining(Duration::from_secs(11)), Some(Duration::from_secs(1)));
        assert!(!seq.release_if_elapsed(Duration::from_secs(11)));
        assert!(seq.release_if_elapsed(Duration::from_secs(12)));
        assert_eq!(seq.phase(), Phase::Approaching);
        assert_eq!(seq.current_target(), 1.0);
    }

    #[test]
    fn rejects_empty_and_nan() {
        assert!(matches!(WaypointSequence::new(vec![]), Err(ConfigError::EmptyWaypoints)));
        assert!(matches!(
            WaypointSequence::new(vec![0.0, f64::NAN]),
            Err(ConfigError::InvalidWaypoint { index: 1, .. })
        ));
    }
}
