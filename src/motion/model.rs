// src/motion/model.rs - Per-tick displacement with backlash and overshoot clamp
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::MotionConfig;
use crate::motion::Direction;

/// Source of step and backlash magnitudes.
///
/// Swappable so runs can be seeded or fully scripted.
pub trait StepSource: Send {
    /// Base step magnitude in `[min, max]`.
    fn step(&mut self, min: f64, max: f64) -> f64;
    /// Backlash magnitude in `[min, max]`.
    fn backlash(&mut self, min: f64, max: f64) -> f64;
}

/// Uniform draws from a `rand` generator.
#[derive(Debug, Clone)]
pub struct RandomSource<R = StdRng> {
    rng: R,
}

impl RandomSource<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    /// Seeded when `seed` is set, entropy otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl<R: Rng> RandomSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    fn uniform(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.random_range(min..=max)
    }
}

impl<R: Rng + Send> StepSource for RandomSource<R> {
    fn step(&mut self, min: f64, max: f64) -> f64 {
        self.uniform(min, max)
    }
    fn backlash(&mut self, min: f64, max: f64) -> f64 {
        self.uniform(min, max)
    }
}

/// Constant magnitudes, ignoring the configured ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSource {
    pub step: f64,
    pub backlash: f64,
}

impl FixedSource {
    pub fn new(step: f64, backlash: f64) -> Self {
        Self { step, backlash }
    }
}

impl StepSource for FixedSource {
    fn step(&mut self, _min: f64, _max: f64) -> f64 {
        self.step
    }
    fn backlash(&mut self, _min: f64, _max: f64) -> f64 {
        self.backlash
    }
}

/// Result of one motion step, before correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    /// Signed base step.
    pub base: f64,
    /// Signed backlash perturbation (opposes travel), 0 when disabled.
    pub backlash: f64,
    /// Displacement actually applied after the overshoot clamp.
    pub tentative: f64,
    /// True when the step was shortened to land on the target.
    pub clamped: bool,
}

#[derive(Debug, Clone)]
pub struct MotionModel {
    config: MotionConfig,
    backlash_enabled: bool,
}

impl MotionModel {
    pub fn new(config: MotionConfig, backlash_enabled: bool) -> Self {
        Self { config, backlash_enabled }
    }

    pub fn backlash_enabled(&self) -> bool {
        self.backlash_enabled
    }

    /// Tentative displacement for one tick from `position` toward `target`.
    pub fn displacement(
        &self,
        position: f64,
        target: f64,
        direction: Direction,
        source: &mut dyn StepSource,
    ) -> Displacement {
        let sign = direction.signum();
        let base = source.step(self.config.step_min, self.config.step_max) * sign;
        let backlash = if self.backlash_enabled {
            -sign * source.backlash(self.config.backlash_min, self.config.backlash_max)
        } else {
            0.0
        };

        let mut tentative = base + backlash;
        let overshoot = (position + tentative - target) * sign;
        let clamped = overshoot > 0.0;
        if clamped {
            tentative = target - position;
        }

        Displacement {
            base,
            backlash,
            tentative,
            clamped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(backlash: bool) -> MotionModel {
        MotionModel::new(MotionConfig::default(), backlash)
    }

    #[test]
    fn backlash_opposes_forward_step() {
        let mut source = FixedSource::new(1.0, 0.1);
        let d = model(true).displacement(0.0, 10.0, Direction::Forward, &mut source);
        assert_eq!(d.base, 1.0);
        assert_eq!(d.backlash, -0.1);
        assert!((d.tentative - 0.9).abs() < 1e-12);
        assert!(!d.clamped);
    }

    #[test]
    fn backlash_opposes_reverse_step() {
        let mut source = FixedSource::new(1.0, 0.1);
        let d = model(true).displacement(0.0, -10.0, Direction::Reverse, &mut source);
        assert!((d.tentative + 0.9).abs() < 1e-12);
    }

    #[test]
    fn overshoot_is_clamped_in_both_directions() {
        let mut source = FixedSource::new(1.5, 0.0);
        let d = model(false).displacement(6.0, 6.35, Direction::Forward, &mut source);
        assert!(d.clamped);
        assert_eq!(6.0 + d.tentative, 6.35);

        let d = model(false).displacement(-12.0, -12.7, Direction::Reverse, &mut source);
        assert!(d.clamped);
        assert!((d.tentative + 0.7).abs() < 1e-12);
    }

    #[test]
    fn seeded_source_is_reproducible_and_in_range() {
        let mut a = RandomSource::seeded(99);
        let mut b = RandomSource::seeded(99);
        for _ in 0..100 {
            let x = a.step(1.0, 2.0);
            assert_eq!(x, b.step(1.0, 2.0));
            assert!((1.0..=2.0).contains(&x));
            let y = a.backlash(0.01, 0.2);
            assert_eq!(y, b.backlash(0.01, 0.2));
            assert!((0.01..=0.2).contains(&y));
        }
    }
}
