// src/motion/correction.rs - Closed-loop snap-to-target
use crate::config::CorrectionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionOutcome {
    /// Position after correction.
    pub position: f64,
    /// Signed snap applied (`target - position`), 0 when none fired.
    pub amount: f64,
    pub applied: bool,
}

#[derive(Debug, Clone)]
pub struct CorrectionModel {
    config: CorrectionConfig,
    enabled: bool,
}

impl CorrectionModel {
    pub fn new(config: CorrectionConfig, enabled: bool) -> Self {
        Self { config, enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Snap `position` onto `target` when within the proximity threshold.
    ///
    /// Snaps smaller than `epsilon` are not corrections: the position is
    /// left as the motion model produced it.
    pub fn apply(&self, position: f64, target: f64) -> CorrectionOutcome {
        let untouched = CorrectionOutcome {
            position,
            amount: 0.0,
            applied: false,
        };
        if !self.enabled || (position - target).abs() > self.config.proximity_threshold {
            return untouched;
        }

        let amount = target - position;
        if amount.abs() <= self.config.epsilon {
            return untouched;
        }
        tracing::debug!("Correction {:+.3} mm onto target {:.2} mm", amount, target);
        CorrectionOutcome {
            position: target,
            amount,
            applied: true,
        }
    }
}
