//! Simulated or stationary mount.

use crate::angles::{AzEl, AzElLimits};
use crate::motor::{MotorDriver, MotorResult};

/// Mount that reports whatever it was last told to point at.
///
/// Starts at the lower corner of the limits. A fixed telescope configures
/// both bounds of each axis to the same value.
#[derive(Debug, Clone)]
pub struct NoMotor {
    position: AzEl,
}

impl NoMotor {
    pub fn new(limits: AzElLimits) -> Self {
        Self {
            position: limits.lower_corner(),
        }
    }
}

impl MotorDriver for NoMotor {
    fn point(&mut self, target: AzEl) -> MotorResult<()> {
        self.position = target;
        Ok(())
    }

    fn status(&mut self) -> MotorResult<AzEl> {
        Ok(self.position)
    }
}
