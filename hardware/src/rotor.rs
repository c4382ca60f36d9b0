//! Angle-safety wrapper around a motor driver.
//!
//! [`Rotor`] is the only path by which the rest of the system moves the
//! antenna. Every request is checked against the configured limits before it
//! reaches hardware, and an out-of-bounds request is returned as
//! [`RotorError::OutOfBounds`] without touching the driver.
//!
//! # Example
//!
//! ```
//! use hardware::{AngleLimits, AzEl, AzElLimits, MotorType, Rotor, RotorError};
//!
//! let limits = AzElLimits::new(AngleLimits::new(0.0, 360.0), AngleLimits::new(10.0, 80.0));
//! let mut rotor = Rotor::open(MotorType::NoMotor, "", 0, limits)?;
//!
//! rotor.set_azimuth_elevation(AzEl::new(120.0, 45.0))?;
//! assert_eq!(rotor.get_azimuth_elevation()?, AzEl::new(120.0, 45.0));
//!
//! let err = rotor.set_azimuth_elevation(AzEl::new(5.0, 5.0)).unwrap_err();
//! assert!(matches!(err, RotorError::OutOfBounds { .. }));
//! # Ok::<(), RotorError>(())
//! ```

use thiserror::Error;
use tracing::info;

use crate::angles::{AzEl, AzElLimits};
use crate::motor::{MotorDriver, MotorError, MotorType};
use crate::no_motor::NoMotor;

/// Errors from rotor commands.
#[derive(Error, Debug)]
pub enum RotorError {
    /// Requested position is outside the configured limits.
    #[error("Angle {target} not within bounds")]
    OutOfBounds {
        /// The rejected position
        target: AzEl,
    },

    /// Driver failed while talking to the mount.
    #[error("Motor error: {0}")]
    Motor(#[from] MotorError),
}

/// Result type for rotor operations.
pub type RotorResult<T> = Result<T, RotorError>;

/// Motor driver plus the limits that guard it.
pub struct Rotor {
    motor: Box<dyn MotorDriver>,
    limits: AzElLimits,
}

impl Rotor {
    pub fn new(motor: Box<dyn MotorDriver>, limits: AzElLimits) -> Self {
        Self { motor, limits }
    }

    /// Open the driver selected by `motor_type`.
    ///
    /// `port` and `baudrate` are ignored for [`MotorType::NoMotor`].
    pub fn open(
        motor_type: MotorType,
        port: &str,
        baudrate: u32,
        limits: AzElLimits,
    ) -> RotorResult<Self> {
        info!("Opening {} rotor on {:?}", motor_type, port);
        let motor = open_motor(motor_type, port, baudrate, limits)?;
        Ok(Self::new(motor, limits))
    }

    pub fn limits(&self) -> AzElLimits {
        self.limits
    }

    /// True iff both axes are legal under the wrap-aware limit rule.
    pub fn angles_within_bounds(&self, position: AzEl) -> bool {
        self.limits.contains(position)
    }

    /// Forward `target` to the driver if it is within limits.
    pub fn set_azimuth_elevation(&mut self, target: AzEl) -> RotorResult<()> {
        if !self.angles_within_bounds(target) {
            return Err(RotorError::OutOfBounds { target });
        }
        self.motor.point(target)?;
        Ok(())
    }

    pub fn get_azimuth_elevation(&mut self) -> RotorResult<AzEl> {
        Ok(self.motor.status()?)
    }

    pub fn stop(&mut self) -> RotorResult<()> {
        Ok(self.motor.stop()?)
    }
}

#[cfg(feature = "serial")]
fn open_motor(
    motor_type: MotorType,
    port: &str,
    baudrate: u32,
    limits: AzElLimits,
) -> Result<Box<dyn MotorDriver>, MotorError> {
    use crate::incremental::{IncrementalMotor, MountProfile, EXPECTED_BAUDRATE};
    use crate::motor::open_serial;
    use crate::rot2::{Rot2Motor, DEFAULT_PULSES_PER_DEGREE};
    use tracing::warn;

    let warn_baud = |name: &str| {
        if baudrate != EXPECTED_BAUDRATE {
            warn!(
                "The {} mount expects {} baud but {} is configured",
                name, EXPECTED_BAUDRATE, baudrate
            );
        }
    };

    Ok(match motor_type {
        MotorType::NoMotor => Box::new(NoMotor::new(limits)),
        MotorType::AlfaSpid => {
            let serial = open_serial(port, baudrate)?;
            Box::new(Rot2Motor::probe(serial, limits, DEFAULT_PULSES_PER_DEGREE)?)
        }
        MotorType::H180Mount => {
            warn_baud("H180");
            let serial = open_serial(port, baudrate)?;
            Box::new(IncrementalMotor::new(serial, MountProfile::h180(), limits))
        }
        MotorType::Cassi => {
            warn_baud("CASSI");
            let serial = open_serial(port, baudrate)?;
            Box::new(IncrementalMotor::new(serial, MountProfile::cassi(), limits))
        }
    })
}

#[cfg(not(feature = "serial"))]
fn open_motor(
    motor_type: MotorType,
    _port: &str,
    _baudrate: u32,
    limits: AzElLimits,
) -> Result<Box<dyn MotorDriver>, MotorError> {
    match motor_type {
        MotorType::NoMotor => Ok(Box::new(NoMotor::new(limits))),
        other => Err(MotorError::Unsupported(other)),
    }
}
