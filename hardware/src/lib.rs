//! Antenna rotor drivers for the small radio telescope.
//!
//! This crate owns every path by which software may move the antenna. The
//! [`Rotor`] wrapper checks each commanded azimuth/elevation against the
//! configured [`AzElLimits`] before the request reaches a [`MotorDriver`].
//!
//! # Features
//!
//! - `serial` - Serial-attached mounts (ROT2/ALFASPID, H180, CASSI). Enabled by default.
//!
//! Without `serial` only the simulated [`NoMotor`] mount can be opened.

pub mod angles;
pub mod incremental;
pub mod motor;
pub mod no_motor;
pub mod rot2;
pub mod rotor;

pub use angles::{azel_within_range, AngleLimits, ArrivalTolerance, AzEl, AzElLimits};
pub use incremental::{ElevationDrive, IncrementalMotor, MountProfile, PushRod};
pub use motor::{MotorDriver, MotorError, MotorResult, MotorType};
pub use no_motor::NoMotor;
pub use rot2::Rot2Motor;
pub use rotor::{Rotor, RotorError, RotorResult};

#[cfg(test)]
pub(crate) mod test_port;
