//! Common motor driver contract and the closed set of supported mount types.

use std::io;
#[cfg(feature = "serial")]
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::angles::AzEl;

/// Errors raised by motor drivers.
#[derive(Error, Debug)]
pub enum MotorError {
    /// Serial read/write failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Opening the serial device failed.
    #[error("Failed to open serial port {port}: {message}")]
    PortOpen {
        /// Device path
        port: String,
        /// Error reported by the serial layer
        message: String,
    },

    /// Reply from the controller did not match the expected framing.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Target cannot be expressed in the controller's command format.
    #[error("Command out of encodable range: {0}")]
    Encoding(String),

    /// ROT2 controllers only support 1, 2 or 4 pulses per degree.
    #[error("Invalid pulses per degree: {0}")]
    InvalidPulsesPerDegree(u8),

    /// Mount type needs a driver that was not compiled in.
    #[error("Motor type {0} requires the `serial` feature")]
    Unsupported(MotorType),
}

/// Result type for motor operations.
pub type MotorResult<T> = Result<T, MotorError>;

/// Read timeout for serial mounts. Slow mounts reply only after the move completes.
#[cfg(feature = "serial")]
const SERIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Open a serial device with 8N1 framing.
#[cfg(feature = "serial")]
pub fn open_serial(port: &str, baudrate: u32) -> MotorResult<Box<dyn serialport::SerialPort>> {
    serialport::new(port, baudrate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .timeout(SERIAL_TIMEOUT)
        .open()
        .map_err(|e| MotorError::PortOpen {
            port: port.to_string(),
            message: e.to_string(),
        })
}

/// Hardware-specific driver exposing the point/status capability.
///
/// Drivers do not check pointing limits; that is the job of
/// [`Rotor`](crate::Rotor). Counting drivers are NOT idempotent: calling
/// [`point`](Self::point) twice with the same target may move the mount twice
/// if the first call was clamped.
pub trait MotorDriver: Send {
    /// Command the mount toward `target`.
    fn point(&mut self, target: AzEl) -> MotorResult<()>;

    /// Current mount position.
    fn status(&mut self) -> MotorResult<AzEl>;

    /// Halt motion where supported. The default is a no-op.
    fn stop(&mut self) -> MotorResult<()> {
        Ok(())
    }
}

/// Mount types selectable from the settings file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum MotorType {
    /// Simulated or stationary mount
    #[strum(serialize = "NONE")]
    #[serde(rename = "NONE")]
    NoMotor,
    /// SPID controllers speaking the ROT2 protocol
    #[strum(serialize = "ALFASPID")]
    #[serde(rename = "ALFASPID")]
    AlfaSpid,
    /// H180 counting mount
    #[strum(serialize = "H180MOUNT")]
    #[serde(rename = "H180MOUNT")]
    H180Mount,
    /// CASSI counting mount with push-rod elevation
    #[strum(serialize = "CASSI")]
    #[serde(rename = "CASSI")]
    Cassi,
}
