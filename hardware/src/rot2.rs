//! ROT2 protocol driver for SPID (ALFASPID) rotor controllers.
//!
//! # Protocol Overview
//!
//! Every command is a fixed 13-byte packet:
//!
//! ```text
//! 'W' A A A A P E E E E P K ' '
//! ```
//!
//! - `AAAA` / `EEEE` - ASCII decimal pulse counts, `ppd * (deg + 360)` rounded
//! - `P` - pulses per degree as a raw byte (ignored by the controller)
//! - `K` - command byte: `0x2F` set, `0x1F` status, `0x0F` stop
//!
//! A status request is answered with a 12-byte packet whose digits are raw
//! values (not ASCII):
//!
//! ```text
//! 'W' a1 a2 a3 a4 P e1 e2 e3 e4 P ' '
//! ```
//!
//! decoded as `a1*100 + a2*10 + a3 + a4/10 - 360`.
//!
//! Angles on the wire are relative to the configured lower limits, so the
//! controller's zero lines up with the mount's lower corner.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::angles::{AzEl, AzElLimits};
use crate::motor::{MotorDriver, MotorError, MotorResult};

/// Pulses-per-degree settings the controller accepts.
pub const VALID_PULSES_PER_DEGREE: [u8; 3] = [1, 2, 4];

/// Factory default for MD-01/MD-02 controllers.
pub const DEFAULT_PULSES_PER_DEGREE: u8 = 2;

const CMD_STOP: u8 = 0x0F;
const CMD_STATUS: u8 = 0x1F;
const CMD_SET: u8 = 0x2F;

const COMMAND_LEN: usize = 13;
const REPLY_LEN: usize = 12;

/// ROT2 mount attached to a byte stream.
pub struct Rot2Motor<P> {
    port: P,
    limits: AzElLimits,
    pulses_per_degree: u8,
}

impl<P: Read + Write + Send> Rot2Motor<P> {
    /// Wrap an open port.
    ///
    /// # Errors
    ///
    /// Returns [`MotorError::InvalidPulsesPerDegree`] unless `pulses_per_degree` is 1, 2 or 4.
    pub fn new(port: P, limits: AzElLimits, pulses_per_degree: u8) -> MotorResult<Self> {
        if !VALID_PULSES_PER_DEGREE.contains(&pulses_per_degree) {
            return Err(MotorError::InvalidPulsesPerDegree(pulses_per_degree));
        }
        Ok(Self {
            port,
            limits,
            pulses_per_degree,
        })
    }

    /// Wrap an open port and query the controller once so the pulses-per-degree
    /// setting is taken from the hardware.
    pub fn probe(port: P, limits: AzElLimits, pulses_per_degree: u8) -> MotorResult<Self> {
        let mut motor = Self::new(port, limits, pulses_per_degree)?;
        motor.status()?;
        Ok(motor)
    }

    pub fn pulses_per_degree(&self) -> u8 {
        self.pulses_per_degree
    }

    fn encode_angle(&self, degrees: f64) -> MotorResult<u32> {
        let pulses = (f64::from(self.pulses_per_degree) * (degrees + 360.0) + 0.5).floor();
        if !(0.0..=9999.0).contains(&pulses) {
            return Err(MotorError::Encoding(format!(
                "{degrees} deg is {pulses} pulses"
            )));
        }
        Ok(pulses as u32)
    }

    /// Build a command packet. `angles` are relative to the lower limits.
    fn build_packet(&self, cmd: u8, angles: Option<AzEl>) -> MotorResult<[u8; COMMAND_LEN]> {
        let (az, el) = match angles {
            Some(rel) => (self.encode_angle(rel.az)?, self.encode_angle(rel.el)?),
            None => (0, 0),
        };
        let digits = format!("{az:04}{el:04}");
        let digits = digits.as_bytes();

        let mut packet = [0u8; COMMAND_LEN];
        packet[0] = b'W';
        packet[1..5].copy_from_slice(&digits[0..4]);
        packet[5] = self.pulses_per_degree;
        packet[6..10].copy_from_slice(&digits[4..8]);
        packet[10] = self.pulses_per_degree;
        packet[11] = cmd;
        packet[12] = b' ';
        Ok(packet)
    }

    fn send(&mut self, cmd: u8, angles: Option<AzEl>) -> MotorResult<()> {
        let packet = self.build_packet(cmd, angles)?;
        debug!("ROT2 >> {:02X?}", packet);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> MotorResult<AzEl> {
        let mut reply = [0u8; REPLY_LEN];
        self.port.read_exact(&mut reply)?;
        debug!("ROT2 << {:02X?}", reply);

        if reply[0] != b'W' {
            return Err(MotorError::InvalidResponse(format!(
                "expected 'W' header, got {:02X?}",
                reply
            )));
        }

        let decode = |d: &[u8]| {
            f64::from(d[0]) * 100.0 + f64::from(d[1]) * 10.0 + f64::from(d[2])
                + f64::from(d[3]) / 10.0
                - 360.0
        };
        let az = decode(&reply[1..5]);
        let el = decode(&reply[6..10]);

        let (az_ppd, el_ppd) = (reply[5], reply[10]);
        if az_ppd != el_ppd {
            return Err(MotorError::InvalidResponse(format!(
                "pulses per degree mismatch: az {az_ppd}, el {el_ppd}"
            )));
        }
        if az_ppd != self.pulses_per_degree {
            warn!(
                "Motor pulses per degree incorrect, changing value to {}",
                az_ppd
            );
            if !VALID_PULSES_PER_DEGREE.contains(&az_ppd) {
                return Err(MotorError::InvalidPulsesPerDegree(az_ppd));
            }
            self.pulses_per_degree = az_ppd;
        }
        Ok(AzEl::new(az, el))
    }
}

impl<P: Read + Write + Send> MotorDriver for Rot2Motor<P> {
    fn point(&mut self, target: AzEl) -> MotorResult<()> {
        let relative = AzEl::new(target.az - self.limits.az.lower, target.el - self.limits.el.lower);
        self.send(CMD_SET, Some(relative))
    }

    fn status(&mut self) -> MotorResult<AzEl> {
        self.send(CMD_STATUS, None)?;
        let relative = self.receive()?;
        Ok(relative + self.limits.lower_corner())
    }

    fn stop(&mut self) -> MotorResult<()> {
        self.send(CMD_STOP, None)
    }
}
