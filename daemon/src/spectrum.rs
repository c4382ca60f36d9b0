//! Integrated spectra published by the radio process.
//!
//! # Protocol Overview
//!
//! The radio process serves its latest integrated spectrum on a TCP port.
//! Each connection receives one frame of `num_bins` little-endian `f32`
//! values and is then closed.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

/// Connect and read timeout for spectrum requests.
pub const SPECTRUM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum SpectrumError {
    #[error("Spectrum IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot resolve spectrum address {0}")]
    Address(String),

    #[error("Spectrum is empty")]
    Empty,
}

/// Source of the most recent integrated spectrum.
pub trait SpectrumSource: Send {
    fn latest_spectrum(&mut self) -> Result<Vec<f32>, SpectrumError>;
}

/// Reads frames from the radio process over TCP.
pub struct TcpSpectrumSource {
    address: String,
    num_bins: usize,
    timeout: Duration,
}

impl TcpSpectrumSource {
    pub fn new(address: impl Into<String>, num_bins: usize) -> Self {
        Self {
            address: address.into(),
            num_bins,
            timeout: SPECTRUM_TIMEOUT,
        }
    }
}

/// Decode a little-endian `f32` frame.
pub fn decode_frame(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl SpectrumSource for TcpSpectrumSource {
    fn latest_spectrum(&mut self) -> Result<Vec<f32>, SpectrumError> {
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SpectrumError::Address(self.address.clone()))?;
        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        let mut frame = vec![0u8; self.num_bins * 4];
        stream.read_exact(&mut frame)?;
        Ok(decode_frame(&frame))
    }
}

/// Calibrated power of a spectrum in Kelvin.
pub fn calibrated_power(spectrum: &[f32], tsys: f64, tcal: f64, cal_power: f64) -> Result<f64, SpectrumError> {
    if spectrum.is_empty() {
        return Err(SpectrumError::Empty);
    }
    let sum: f64 = spectrum.iter().map(|&v| f64::from(v)).sum();
    Ok((tsys + tcal) * sum / (spectrum.len() as f64 * cal_power))
}
