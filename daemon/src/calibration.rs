//! Persisted calibration: a power scalar and a per-channel gain vector.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid calibration file: {0}")]
    Parse(#[from] serde_json::Error),

    /// The stored vector does not match the configured FFT size.
    #[error("Calibration has {found} channels, radio is configured for {expected}")]
    SizeMismatch { expected: usize, found: usize },
}

/// Contents of `calibration.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub cal_values: Vec<f64>,
    pub cal_pwr: f64,
}

impl Calibration {
    /// Flat gains and the power that maps one raw unit to `tsys + tcal`.
    pub fn uncalibrated(num_bins: usize, tsys: f64, tcal: f64) -> Self {
        Self {
            cal_values: vec![1.0; num_bins],
            cal_pwr: 1.0 / (tsys + tcal),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject a calibration taken with a different FFT size.
    pub fn check_size(self, num_bins: usize) -> Result<Self, CalibrationError> {
        if self.cal_values.len() != num_bins {
            return Err(CalibrationError::SizeMismatch {
                expected: num_bins,
                found: self.cal_values.len(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uncalibrated_defaults() {
        let cal = Calibration::uncalibrated(4, 171.0, 290.0);
        assert_eq!(cal.cal_values, vec![1.0; 4]);
        assert_relative_eq!(cal.cal_pwr * (171.0 + 290.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_size_check() {
        let cal = Calibration::uncalibrated(4, 1.0, 1.0);
        assert!(cal.clone().check_size(4).is_ok());
        assert!(matches!(
            cal.check_size(8),
            Err(CalibrationError::SizeMismatch { expected: 8, found: 4 })
        ));
    }

    #[test]
    fn test_file_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        std::fs::write(&path, r#"{"cal_values": [0.5, 1.5], "cal_pwr": 2.0}"#).unwrap();
        let cal = Calibration::load(&path).unwrap();
        assert_eq!(cal.cal_values, vec![0.5, 1.5]);
        assert_relative_eq!(cal.cal_pwr, 2.0);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Calibration::load(&path), Err(CalibrationError::Parse(_))));
    }
}
