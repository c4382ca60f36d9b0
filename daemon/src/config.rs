//! Configuration directory handling.
//!
//! A daemon configuration directory holds three files:
//!
//! - `config.json`: station, mount and radio settings ([`Settings`])
//! - `sky_coords.csv`: the object catalog
//! - `calibration.json`: optional, written by `calibrate`
//!
//! Settings are loaded once at startup and validated before any loop runs.
//! Validation failures are fatal; questionable but usable values only warn.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ephemeris::{Catalog, CatalogError};
use hardware::{AngleLimits, ArrivalTolerance, AzEl, AzElLimits, MotorType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::calibration::{Calibration, CalibrationError};

/// Default settings file name inside the configuration directory.
pub const SETTINGS_FILE: &str = "config.json";

/// Catalog file name inside the configuration directory.
pub const CATALOG_FILE: &str = "sky_coords.csv";

/// Calibration artifact file name inside the configuration directory.
pub const CALIBRATION_FILE: &str = "calibration.json";

/// Errors raised while loading the configuration directory.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration directory does not exist.
    #[error("Configuration directory {0:?} does not exist")]
    MissingDirectory(PathBuf),

    /// A required file is missing.
    #[error("Required configuration file {0:?} does not exist")]
    MissingFile(PathBuf),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid JSON or does not match the schema.
    #[error("Invalid settings in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A setting has an unusable value.
    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Observer location and name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: String,
}

/// Who to call when the telescope misbehaves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
}

/// Named azimuth/elevation as written in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub azimuth: f64,
    pub elevation: f64,
}

impl Location {
    pub fn azel(&self) -> AzEl {
        AzEl::new(self.azimuth, self.elevation)
    }
}

/// Argument vector prefixes for the external radio processes.
///
/// Each entry is the program followed by any fixed leading arguments; the
/// daemon appends its own `--flag value` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioTaskCommands {
    pub process: Vec<String>,
    pub save_raw: Vec<String>,
    pub save_rad: Vec<String>,
    pub save_fits: Vec<String>,
    pub calibrate: Vec<String>,
    pub speech: Vec<String>,
}

impl Default for RadioTaskCommands {
    fn default() -> Self {
        let program = |name: &str| vec![name.to_string()];
        Self {
            process: program("srt_radio_process"),
            save_raw: program("srt_radio_save_raw"),
            save_rad: program("srt_radio_save_spectrum_rad"),
            save_fits: program("srt_radio_save_spectrum_fits"),
            calibrate: program("srt_radio_calibrate"),
            speech: program("spd-say"),
        }
    }
}

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    pub station: Station,
    #[serde(default)]
    pub emergency_contact: Contact,
    #[serde(rename = "AZLIMITS")]
    pub az_limits: AngleLimits,
    #[serde(rename = "ELLIMITS")]
    pub el_limits: AngleLimits,
    pub stow_location: Location,
    pub cal_location: Location,
    #[serde(default)]
    pub horizon_points: Vec<Location>,
    pub motor_type: String,
    #[serde(default = "default_motor_port")]
    pub motor_port: String,
    #[serde(default = "default_motor_baudrate")]
    pub motor_baudrate: u32,
    /// Center frequency in Hz
    pub radio_cf: f64,
    /// Sample rate in Hz
    pub radio_sf: f64,
    /// Frequency correction in Hz
    #[serde(default)]
    pub radio_freq_corr: f64,
    pub radio_num_bins: usize,
    pub radio_integ_cycles: usize,
    #[serde(default = "default_true")]
    pub radio_autostart: bool,
    #[serde(default = "default_num_beamswitches")]
    pub num_beamswitches: usize,
    pub beamwidth: f64,
    pub tsys: f64,
    pub tcal: f64,
    pub save_directory: PathBuf,
    /// Dwell per N-point position in seconds
    #[serde(default = "default_npoint_integ_time")]
    pub npoint_integ_time: f64,
    #[serde(default = "default_n_pnt_count")]
    pub n_pnt_count: usize,
    #[serde(default)]
    pub play_sounds: bool,
    #[serde(default = "default_command_port")]
    pub command_port: u16,
    #[serde(default = "default_status_port")]
    pub status_port: u16,
    #[serde(default = "default_radio_rpc_url")]
    pub radio_rpc_url: String,
    #[serde(default = "default_spectrum_address")]
    pub spectrum_address: String,
    #[serde(default)]
    pub arrival_tolerance: ArrivalTolerance,
    #[serde(default)]
    pub radio_tasks: RadioTaskCommands,
}

fn default_motor_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_motor_baudrate() -> u32 {
    600
}

fn default_true() -> bool {
    true
}

fn default_num_beamswitches() -> usize {
    1
}

fn default_npoint_integ_time() -> f64 {
    2.0
}

fn default_n_pnt_count() -> usize {
    25
}

fn default_command_port() -> u16 {
    5556
}

fn default_status_port() -> u16 {
    5555
}

fn default_radio_rpc_url() -> String {
    "http://localhost:5557/".to_string()
}

fn default_spectrum_address() -> String {
    "127.0.0.1:5561".to_string()
}

impl Settings {
    /// Parse settings from JSON text without validating them.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn limits(&self) -> AzElLimits {
        AzElLimits::new(self.az_limits, self.el_limits)
    }

    pub fn stow(&self) -> AzEl {
        self.stow_location.azel()
    }

    pub fn cal(&self) -> AzEl {
        self.cal_location.azel()
    }

    pub fn motor(&self) -> Result<MotorType, ConfigError> {
        MotorType::from_str(&self.motor_type).map_err(|_| ConfigError::Invalid {
            key: "MOTOR_TYPE",
            reason: format!("unknown motor type {:?}", self.motor_type),
        })
    }

    /// Check for fatal problems and warn about suspicious values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.motor()?;

        let invalid = |key: &'static str, reason: String| Err(ConfigError::Invalid { key, reason });
        if !(-90.0..=90.0).contains(&self.station.latitude) {
            return invalid("STATION", format!("latitude {} outside +/-90", self.station.latitude));
        }
        if self.radio_sf <= 0.0 {
            return invalid("RADIO_SF", format!("sample rate {} must be positive", self.radio_sf));
        }
        if self.radio_num_bins == 0 {
            return invalid("RADIO_NUM_BINS", "must be at least 1".to_string());
        }
        if self.radio_integ_cycles == 0 {
            return invalid("RADIO_INTEG_CYCLES", "must be at least 1".to_string());
        }
        if self.tsys + self.tcal <= 0.0 {
            return invalid("TSYS", "TSYS + TCAL must be positive".to_string());
        }

        if self.az_limits.span() > 360.0 {
            warn!("AZLIMITS span {} degrees, more than a full turn", self.az_limits.span());
        }
        if self.el_limits.span() > 90.0 {
            warn!("ELLIMITS span {} degrees, more than horizon to zenith", self.el_limits.span());
        }
        let limits = self.limits();
        if !limits.contains(self.stow()) {
            warn!("STOW_LOCATION {} is outside the motor limits", self.stow());
        }
        if !limits.contains(self.cal()) {
            warn!("CAL_LOCATION {} is outside the motor limits; cal will be rejected", self.cal());
        }
        if self.n_pnt_count < 4 {
            warn!("N_PNT_COUNT {} is too small for a useful grid", self.n_pnt_count);
        }
        Ok(())
    }
}

/// Paths and loaders for one configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigDirectory {
    root_path: PathBuf,
    settings_file: String,
}

impl ConfigDirectory {
    /// Use `root_path` with the default settings file name.
    pub fn with_path(root_path: PathBuf) -> Self {
        Self {
            root_path,
            settings_file: SETTINGS_FILE.to_string(),
        }
    }

    /// Override the settings file name.
    pub fn with_settings_file(mut self, name: impl Into<String>) -> Self {
        self.settings_file = name.into();
        self
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root_path.join(&self.settings_file)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root_path.join(CATALOG_FILE)
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.root_path.join(CALIBRATION_FILE)
    }

    fn require(&self, path: PathBuf) -> Result<PathBuf, ConfigError> {
        if !self.root_path.is_dir() {
            return Err(ConfigError::MissingDirectory(self.root_path.clone()));
        }
        if !path.is_file() {
            return Err(ConfigError::MissingFile(path));
        }
        Ok(path)
    }

    /// Load and validate `config.json`.
    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        let path = self.require(self.settings_path())?;
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let settings = Settings::from_json(&text).map_err(|source| ConfigError::Parse { path, source })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `sky_coords.csv`.
    pub fn load_catalog(&self) -> Result<Catalog, ConfigError> {
        let path = self.require(self.catalog_path())?;
        Ok(Catalog::from_path(path)?)
    }

    /// Get the stored calibration.
    ///
    /// Returns None if no calibration has been saved.
    /// Returns Some(Err) if the file exists but cannot be loaded.
    pub fn get_calibration(&self) -> Option<Result<Calibration, CalibrationError>> {
        let path = self.calibration_path();
        if !path.exists() {
            return None;
        }
        Some(Calibration::load(&path))
    }

    /// Save a calibration, creating the directory if needed.
    pub fn save_calibration(&self, calibration: &Calibration) -> Result<PathBuf, CalibrationError> {
        std::fs::create_dir_all(&self.root_path)?;
        let path = self.calibration_path();
        calibration.save(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    pub(crate) const SAMPLE_SETTINGS: &str = r#"{
        "STATION": {"latitude": 42.5, "longitude": -71.5, "name": "Haystack"},
        "EMERGENCY_CONTACT": {"name": "Operator", "email": "ops@example.org", "phone_number": "555-0100"},
        "AZLIMITS": {"lower_bound": 0.0, "upper_bound": 360.0},
        "ELLIMITS": {"lower_bound": 10.0, "upper_bound": 80.0},
        "STOW_LOCATION": {"azimuth": 38.0, "elevation": 10.0},
        "CAL_LOCATION": {"azimuth": 120.0, "elevation": 20.0},
        "HORIZON_POINTS": [{"azimuth": 0, "elevation": 0}, {"azimuth": 180, "elevation": 5}],
        "MOTOR_TYPE": "NONE",
        "RADIO_CF": 1420000000,
        "RADIO_SF": 2400000,
        "RADIO_FREQ_CORR": 5000,
        "RADIO_NUM_BINS": 256,
        "RADIO_INTEG_CYCLES": 1000,
        "NUM_BEAMSWITCHES": 2,
        "BEAMWIDTH": 7.0,
        "TSYS": 171,
        "TCAL": 290,
        "SAVE_DIRECTORY": "/tmp/srt"
    }"#;

    fn write_dir(settings: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), settings).unwrap();
        fs::write(
            dir.path().join(CATALOG_FILE),
            "coordinate_system,coordinate_a,coordinate_b,name\ngalactic,0,0,G00\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_sample_settings_load_with_defaults() {
        let dir = write_dir(SAMPLE_SETTINGS);
        let config = ConfigDirectory::with_path(dir.path().to_path_buf());
        let settings = config.load_settings().unwrap();

        assert_eq!(settings.motor().unwrap(), MotorType::NoMotor);
        assert_eq!(settings.stow(), AzEl::new(38.0, 10.0));
        assert_eq!(settings.el_limits, AngleLimits::new(10.0, 80.0));
        assert_eq!(settings.horizon_points.len(), 2);
        assert_eq!(settings.command_port, 5556);
        assert_eq!(settings.status_port, 5555);
        assert_eq!(settings.radio_rpc_url, "http://localhost:5557/");
        assert_eq!(settings.n_pnt_count, 25);
        assert!(settings.radio_autostart);
        assert!(!settings.play_sounds);
        assert_eq!(settings.arrival_tolerance, ArrivalTolerance::default());
        assert_eq!(settings.radio_tasks.speech, vec!["spd-say".to_string()]);

        let catalog = config.load_catalog().unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_missing_directory_and_file() {
        let config = ConfigDirectory::with_path(PathBuf::from("/nonexistent/srt/config"));
        assert!(matches!(config.load_settings(), Err(ConfigError::MissingDirectory(_))));

        let dir = tempfile::tempdir().unwrap();
        let config = ConfigDirectory::with_path(dir.path().to_path_buf());
        assert!(matches!(config.load_settings(), Err(ConfigError::MissingFile(_))));
        assert!(matches!(config.load_catalog(), Err(ConfigError::MissingFile(_))));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let dir = write_dir("{\"STATION\": ");
        let config = ConfigDirectory::with_path(dir.path().to_path_buf());
        assert!(matches!(config.load_settings(), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let reject = |from: &str, to: &str, key: &str| {
            let text = SAMPLE_SETTINGS.replace(from, to);
            let settings = Settings::from_json(&text).unwrap();
            match settings.validate() {
                Err(ConfigError::Invalid { key: k, .. }) => assert_eq!(k, key),
                other => panic!("expected {key} to be rejected, got {other:?}"),
            }
        };
        reject("\"NONE\"", "\"PUSHROD\"", "MOTOR_TYPE");
        reject("\"latitude\": 42.5", "\"latitude\": 142.5", "STATION");
        reject("\"RADIO_SF\": 2400000", "\"RADIO_SF\": 0", "RADIO_SF");
        reject("\"RADIO_NUM_BINS\": 256", "\"RADIO_NUM_BINS\": 0", "RADIO_NUM_BINS");
    }

    #[test]
    fn test_custom_settings_file_name() {
        let dir = write_dir(SAMPLE_SETTINGS);
        fs::rename(dir.path().join(SETTINGS_FILE), dir.path().join("bench.json")).unwrap();
        let config = ConfigDirectory::with_path(dir.path().to_path_buf()).with_settings_file("bench.json");
        assert!(config.load_settings().is_ok());
    }

    #[test]
    fn test_calibration_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigDirectory::with_path(dir.path().join("nested"));
        assert!(config.get_calibration().is_none());

        let calibration = Calibration {
            cal_values: vec![1.0, 2.0, 3.0],
            cal_pwr: 0.5,
        };
        let path = config.save_calibration(&calibration).unwrap();
        assert!(path.ends_with(CALIBRATION_FILE));
        assert_eq!(config.get_calibration().unwrap().unwrap(), calibration);
    }
}
