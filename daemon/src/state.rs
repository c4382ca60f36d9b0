//! Shared daemon state.
//!
//! Every field that more than one loop can see lives in a [`Latest`] cell.
//! Writers always replace the whole value and readers always receive an owned
//! copy, so a reader can never observe half of an update. Fields are
//! partitioned by writer:
//!
//! | Field | Writer |
//! |---|---|
//! | `rotor_location` | servo loop |
//! | `pointing` | interpreter, ephemeris loop (destination only, while tracking) |
//! | `ephemeris_locations`, `ephemeris_vlsr` | ephemeris loop |
//! | everything else | interpreter |
//!
//! The commanded angle is not stored separately: it is derived from a
//! [`Pointing`] snapshot, so destination, offsets and command can never
//! disagree.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use hardware::AzEl;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calibration::Calibration;
use crate::scan::{BeamSwitchData, NPointData};

/// Text shown as the current command while the interpreter is idle.
pub const IDLE_COMMAND: &str = "None";

/// A value that is only ever replaced wholesale.
#[derive(Debug, Default)]
pub struct Latest<T> {
    value: RwLock<T>,
}

impl<T: Clone> Latest<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Owned copy of the current value.
    pub fn get(&self) -> T {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, value: T) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Replace the value with one derived from it, without another writer
    /// slipping in between the read and the write.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(&guard);
        *guard = next;
    }

    /// Like [`update`](Self::update) but the derivation may refuse, in which
    /// case the value is left untouched.
    pub fn try_update<E>(&self, f: impl FnOnce(&T) -> Result<T, E>) -> Result<(), E> {
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(&guard)?;
        *guard = next;
        Ok(())
    }
}

/// Where the antenna should be, before and after offsets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pointing {
    /// Target without offsets
    pub destination: AzEl,
    /// Offsets added on top of the destination
    pub offsets: AzEl,
    /// Object whose ephemeris drives the destination, if any
    pub tracking: Option<String>,
}

impl Pointing {
    /// Hold a fixed position with no offsets.
    pub fn fixed(destination: AzEl) -> Self {
        Self {
            destination,
            offsets: AzEl::default(),
            tracking: None,
        }
    }

    /// Follow `name`, currently at `destination`, with no offsets.
    pub fn tracking(name: impl Into<String>, destination: AzEl) -> Self {
        Self {
            destination,
            offsets: AzEl::default(),
            tracking: Some(name.into()),
        }
    }

    /// The angle actually sent to the rotor.
    pub fn commanded(&self) -> AzEl {
        self.destination.offset_by(self.offsets)
    }

    pub fn with_destination(&self, destination: AzEl) -> Self {
        Self {
            destination,
            ..self.clone()
        }
    }

    pub fn with_offsets(&self, offsets: AzEl) -> Self {
        Self {
            offsets,
            ..self.clone()
        }
    }

    pub fn without_tracking(&self) -> Self {
        Self {
            tracking: None,
            ..self.clone()
        }
    }
}

/// Desired radio parameters, mirrored to the radio endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioSettings {
    /// Hz, before correction
    pub center_frequency: f64,
    /// Hz
    pub frequency_correction: f64,
    /// Hz
    pub sample_rate: f64,
    pub num_bins: usize,
    pub integ_cycles: usize,
    pub tsys: f64,
    pub tcal: f64,
    pub cal_power: f64,
    pub cal_values: Arc<Vec<f64>>,
}

impl RadioSettings {
    /// Frequency actually tuned by the radio.
    pub fn tuned_frequency(&self) -> f64 {
        self.center_frequency + self.frequency_correction
    }

    pub fn with_calibration(&self, calibration: Calibration) -> Self {
        Self {
            cal_power: calibration.cal_pwr,
            cal_values: Arc::new(calibration.cal_values),
            ..self.clone()
        }
    }
}

/// One error-log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Seconds since the Unix epoch
    pub time: f64,
    pub message: String,
}

/// Seconds since the Unix epoch as a float.
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Append-only operator-visible error log.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl ErrorLog {
    pub fn push(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                time: unix_time(),
                message,
            });
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the daemon's loops share.
#[derive(Debug)]
pub struct DaemonState {
    pub rotor_location: Latest<AzEl>,
    pub pointing: Latest<Pointing>,
    pub ephemeris_locations: Latest<Arc<BTreeMap<String, AzEl>>>,
    pub ephemeris_vlsr: Latest<Arc<BTreeMap<String, f64>>>,
    /// VLSR toward whatever the antenna is pointed at
    pub current_vlsr: Latest<f64>,
    pub current_queue_item: Latest<String>,
    pub radio: Latest<RadioSettings>,
    /// Description of the running recording task
    pub recording: Latest<Option<String>>,
    pub n_point_data: Latest<Option<NPointData>>,
    pub beam_switch_data: Latest<Option<BeamSwitchData>>,
    /// Rotor positions visited so far by the running scan
    pub rotor_loc_npoint_live: Latest<Vec<AzEl>>,
    pub error_log: ErrorLog,
    keep_running: AtomicBool,
}

impl DaemonState {
    /// Fresh state parked at `stow`.
    pub fn new(stow: AzEl, radio: RadioSettings) -> Self {
        Self {
            rotor_location: Latest::new(stow),
            pointing: Latest::new(Pointing::fixed(stow)),
            ephemeris_locations: Latest::new(Arc::new(BTreeMap::new())),
            ephemeris_vlsr: Latest::new(Arc::new(BTreeMap::new())),
            current_vlsr: Latest::new(0.0),
            current_queue_item: Latest::new(IDLE_COMMAND.to_string()),
            radio: Latest::new(radio),
            recording: Latest::new(None),
            n_point_data: Latest::new(None),
            beam_switch_data: Latest::new(None),
            rotor_loc_npoint_live: Latest::new(Vec::new()),
            error_log: ErrorLog::default(),
            keep_running: AtomicBool::new(true),
        }
    }

    pub fn keep_running(&self) -> bool {
        self.keep_running.load(Ordering::SeqCst)
    }

    /// Ask the interpreter to leave its loop after the current command.
    pub fn request_stop(&self) {
        self.keep_running.store(false, Ordering::SeqCst);
    }

    pub fn rotor_cmd_location(&self) -> AzEl {
        self.pointing.get().commanded()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::thread;

    pub(crate) fn radio_settings() -> RadioSettings {
        RadioSettings {
            center_frequency: 1_420_000_000.0,
            frequency_correction: 5_000.0,
            sample_rate: 2_400_000.0,
            num_bins: 4,
            integ_cycles: 10,
            tsys: 171.0,
            tcal: 290.0,
            cal_power: 1.0,
            cal_values: Arc::new(vec![1.0; 4]),
        }
    }

    #[test]
    fn test_initial_state_is_stowed() {
        let stow = AzEl::new(38.0, 10.0);
        let state = DaemonState::new(stow, radio_settings());
        assert_eq!(state.rotor_location.get(), stow);
        assert_eq!(state.rotor_cmd_location(), stow);
        assert_eq!(state.pointing.get().tracking, None);
        assert_eq!(state.current_queue_item.get(), IDLE_COMMAND);
        assert!(state.keep_running());
        state.request_stop();
        assert!(!state.keep_running());
    }

    #[test]
    fn test_pointing_composition() {
        let p = Pointing::tracking("Sun", AzEl::new(100.0, 30.0)).with_offsets(AzEl::new(-2.0, 1.5));
        assert_eq!(p.commanded(), AzEl::new(98.0, 31.5));
        let moved = p.with_destination(AzEl::new(101.0, 31.0));
        assert_eq!(moved.commanded(), AzEl::new(99.0, 32.5));
        assert_eq!(moved.tracking.as_deref(), Some("Sun"));
        assert_eq!(moved.without_tracking().tracking, None);
    }

    #[test]
    fn test_try_update_leaves_value_on_refusal() {
        let cell = Latest::new(Pointing::fixed(AzEl::new(1.0, 2.0)));
        let refused: Result<(), &str> = cell.try_update(|_| Err("no"));
        assert!(refused.is_err());
        assert_eq!(cell.get(), Pointing::fixed(AzEl::new(1.0, 2.0)));

        cell.try_update::<()>(|p| Ok(p.with_offsets(AzEl::new(1.0, 1.0))))
            .unwrap();
        assert_eq!(cell.get().commanded(), AzEl::new(2.0, 3.0));
    }

    #[test]
    fn test_readers_never_see_torn_pointing() {
        let a = Pointing::tracking("A", AzEl::new(10.0, 20.0)).with_offsets(AzEl::new(1.0, 1.0));
        let b = Pointing::fixed(AzEl::new(300.0, 70.0));
        let cell = Arc::new(Latest::new(a.clone()));

        let writers: Vec<_> = [a.clone(), b.clone()]
            .into_iter()
            .map(|value| {
                let cell = cell.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        cell.replace(value.clone());
                    }
                })
            })
            .collect();

        for _ in 0..10_000 {
            let seen = cell.get();
            assert!(seen == a || seen == b, "torn value {seen:?}");
        }
        for w in writers {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_error_log_appends_in_order() {
        let log = ErrorLog::default();
        assert!(log.is_empty());
        log.push("first");
        log.push(String::from("second"));
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert!(entries[0].time <= entries[1].time);
    }
}
