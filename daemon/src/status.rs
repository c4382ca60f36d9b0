//! Status snapshots and their fan-out to subscribers.
//!
//! The publisher reads every shared field on a fixed cadence and hands the
//! resulting [`StatusSnapshot`] to a broadcast channel. Readers that fall
//! behind skip snapshots; only the newest one matters.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use hardware::{AngleLimits, AzEl};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::{Contact, Settings, Station};
use crate::queue::CommandSender;
use crate::scan::{BeamSwitchData, NPointData};
use crate::state::{unix_time, DaemonState, LogEntry};

/// Snapshots older than this mean the daemon is gone.
pub const STALE_AFTER: Duration = Duration::from_secs(5);

/// Parts of the status that never change while the daemon runs.
#[derive(Debug, Clone)]
pub struct StationInfo {
    pub beam_width: f64,
    pub location: Station,
    pub az_limits: AngleLimits,
    pub el_limits: AngleLimits,
    pub stow_loc: AzEl,
    pub cal_loc: AzEl,
    pub horizon_points: Vec<AzEl>,
    pub emergency_contact: Contact,
    pub motor_type: String,
}

impl StationInfo {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            beam_width: settings.beamwidth,
            location: settings.station.clone(),
            az_limits: settings.az_limits,
            el_limits: settings.el_limits,
            stow_loc: settings.stow(),
            cal_loc: settings.cal(),
            horizon_points: settings.horizon_points.iter().map(|p| p.azel()).collect(),
            emergency_contact: settings.emergency_contact.clone(),
            motor_type: settings.motor_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub beam_width: f64,
    pub location: Station,
    pub motor_azel: AzEl,
    pub motor_cmd_azel: AzEl,
    pub motor_offsets: AzEl,
    /// Object being tracked, if any
    pub tracking: Option<String>,
    pub vlsr: f64,
    pub object_locs: BTreeMap<String, AzEl>,
    pub az_limits: AngleLimits,
    pub el_limits: AngleLimits,
    pub stow_loc: AzEl,
    pub cal_loc: AzEl,
    pub horizon_points: Vec<AzEl>,
    /// Hz, before correction
    pub center_frequency: f64,
    pub frequency_correction: f64,
    /// Hz
    pub bandwidth: f64,
    pub queued_item: String,
    pub queue_size: usize,
    pub emergency_contact: Contact,
    pub error_logs: Vec<LogEntry>,
    pub temp_cal: f64,
    pub temp_sys: f64,
    pub cal_power: f64,
    pub n_point_data: Option<NPointData>,
    pub rotor_loc_npoint_live: Vec<AzEl>,
    pub beam_switch_data: Option<BeamSwitchData>,
    pub motor_type: String,
    pub radio_save_task: Option<String>,
    /// Seconds since the Unix epoch
    pub time: f64,
}

impl StatusSnapshot {
    /// Read every shared field. Fields are read one at a time, so the
    /// snapshot as a whole is only eventually consistent.
    pub fn capture(info: &StationInfo, state: &DaemonState, queue_size: usize) -> Self {
        let pointing = state.pointing.get();
        let radio = state.radio.get();
        Self {
            beam_width: info.beam_width,
            location: info.location.clone(),
            motor_azel: state.rotor_location.get(),
            motor_cmd_azel: pointing.commanded(),
            motor_offsets: pointing.offsets,
            tracking: pointing.tracking,
            vlsr: state.current_vlsr.get(),
            object_locs: state.ephemeris_locations.get().as_ref().clone(),
            az_limits: info.az_limits,
            el_limits: info.el_limits,
            stow_loc: info.stow_loc,
            cal_loc: info.cal_loc,
            horizon_points: info.horizon_points.clone(),
            center_frequency: radio.center_frequency,
            frequency_correction: radio.frequency_correction,
            bandwidth: radio.sample_rate,
            queued_item: state.current_queue_item.get(),
            queue_size,
            emergency_contact: info.emergency_contact.clone(),
            error_logs: state.error_log.entries(),
            temp_cal: radio.tcal,
            temp_sys: radio.tsys,
            cal_power: radio.cal_power,
            n_point_data: state.n_point_data.get(),
            rotor_loc_npoint_live: state.rotor_loc_npoint_live.get(),
            beam_switch_data: state.beam_switch_data.get(),
            motor_type: info.motor_type.clone(),
            radio_save_task: state.recording.get(),
            time: unix_time(),
        }
    }

    /// Seconds between this snapshot and `now`.
    pub fn age(&self, now: f64) -> f64 {
        now - self.time
    }

    pub fn is_stale(&self, now: f64) -> bool {
        self.age(now) > STALE_AFTER.as_secs_f64()
    }
}

/// Broadcaster for status snapshots that also remembers the newest one.
pub struct StatusBroadcaster {
    tx: broadcast::Sender<Arc<StatusSnapshot>>,
    latest: RwLock<Option<Arc<StatusSnapshot>>>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            latest: RwLock::new(None),
        }
    }

    /// Returns the number of subscribers reached.
    pub fn publish(&self, snapshot: StatusSnapshot) -> usize {
        let snapshot = Arc::new(snapshot);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        self.tx.send(snapshot).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StatusSnapshot>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<StatusSnapshot>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Publish a snapshot every `period` until the daemon stops.
pub async fn run_status_publisher(
    broadcaster: Arc<StatusBroadcaster>,
    state: Arc<DaemonState>,
    info: StationInfo,
    queue: CommandSender,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    while state.keep_running() {
        interval.tick().await;
        let snapshot = StatusSnapshot::capture(&info, &state, queue.len());
        let reached = broadcaster.publish(snapshot);
        debug!("Status published to {} subscribers", reached);
    }
}
