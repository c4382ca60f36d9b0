//! Ephemeris access and the loop that keeps tracked targets current.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ephemeris::{EphemerisTracker, Galactic, Horizontal};
use hardware::{AzEl, AzElLimits};
use tracing::{debug, info};

use crate::state::DaemonState;
use crate::wait::sleep_while;

/// Object positions as seen by the daemon.
pub trait EphemerisSource: Send + Sync {
    /// Recompute positions if they are stale. Returns true when recomputed.
    fn refresh(&self) -> bool;

    fn locations(&self) -> BTreeMap<String, AzEl>;

    fn vlsr(&self) -> BTreeMap<String, f64>;

    /// Galactic coordinates of a horizontal direction now.
    fn to_galactic(&self, position: AzEl) -> Galactic;

    /// LSR correction toward a horizontal direction now.
    fn vlsr_toward(&self, position: AzEl) -> f64;
}

fn to_horizontal(position: AzEl) -> Horizontal {
    Horizontal {
        az: position.az,
        el: position.el,
    }
}

/// [`EphemerisSource`] backed by an [`EphemerisTracker`].
pub struct TrackerSource {
    tracker: Mutex<EphemerisTracker>,
}

impl TrackerSource {
    pub fn new(tracker: EphemerisTracker) -> Self {
        Self {
            tracker: Mutex::new(tracker),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut EphemerisTracker) -> T) -> T {
        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tracker)
    }
}

impl EphemerisSource for TrackerSource {
    fn refresh(&self) -> bool {
        self.with(|t| t.refresh())
    }

    fn locations(&self) -> BTreeMap<String, AzEl> {
        self.with(|t| {
            t.all_azimuth_elevation()
                .iter()
                .map(|(name, hz)| (name.clone(), AzEl::new(hz.az, hz.el)))
                .collect()
        })
    }

    fn vlsr(&self) -> BTreeMap<String, f64> {
        self.with(|t| t.all_vlsr().clone())
    }

    fn to_galactic(&self, position: AzEl) -> Galactic {
        self.with(|t| t.convert_to_galactic(to_horizontal(position)))
    }

    fn vlsr_toward(&self, position: AzEl) -> f64 {
        self.with(|t| t.vlsr_toward(to_horizontal(position)))
    }
}

/// Refreshes object positions and moves the destination of a tracked target.
pub struct EphemerisLoop {
    state: Arc<DaemonState>,
    source: Arc<dyn EphemerisSource>,
    limits: AzElLimits,
    poll: Duration,
}

impl EphemerisLoop {
    /// Build the loop and publish the current positions immediately.
    pub fn new(
        state: Arc<DaemonState>,
        source: Arc<dyn EphemerisSource>,
        limits: AzElLimits,
        poll: Duration,
    ) -> Self {
        let ephemeris = Self {
            state,
            source,
            limits,
            poll,
        };
        ephemeris.publish();
        ephemeris
    }

    fn publish(&self) {
        self.state
            .ephemeris_locations
            .replace(Arc::new(self.source.locations()));
        self.state.ephemeris_vlsr.replace(Arc::new(self.source.vlsr()));
    }

    /// One refresh-and-retarget cycle.
    pub fn step(&self) {
        if self.source.refresh() {
            debug!("Ephemeris refreshed");
            self.publish();
        }

        let locations = self.state.ephemeris_locations.get();
        let limits = self.limits;
        let mut lost = None;
        self.state.pointing.update(|pointing| {
            let Some(name) = &pointing.tracking else {
                return pointing.clone();
            };
            match locations.get(name) {
                Some(&destination)
                    if limits.contains(destination)
                        && limits.contains(destination.offset_by(pointing.offsets)) =>
                {
                    pointing.with_destination(destination)
                }
                _ => {
                    lost = Some(name.clone());
                    pointing.without_tracking()
                }
            }
        });

        if let Some(name) = lost {
            self.state
                .error_log
                .push(format!("Object {name} moved out of motor bounds"));
            return;
        }
        if let Some(name) = self.state.pointing.get().tracking {
            if let Some(&vlsr) = self.state.ephemeris_vlsr.get().get(&name) {
                self.state.current_vlsr.replace(vlsr);
            }
        }
    }

    pub fn run(&self, running: &AtomicBool) {
        info!("Ephemeris loop started");
        while running.load(Ordering::SeqCst) {
            self.step();
            sleep_while(running, self.poll);
        }
        info!("Ephemeris loop stopped");
    }
}
