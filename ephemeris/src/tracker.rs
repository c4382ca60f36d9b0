//! Time-gated cache of horizontal positions and LSR corrections.
//!
//! Recomputing every catalog object is cheap but not free, so
//! [`EphemerisTracker::refresh`] only recomputes when the cached positions are
//! at least [`refresh_interval`](EphemerisTracker::refresh_interval) old.
//! Callers may poll it as often as they like.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::coords::{
    equatorial_to_horizontal, horizontal_to_equatorial, precess_from_j2000, precess_to_j2000,
    Equatorial, Galactic, Horizontal,
};
use crate::sidereal::{julian_date, lst_deg};
use crate::solar::{moon_parallax_deg, moon_position, sun_position};
use crate::vlsr::vlsr_correction;

/// Minimum age of the cache before positions are recomputed.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Name under which the Sun is always tracked.
pub const SUN: &str = "Sun";

/// Name under which the Moon is always tracked.
pub const MOON: &str = "Moon";

/// Observer location on the Earth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    /// Geodetic latitude in degrees, north positive
    pub latitude: f64,
    /// Longitude in degrees, east positive
    pub longitude: f64,
}

impl Observer {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Positions of every catalog object plus the Sun and Moon.
pub struct EphemerisTracker {
    observer: Observer,
    catalog: Catalog,
    refresh_interval: Duration,
    last_update: Option<Instant>,
    azel: BTreeMap<String, Horizontal>,
    vlsr: BTreeMap<String, f64>,
}

impl EphemerisTracker {
    /// Build a tracker and compute positions for the current time.
    pub fn new(observer: Observer, catalog: Catalog) -> Self {
        for reserved in [SUN, MOON] {
            if catalog.get(reserved).is_some() {
                warn!("Catalog entry {:?} is replaced by the built-in ephemeris", reserved);
            }
        }
        let mut tracker = Self {
            observer,
            catalog,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            last_update: None,
            azel: BTreeMap::new(),
            vlsr: BTreeMap::new(),
        };
        tracker.refresh();
        tracker
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn observer(&self) -> Observer {
        self.observer
    }

    /// Recompute positions if the cache is stale. Returns true when recomputed.
    pub fn refresh(&mut self) -> bool {
        let stale = self
            .last_update
            .map_or(true, |at| at.elapsed() >= self.refresh_interval);
        if stale {
            self.update_at(OffsetDateTime::now_utc());
            self.last_update = Some(Instant::now());
        }
        stale
    }

    /// Unconditionally recompute positions for `at`.
    pub fn update_at(&mut self, at: OffsetDateTime) {
        let jd = julian_date(at);
        let lst = lst_deg(jd, self.observer.longitude);
        let lat = self.observer.latitude;

        let mut azel = BTreeMap::new();
        let mut vlsr = BTreeMap::new();

        for entry in self.catalog.entries() {
            let of_date = precess_from_j2000(entry.position, jd);
            azel.insert(entry.name.clone(), equatorial_to_horizontal(of_date, lst, lat));
            vlsr.insert(entry.name.clone(), vlsr_correction(entry.position, jd, lst, lat));
        }

        let sun = sun_position(jd);
        azel.insert(SUN.to_string(), equatorial_to_horizontal(sun, lst, lat));
        vlsr.insert(SUN.to_string(), vlsr_correction(sun, jd, lst, lat));

        let moon = moon_position(jd);
        let mut moon_hz = equatorial_to_horizontal(moon, lst, lat);
        moon_hz.el -= moon_parallax_deg(jd, moon_hz.el);
        azel.insert(MOON.to_string(), moon_hz);
        vlsr.insert(MOON.to_string(), vlsr_correction(moon, jd, lst, lat));

        debug!("Updated {} object positions at LST {:.3}", azel.len(), lst);
        self.azel = azel;
        self.vlsr = vlsr;
    }

    pub fn azimuth_elevation(&self, name: &str) -> Option<Horizontal> {
        self.azel.get(name).copied()
    }

    pub fn all_azimuth_elevation(&self) -> &BTreeMap<String, Horizontal> {
        &self.azel
    }

    pub fn vlsr(&self, name: &str) -> Option<f64> {
        self.vlsr.get(name).copied()
    }

    pub fn all_vlsr(&self) -> &BTreeMap<String, f64> {
        &self.vlsr
    }

    fn horizontal_to_j2000(&self, position: Horizontal, at: OffsetDateTime) -> (Equatorial, f64, f64) {
        let jd = julian_date(at);
        let lst = lst_deg(jd, self.observer.longitude);
        let of_date = horizontal_to_equatorial(position, lst, self.observer.latitude);
        (precess_to_j2000(of_date, jd), jd, lst)
    }

    /// Galactic coordinates of a horizontal direction at `at`.
    pub fn convert_to_galactic_at(&self, position: Horizontal, at: OffsetDateTime) -> Galactic {
        self.horizontal_to_j2000(position, at).0.to_galactic()
    }

    /// Galactic coordinates of a horizontal direction now.
    pub fn convert_to_galactic(&self, position: Horizontal) -> Galactic {
        self.convert_to_galactic_at(position, OffsetDateTime::now_utc())
    }

    /// LSR correction toward a horizontal direction at `at`.
    pub fn vlsr_toward_at(&self, position: Horizontal, at: OffsetDateTime) -> f64 {
        let (j2000, jd, lst) = self.horizontal_to_j2000(position, at);
        vlsr_correction(j2000, jd, lst, self.observer.latitude)
    }

    /// LSR correction toward a horizontal direction now.
    pub fn vlsr_toward(&self, position: Horizontal) -> f64 {
        self.vlsr_toward_at(position, OffsetDateTime::now_utc())
    }
}
