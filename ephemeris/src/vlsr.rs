//! Observer velocity relative to the Local Standard of Rest.
//!
//! The correction returned by [`vlsr_correction`] is the component of the
//! observer's LSR velocity along the line of sight, positive when the observer
//! moves toward the source. Adding it to a topocentric radial velocity gives
//! the LSR radial velocity.
//!
//! Components:
//! - Solar motion: 20 km/s toward the standard apex
//! - Earth orbit: circular, 29.78 km/s
//! - Earth rotation: 0.465 km/s at the equator
//!
//! Frame differences between J2000 and "of date" are ignored; they contribute
//! well under 0.1 km/s.

use nalgebra::Vector3;

use crate::coords::{unit_vector, Equatorial};
use crate::solar::{obliquity_deg, sun_longitude_deg};

/// Standard solar motion in km/s.
pub const SOLAR_MOTION_KMS: f64 = 20.0;

/// Standard solar apex (RA 18h, Dec +30 at B1900) expressed in J2000 degrees.
pub const SOLAR_APEX: Equatorial = Equatorial {
    ra: 270.96,
    dec: 29.99,
};

/// Mean orbital speed of the Earth in km/s.
pub const EARTH_ORBITAL_SPEED_KMS: f64 = 29.78;

/// Equatorial rotation speed of the Earth's surface in km/s.
pub const EARTH_ROTATION_SPEED_KMS: f64 = 0.4651;

/// Heliocentric velocity of the Earth in equatorial coordinates (km/s).
pub fn earth_orbital_velocity(jd: f64) -> Vector3<f64> {
    // The Earth moves toward ecliptic longitude (sun - 90 deg).
    let apex = (sun_longitude_deg(jd) - 90.0).to_radians();
    let eps = obliquity_deg(jd).to_radians();
    let ecliptic = Vector3::new(apex.cos(), apex.sin(), 0.0);
    EARTH_ORBITAL_SPEED_KMS
        * Vector3::new(
            ecliptic.x,
            ecliptic.y * eps.cos() - ecliptic.z * eps.sin(),
            ecliptic.y * eps.sin() + ecliptic.z * eps.cos(),
        )
}

/// Rotational velocity of an observer in equatorial coordinates (km/s).
pub fn earth_rotation_velocity(lst_deg: f64, latitude_deg: f64) -> Vector3<f64> {
    let speed = EARTH_ROTATION_SPEED_KMS * latitude_deg.to_radians().cos();
    speed * unit_vector(lst_deg + 90.0, 0.0)
}

/// Total observer velocity relative to the LSR (km/s).
pub fn observer_velocity(jd: f64, lst_deg: f64, latitude_deg: f64) -> Vector3<f64> {
    SOLAR_MOTION_KMS * SOLAR_APEX.to_vector()
        + earth_orbital_velocity(jd)
        + earth_rotation_velocity(lst_deg, latitude_deg)
}

/// LSR correction for a source direction in km/s.
pub fn vlsr_correction(direction: Equatorial, jd: f64, lst_deg: f64, latitude_deg: f64) -> f64 {
    observer_velocity(jd, lst_deg, latitude_deg).dot(&direction.to_vector())
}
