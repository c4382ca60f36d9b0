//! Low-precision Sun and Moon.
//!
//! Sun: Astronomical Almanac short series, about 0.01 deg.
//! Moon: truncated lunar theory, about 0.3 deg geocentric. A topocentric
//! parallax correction is applied to the elevation by [`moon_parallax_deg`].

use crate::coords::{spherical, unit_vector, Equatorial};
use crate::sidereal::{centuries_since_j2000, J2000_JD};

/// Mean obliquity of the ecliptic in degrees.
pub fn obliquity_deg(jd: f64) -> f64 {
    23.439 - 0.000_000_4 * (jd - J2000_JD)
}

/// Ecliptic longitude/latitude of date to equatorial of date.
pub fn ecliptic_to_equatorial(lambda_deg: f64, beta_deg: f64, jd: f64) -> Equatorial {
    let eps = obliquity_deg(jd).to_radians();
    let v = unit_vector(lambda_deg, beta_deg);
    let rotated = nalgebra::Vector3::new(
        v.x,
        v.y * eps.cos() - v.z * eps.sin(),
        v.y * eps.sin() + v.z * eps.cos(),
    );
    let (ra, dec) = spherical(&rotated);
    Equatorial { ra, dec }
}

/// Apparent ecliptic longitude of the Sun in degrees.
pub fn sun_longitude_deg(jd: f64) -> f64 {
    let n = jd - J2000_JD;
    let mean_longitude = 280.460 + 0.985_647_4 * n;
    let g = (357.528 + 0.985_600_3 * n).to_radians();
    (mean_longitude + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()).rem_euclid(360.0)
}

/// Sun position of date.
pub fn sun_position(jd: f64) -> Equatorial {
    ecliptic_to_equatorial(sun_longitude_deg(jd), 0.0, jd)
}

/// Moon position of date (geocentric).
pub fn moon_position(jd: f64) -> Equatorial {
    let t = centuries_since_j2000(jd);
    let s = |a: f64, b: f64| (a + b * t).to_radians().sin();

    let lambda = 218.32 + 481_267.881 * t + 6.29 * s(135.0, 477_198.87)
        - 1.27 * s(259.3, -413_335.36)
        + 0.66 * s(235.7, 890_534.22)
        + 0.21 * s(269.9, 954_397.74)
        - 0.19 * s(357.5, 35_999.05)
        - 0.11 * s(186.5, 966_404.03);
    let beta = 5.13 * s(93.3, 483_202.02) + 0.28 * s(228.2, 960_400.89)
        - 0.28 * s(318.3, 6_003.15)
        - 0.17 * s(217.6, -407_332.21);

    ecliptic_to_equatorial(lambda.rem_euclid(360.0), beta, jd)
}

/// Horizontal parallax of the Moon in degrees.
pub fn moon_horizontal_parallax_deg(jd: f64) -> f64 {
    let t = centuries_since_j2000(jd);
    let c = |a: f64, b: f64| (a + b * t).to_radians().cos();
    0.9508 + 0.0518 * c(134.9, 477_198.85)
        + 0.0095 * c(259.2, -413_335.38)
        + 0.0078 * c(235.7, 890_534.23)
        + 0.0028 * c(269.9, 954_397.70)
}

/// Drop in apparent elevation from geocentric to topocentric for the Moon.
pub fn moon_parallax_deg(jd: f64, geocentric_el_deg: f64) -> f64 {
    moon_horizontal_parallax_deg(jd) * geocentric_el_deg.to_radians().cos()
}
