//! Coordinate frames and the rotations between them.
//!
//! All frames are represented as unit vectors internally. Equatorial
//! coordinates are J2000 (ICRS) unless a function says otherwise; positions
//! "of date" are obtained with [`precess_from_j2000`].

use nalgebra::{Matrix3, Vector3};

use crate::sidereal::centuries_since_j2000;

/// Right ascension / declination in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equatorial {
    pub ra: f64,
    pub dec: f64,
}

/// Galactic longitude / latitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Galactic {
    pub l: f64,
    pub b: f64,
}

/// Azimuth (from north through east) / elevation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizontal {
    pub az: f64,
    pub el: f64,
}

/// ICRS to galactic rotation (Hipparcos definition).
fn icrs_to_galactic() -> Matrix3<f64> {
    Matrix3::new(
        -0.054_875_560_416_215_4,
        -0.873_437_090_234_885,
        -0.483_835_015_548_713_2,
        0.494_109_427_875_583_7,
        -0.444_829_629_960_011_2,
        0.746_982_244_497_218_9,
        -0.867_666_149_019_004_7,
        -0.198_076_373_431_201_5,
        0.455_983_776_175_066_9,
    )
}

/// FK4 B1950 to FK5 J2000 rotation for positions without proper motion.
fn fk4_to_fk5() -> Matrix3<f64> {
    Matrix3::new(
        0.999_925_678_2,
        -0.011_182_061_1,
        -0.004_857_947_7,
        0.011_182_061_0,
        0.999_937_478_4,
        -0.000_027_176_5,
        0.004_857_947_9,
        -0.000_027_147_4,
        0.999_988_199_7,
    )
}

/// Unit vector for a longitude/latitude pair in degrees.
pub fn unit_vector(lon_deg: f64, lat_deg: f64) -> Vector3<f64> {
    let (lon, lat) = (lon_deg.to_radians(), lat_deg.to_radians());
    Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

/// Longitude `[0, 360)` and latitude of a vector, in degrees.
pub fn spherical(v: &Vector3<f64>) -> (f64, f64) {
    let n = v.normalize();
    let lon = n.y.atan2(n.x).to_degrees().rem_euclid(360.0);
    let lat = n.z.clamp(-1.0, 1.0).asin().to_degrees();
    (lon, lat)
}

impl Equatorial {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    pub fn to_vector(self) -> Vector3<f64> {
        unit_vector(self.ra, self.dec)
    }

    pub fn from_vector(v: &Vector3<f64>) -> Self {
        let (ra, dec) = spherical(v);
        Self { ra, dec }
    }

    /// B1950 (FK4) position to J2000.
    pub fn fk4_to_j2000(self) -> Self {
        Self::from_vector(&(fk4_to_fk5() * self.to_vector()))
    }

    pub fn to_galactic(self) -> Galactic {
        let (l, b) = spherical(&(icrs_to_galactic() * self.to_vector()));
        Galactic { l, b }
    }
}

impl Galactic {
    pub fn new(l: f64, b: f64) -> Self {
        Self { l, b }
    }

    /// J2000 equatorial position.
    pub fn to_equatorial(self) -> Equatorial {
        Equatorial::from_vector(&(icrs_to_galactic().transpose() * unit_vector(self.l, self.b)))
    }
}

/// IAU 1976 precession matrix from J2000 to the mean equator of `jd`.
pub fn precession_matrix(jd: f64) -> Matrix3<f64> {
    let t = centuries_since_j2000(jd);
    let arcsec = |x: f64| (x / 3600.0).to_radians();
    let zeta = arcsec(2306.2181 * t + 0.30188 * t * t + 0.017998 * t * t * t);
    let z = arcsec(2306.2181 * t + 1.09468 * t * t + 0.018203 * t * t * t);
    let theta = arcsec(2004.3109 * t - 0.42665 * t * t - 0.041833 * t * t * t);

    let rz = |a: f64| {
        Matrix3::new(
            a.cos(),
            a.sin(),
            0.0,
            -a.sin(),
            a.cos(),
            0.0,
            0.0,
            0.0,
            1.0,
        )
    };
    let ry = |a: f64| {
        Matrix3::new(
            a.cos(),
            0.0,
            -a.sin(),
            0.0,
            1.0,
            0.0,
            a.sin(),
            0.0,
            a.cos(),
        )
    };
    rz(-z) * ry(theta) * rz(-zeta)
}

/// J2000 position to the mean equator and equinox of `jd`.
pub fn precess_from_j2000(position: Equatorial, jd: f64) -> Equatorial {
    Equatorial::from_vector(&(precession_matrix(jd) * position.to_vector()))
}

/// Inverse of [`precess_from_j2000`].
pub fn precess_to_j2000(position: Equatorial, jd: f64) -> Equatorial {
    Equatorial::from_vector(&(precession_matrix(jd).transpose() * position.to_vector()))
}

/// Equatorial position of date to horizontal for a given local sidereal time.
pub fn equatorial_to_horizontal(position: Equatorial, lst_deg: f64, latitude_deg: f64) -> Horizontal {
    let h = (lst_deg - position.ra).to_radians();
    let dec = position.dec.to_radians();
    let lat = latitude_deg.to_radians();

    let sin_el = dec.sin() * lat.sin() + dec.cos() * lat.cos() * h.cos();
    let el = sin_el.clamp(-1.0, 1.0).asin();
    let az = (-h.sin() * dec.cos()).atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * h.cos());

    Horizontal {
        az: az.to_degrees().rem_euclid(360.0),
        el: el.to_degrees(),
    }
}

/// Horizontal position to equatorial of date for a given local sidereal time.
pub fn horizontal_to_equatorial(position: Horizontal, lst_deg: f64, latitude_deg: f64) -> Equatorial {
    let az = position.az.to_radians();
    let el = position.el.to_radians();
    let lat = latitude_deg.to_radians();

    let sin_dec = el.sin() * lat.sin() + el.cos() * lat.cos() * az.cos();
    let dec = sin_dec.clamp(-1.0, 1.0).asin();
    let h = (-az.sin() * el.cos()).atan2(el.sin() * lat.cos() - el.cos() * lat.sin() * az.cos());

    Equatorial {
        ra: (lst_deg - h.to_degrees()).rem_euclid(360.0),
        dec: dec.to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidereal::J2000_JD;
    use approx::assert_relative_eq;

    #[test]
    fn test_galactic_centre() {
        let gc = Galactic::new(0.0, 0.0).to_equatorial();
        assert_relative_eq!(gc.ra, 266.405, epsilon = 1e-3);
        assert_relative_eq!(gc.dec, -28.936, epsilon = 1e-3);
    }

    #[test]
    fn test_galactic_round_trip() {
        let pos = Equatorial::new(83.633, 22.014);
        let back = pos.to_galactic().to_equatorial();
        assert_relative_eq!(back.ra, pos.ra, epsilon = 1e-9);
        assert_relative_eq!(back.dec, pos.dec, epsilon = 1e-9);
    }

    #[test]
    fn test_fk4_conversion_of_cas_a() {
        // Cas A: B1950 23h21m10s +58d32m20s, J2000 23h23m24s +58d48m54s
        let b1950 = Equatorial::new((23.0 + 21.0 / 60.0 + 10.0 / 3600.0) * 15.0, 58.0 + 32.0 / 60.0 + 20.0 / 3600.0);
        let j2000 = b1950.fk4_to_j2000();
        assert_relative_eq!(j2000.ra, (23.0 + 23.0 / 60.0 + 24.0 / 3600.0) * 15.0, epsilon = 0.02);
        assert_relative_eq!(j2000.dec, 58.0 + 48.0 / 60.0 + 54.0 / 3600.0, epsilon = 0.02);
    }

    #[test]
    fn test_precession_is_identity_at_j2000() {
        let pos = Equatorial::new(10.0, 20.0);
        let same = precess_from_j2000(pos, J2000_JD);
        assert_relative_eq!(same.ra, 10.0, epsilon = 1e-9);
        assert_relative_eq!(same.dec, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_precession_over_fifty_years() {
        // general precession in RA is ~3.07 s/yr for objects on the equator near RA 0
        let pos = Equatorial::new(0.0, 0.0);
        let later = precess_from_j2000(pos, J2000_JD + 50.0 * 365.25);
        assert_relative_eq!(later.ra, 50.0 * 3.075 * 15.0 / 3600.0, epsilon = 0.01);
        let back = precess_to_j2000(later, J2000_JD + 50.0 * 365.25);
        assert_relative_eq!(back.ra.rem_euclid(360.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_meridian_transit() {
        // on the meridian the object is due south at el = 90 - lat + dec
        let lat = 42.5;
        let pos = Equatorial::new(100.0, 10.0);
        let hz = equatorial_to_horizontal(pos, 100.0, lat);
        assert_relative_eq!(hz.az, 180.0, epsilon = 1e-9);
        assert_relative_eq!(hz.el, 90.0 - lat + 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_horizontal_round_trip() {
        let lat = 42.5;
        let lst = 37.0;
        for (ra, dec) in [(10.0, 20.0), (200.0, -15.0), (300.0, 70.0)] {
            let hz = equatorial_to_horizontal(Equatorial::new(ra, dec), lst, lat);
            let eq = horizontal_to_equatorial(hz, lst, lat);
            assert_relative_eq!(eq.ra, ra, epsilon = 1e-8);
            assert_relative_eq!(eq.dec, dec, epsilon = 1e-8);
        }
    }
}
