//! Julian dates and sidereal time.

use time::OffsetDateTime;

/// Julian date of the Unix epoch.
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Julian date of J2000.0 (2000-01-01 12:00 TT, treated as UTC here).
pub const J2000_JD: f64 = 2_451_545.0;

/// Julian date of B1950.0.
pub const B1950_JD: f64 = 2_433_282.4235;

const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_CENTURY: f64 = 36_525.0;

/// Julian date for a UTC instant.
pub fn julian_date(at: OffsetDateTime) -> f64 {
    let seconds = at.unix_timestamp() as f64 + f64::from(at.nanosecond()) * 1e-9;
    UNIX_EPOCH_JD + seconds / SECONDS_PER_DAY
}

/// Julian centuries since J2000.
pub fn centuries_since_j2000(jd: f64) -> f64 {
    (jd - J2000_JD) / DAYS_PER_CENTURY
}

/// Greenwich mean sidereal time in degrees, `[0, 360)`.
pub fn gmst_deg(jd: f64) -> f64 {
    let d = jd - J2000_JD;
    let t = d / DAYS_PER_CENTURY;
    let gmst = 280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    gmst.rem_euclid(360.0)
}

/// Local mean sidereal time in degrees for an east-positive longitude.
pub fn lst_deg(jd: f64, longitude_deg: f64) -> f64 {
    (gmst_deg(jd) + longitude_deg).rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use time::macros::datetime;

    #[test]
    fn test_julian_date_of_j2000() {
        let jd = julian_date(datetime!(2000-01-01 12:00 UTC));
        assert_relative_eq!(jd, J2000_JD, epsilon = 1e-9);
    }

    #[test]
    fn test_gmst_reference_value() {
        // Meeus example 12.a: 1987-04-10 0h UT -> 13h10m46.3668s
        let jd = julian_date(datetime!(1987-04-10 0:00 UTC));
        let expected = (13.0 + 10.0 / 60.0 + 46.3668 / 3600.0) * 15.0;
        assert_relative_eq!(gmst_deg(jd), expected, epsilon = 1e-4);
    }

    #[test]
    fn test_lst_wraps() {
        let jd = J2000_JD;
        let lst = lst_deg(jd, 200.0);
        assert!((0.0..360.0).contains(&lst));
        assert_relative_eq!(lst, (gmst_deg(jd) + 200.0) % 360.0, epsilon = 1e-9);
    }
}
