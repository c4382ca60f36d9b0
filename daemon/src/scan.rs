//! Offset patterns for N-point scans and beam switching, and their results.

use hardware::AzEl;
use serde::{Deserialize, Serialize};

/// Below this `cos(el)` the azimuth offset is forced to zero.
const MIN_AZ_SCALE: f64 = 1e-4;

/// Azimuth offset that spans `sky_offset` degrees on the sky at elevation `el`.
///
/// Near the zenith the conversion diverges, so the offset collapses to zero.
pub fn azimuth_offset(sky_offset: f64, el: f64) -> f64 {
    let scale = el.to_radians().cos();
    if scale.abs() < MIN_AZ_SCALE {
        0.0
    } else {
        sky_offset / scale
    }
}

/// Side length of the square grid used for `count` points.
pub fn grid_side(count: usize) -> usize {
    ((count as f64).sqrt().ceil() as usize).max(1)
}

pub fn is_perfect_square(count: usize) -> bool {
    let side = (count as f64).sqrt().round() as usize;
    side * side == count
}

/// Offset of point `index` in a grid of `count` points centred on the target.
///
/// Points are spaced half a beamwidth apart, row by row from low elevation to
/// high.
pub fn npoint_offset(index: usize, count: usize, beamwidth: f64, center_el: f64) -> AzEl {
    let side = grid_side(count);
    let middle = (side as f64 - 1.0) / 2.0;
    let row = (index / side) as f64 - middle;
    let col = (index % side) as f64 - middle;

    let el = row * beamwidth * 0.5;
    let az = azimuth_offset(col * beamwidth * 0.5, center_el + el);
    AzEl::new(az, el)
}

/// Azimuth offset for beam-switch step `step`: off, on, off, repeating.
pub fn beam_switch_offset(step: usize, beamwidth: f64, el: f64) -> AzEl {
    let side = (step % 3) as f64 - 1.0;
    AzEl::new(azimuth_offset(side * beamwidth, el), 0.0)
}

/// Result of an N-point scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NPointData {
    /// Mean target position over the scan
    pub scan_center: AzEl,
    /// Offset of the last grid point, the far corner
    pub max_offset: AzEl,
    pub rotor_locations: Vec<AzEl>,
    pub powers: Vec<f64>,
    /// Grid rows and columns
    pub grid: (usize, usize),
}

/// Result of a beam switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamSwitchData {
    pub rotor_locations: Vec<AzEl>,
    pub powers: Vec<f64>,
}

/// Componentwise mean of a set of positions.
pub fn mean_position(positions: &[AzEl]) -> AzEl {
    if positions.is_empty() {
        return AzEl::default();
    }
    let n = positions.len() as f64;
    let sum = positions
        .iter()
        .fold(AzEl::default(), |acc, &p| acc + p);
    AzEl::new(sum.az / n, sum.el / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_is_centred() {
        let bw = 4.0;
        let offsets: Vec<AzEl> = (0..9).map(|i| npoint_offset(i, 9, bw, 0.0)).collect();
        assert_relative_eq!(offsets[0].el, -2.0);
        assert_relative_eq!(offsets[0].az, -2.0 / 2f64.to_radians().cos(), epsilon = 1e-12);
        assert_relative_eq!(offsets[4].el, 0.0);
        assert_relative_eq!(offsets[4].az, 0.0);
        assert_relative_eq!(offsets[8].el, 2.0);

        let twentyfive: Vec<AzEl> = (0..25).map(|i| npoint_offset(i, 25, bw, 0.0)).collect();
        assert_relative_eq!(twentyfive[0].el, -4.0);
        assert_relative_eq!(twentyfive[12].el, 0.0);
        assert_relative_eq!(twentyfive[24].el, 4.0);
    }

    #[test]
    fn test_azimuth_widens_with_elevation() {
        // middle row, right column
        let low = npoint_offset(5, 9, 2.0, 0.0);
        let high = npoint_offset(5, 9, 2.0, 60.0);
        assert_relative_eq!(low.az, 1.0, epsilon = 1e-12);
        assert_relative_eq!(high.az, low.az / 60f64.to_radians().cos(), epsilon = 1e-9);
    }

    #[test]
    fn test_zenith_collapses_azimuth_offset() {
        // centre row of a 3x3 grid sits exactly at the zenith
        let at_zenith = npoint_offset(5, 9, 2.0, 90.0);
        assert_eq!(at_zenith.az, 0.0);
        assert_eq!(azimuth_offset(1.0, 90.0), 0.0);
        assert_eq!(beam_switch_offset(0, 7.0, 90.0).az, 0.0);
    }

    #[test]
    fn test_square_counts() {
        assert!(is_perfect_square(25));
        assert!(is_perfect_square(1));
        assert!(!is_perfect_square(20));
        assert_eq!(grid_side(20), 5);
        assert_eq!(grid_side(0), 1);
    }

    #[test]
    fn test_beam_switch_pattern() {
        let pattern: Vec<f64> = (0..6).map(|j| beam_switch_offset(j, 7.0, 0.0).az).collect();
        assert_eq!(pattern, vec![-7.0, 0.0, 7.0, -7.0, 0.0, 7.0]);
    }

    #[test]
    fn test_mean_position() {
        let mean = mean_position(&[AzEl::new(10.0, 20.0), AzEl::new(12.0, 24.0)]);
        assert_eq!(mean, AzEl::new(11.0, 22.0));
        assert_eq!(mean_position(&[]), AzEl::default());
    }
}
