//! Azimuth/elevation pairs, wrap-aware pointing limits, and the arrival check.
//!
//! # Limit semantics
//!
//! A limit is a `(lower_bound, upper_bound)` pair. When `lower <= upper` the
//! legal range is the closed band `[lower, upper]`. When `lower > upper` the
//! pair describes a forbidden wedge instead: every angle that is NOT strictly
//! between the two bounds is legal, and both bounds themselves are legal.
//!
//! ```
//! use hardware::AngleLimits;
//!
//! let wedge = AngleLimits::new(350.0, 10.0);
//! assert!(wedge.contains(5.0));
//! assert!(wedge.contains(350.0));
//! assert!(!wedge.contains(180.0));
//! ```

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Default arrival tolerance on each axis in degrees.
pub const DEFAULT_TOLERANCE_DEG: f64 = 0.5;

/// Azimuth/elevation coordinate pair in degrees.
///
/// Serialized as a two-element `[az, el]` array so status consumers see the
/// same shape as the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct AzEl {
    /// Azimuth in degrees
    pub az: f64,
    /// Elevation in degrees
    pub el: f64,
}

impl AzEl {
    pub const fn new(az: f64, el: f64) -> Self {
        Self { az, el }
    }

    /// Componentwise sum of a destination and an offset.
    pub fn offset_by(self, offset: AzEl) -> Self {
        self + offset
    }
}

impl Add for AzEl {
    type Output = AzEl;

    fn add(self, rhs: AzEl) -> AzEl {
        AzEl::new(self.az + rhs.az, self.el + rhs.el)
    }
}

impl From<(f64, f64)> for AzEl {
    fn from((az, el): (f64, f64)) -> Self {
        Self { az, el }
    }
}

impl From<AzEl> for (f64, f64) {
    fn from(value: AzEl) -> Self {
        (value.az, value.el)
    }
}

impl fmt::Display for AzEl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.az, self.el)
    }
}

/// A single-axis limit pair, possibly wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleLimits {
    #[serde(rename = "lower_bound")]
    pub lower: f64,
    #[serde(rename = "upper_bound")]
    pub upper: f64,
}

impl AngleLimits {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// True when the pair describes a forbidden wedge (`lower > upper`).
    pub fn wraps(&self) -> bool {
        self.lower > self.upper
    }

    /// Absolute distance between the two bounds.
    pub fn span(&self) -> f64 {
        (self.upper - self.lower).abs()
    }

    /// Wrap-aware legality test. Bounds are inclusive in both modes.
    pub fn contains(&self, angle: f64) -> bool {
        if self.wraps() {
            !(self.lower < angle && angle < self.upper)
        } else {
            self.lower <= angle && angle <= self.upper
        }
    }
}

/// Azimuth and elevation limit pairs for one mount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AzElLimits {
    pub az: AngleLimits,
    pub el: AngleLimits,
}

impl AzElLimits {
    pub const fn new(az: AngleLimits, el: AngleLimits) -> Self {
        Self { az, el }
    }

    /// True iff both axes are legal.
    pub fn contains(&self, position: AzEl) -> bool {
        self.az.contains(position.az) && self.el.contains(position.el)
    }

    /// Position corresponding to the lower bound of both axes.
    ///
    /// Counting mounts treat this as their zero-count origin.
    pub fn lower_corner(&self) -> AzEl {
        AzEl::new(self.az.lower, self.el.lower)
    }
}

/// Per-axis arrival tolerance in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrivalTolerance {
    pub az: f64,
    pub el: f64,
}

impl Default for ArrivalTolerance {
    fn default() -> Self {
        Self {
            az: DEFAULT_TOLERANCE_DEG,
            el: DEFAULT_TOLERANCE_DEG,
        }
    }
}

/// True iff `actual` is strictly within `tolerance` of `desired` on BOTH axes.
pub fn azel_within_range(actual: AzEl, desired: AzEl, tolerance: ArrivalTolerance) -> bool {
    (actual.az - desired.az).abs() < tolerance.az && (actual.el - desired.el).abs() < tolerance.el
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_limits_are_inclusive() {
        let limits = AngleLimits::new(10.0, 80.0);
        assert!(limits.contains(10.0));
        assert!(limits.contains(45.0));
        assert!(limits.contains(80.0));
        assert!(!limits.contains(9.999));
        assert!(!limits.contains(80.001));
        assert!(!limits.wraps());
    }

    #[test]
    fn test_wedge_limits() {
        let limits = AngleLimits::new(350.0, 10.0);
        assert!(limits.wraps());
        assert!(limits.contains(5.0));
        assert!(limits.contains(350.0));
        assert!(limits.contains(10.0));
        assert!(limits.contains(355.0));
        assert!(!limits.contains(180.0));
        assert!(!limits.contains(10.5));
        assert!(!limits.contains(349.5));
    }

    #[test]
    fn test_rule_holds_over_a_sweep() {
        let pairs = [(0.0, 360.0), (10.0, 80.0), (350.0, 10.0), (200.0, 100.0), (45.0, 45.0)];
        for (lower, upper) in pairs {
            let limits = AngleLimits::new(lower, upper);
            let mut angle = -30.0;
            while angle <= 390.0 {
                let expected = if lower <= upper {
                    lower <= angle && angle <= upper
                } else {
                    !(lower < angle && angle < upper)
                };
                assert_eq!(limits.contains(angle), expected, "{lower} {upper} {angle}");
                angle += 0.25;
            }
        }
    }

    #[test]
    fn test_azel_limits_require_both_axes() {
        let limits = AzElLimits::new(AngleLimits::new(0.0, 360.0), AngleLimits::new(10.0, 80.0));
        assert!(limits.contains(AzEl::new(120.0, 45.0)));
        assert!(!limits.contains(AzEl::new(5.0, 5.0)));
        assert!(!limits.contains(AzEl::new(400.0, 45.0)));
        assert_eq!(limits.lower_corner(), AzEl::new(0.0, 10.0));
    }

    #[test]
    fn test_within_range_is_and_of_axes() {
        let tol = ArrivalTolerance::default();
        let target = AzEl::new(120.0, 45.0);
        assert!(azel_within_range(AzEl::new(120.4, 44.6), target, tol));
        assert!(!azel_within_range(AzEl::new(120.4, 44.4), target, tol));
        assert!(!azel_within_range(AzEl::new(121.0, 45.0), target, tol));
        // strict comparison
        assert!(!azel_within_range(AzEl::new(120.5, 45.0), target, tol));
    }

    #[test]
    fn test_offset_composition() {
        let dest = AzEl::new(100.0, 30.0);
        let off = AzEl::new(-1.5, 2.0);
        assert_eq!(dest.offset_by(off), AzEl::new(98.5, 32.0));
    }

    #[test]
    fn test_serde_shapes() {
        let json = serde_json::to_string(&AzEl::new(1.0, 2.0)).unwrap();
        assert_eq!(json, "[1.0,2.0]");
        let limits: AngleLimits =
            serde_json::from_str(r#"{"lower_bound": 350.0, "upper_bound": 10.0}"#).unwrap();
        assert_eq!(limits, AngleLimits::new(350.0, 10.0));
    }
}
