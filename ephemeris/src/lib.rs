//! Sky object positions for a small radio telescope.
//!
//! Everything here is low precision (tens of arcseconds for catalog objects,
//! a few arcminutes for the Sun and Moon), which is well inside the beam of a
//! few-degree dish.
//!
//! - [`sidereal`] - Julian dates and sidereal time
//! - [`coords`] - Equatorial, galactic and horizontal frames
//! - [`solar`] - Sun and Moon
//! - [`vlsr`] - Observer velocity relative to the Local Standard of Rest
//! - [`catalog`] - `sky_coords.csv` parsing
//! - [`tracker`] - Time-gated cache of positions for every catalog object

pub mod catalog;
pub mod coords;
pub mod sidereal;
pub mod solar;
pub mod tracker;
pub mod vlsr;

pub use catalog::{Catalog, CatalogEntry, CatalogError, CoordinateSystem};
pub use coords::{Equatorial, Galactic, Horizontal};
pub use tracker::{EphemerisTracker, Observer, DEFAULT_REFRESH_INTERVAL};
