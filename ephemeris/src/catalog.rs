//! Sky object catalog (`sky_coords.csv`).
//!
//! # Format
//!
//! ```text
//! coordinate_system,coordinate_a,coordinate_b,name
//! fk4,05 31 30,21 58 00,Crab
//! icrs,23h23m24s,+58d48m54s,CasA
//! galactic,0,0,G00
//! ```
//!
//! For `fk4` (B1950), `fk5` and `icrs` (J2000) the first coordinate is right
//! ascension in hours and the second declination in degrees. For `galactic`
//! both are degrees (l, b). Each coordinate may be decimal or sexagesimal
//! with `:`, space, or `h`/`m`/`s`/`d` separators.

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::coords::{Equatorial, Galactic};

/// Errors from loading a catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: unknown coordinate system {system:?}")]
    UnknownSystem { row: usize, system: String },

    #[error("Row {row}: cannot parse coordinate {value:?}")]
    BadCoordinate { row: usize, value: String },

    #[error("Duplicate object name {0:?}")]
    DuplicateName(String),
}

/// Reference frame of a catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    /// B1950 equatorial
    Fk4,
    /// J2000 equatorial
    Fk5,
    /// J2000 equatorial
    Icrs,
    /// Galactic l, b
    Galactic,
}

impl FromStr for CoordinateSystem {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fk4" => Ok(Self::Fk4),
            "fk5" => Ok(Self::Fk5),
            "icrs" => Ok(Self::Icrs),
            "galactic" => Ok(Self::Galactic),
            _ => Err(()),
        }
    }
}

/// One named object, stored as a J2000 position.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub system: CoordinateSystem,
    pub position: Equatorial,
}

#[derive(Debug, Deserialize)]
struct Row {
    coordinate_system: String,
    coordinate_a: String,
    coordinate_b: String,
    name: String,
}

/// Parse a decimal or sexagesimal value into its decimal form in the same unit.
///
/// `"05 31 30"`, `"5:31:30"`, `"05h31m30s"` and `"5.525"` are all 5.525.
pub fn parse_sexagesimal(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let negative = trimmed.starts_with('-');
    let unsigned = trimmed.trim_start_matches(['-', '+']);

    let cleaned: String = unsigned
        .chars()
        .map(|c| match c {
            ':' | 'h' | 'H' | 'm' | 'M' | 's' | 'S' | 'd' | 'D' | '\'' | '"' | '\u{b0}' => ' ',
            other => other,
        })
        .collect();
    let fields: Vec<f64> = cleaned
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.is_empty() || fields.len() > 3 {
        return None;
    }

    let magnitude = fields
        .iter()
        .zip([1.0, 60.0, 3600.0])
        .map(|(v, scale)| v / scale)
        .sum::<f64>();
    Some(if negative { -magnitude } else { magnitude })
}

/// Parsed sky catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for (index, record) in csv.deserialize::<Row>().enumerate() {
            let row = index + 1;
            let record = record?;
            let system: CoordinateSystem =
                record
                    .coordinate_system
                    .parse()
                    .map_err(|_| CatalogError::UnknownSystem {
                        row,
                        system: record.coordinate_system.clone(),
                    })?;
            let parse = |value: &str| {
                parse_sexagesimal(value).ok_or_else(|| CatalogError::BadCoordinate {
                    row,
                    value: value.to_string(),
                })
            };
            let a = parse(&record.coordinate_a)?;
            let b = parse(&record.coordinate_b)?;

            let position = match system {
                CoordinateSystem::Galactic => Galactic::new(a, b).to_equatorial(),
                CoordinateSystem::Fk4 => Equatorial::new(a * 15.0, b).fk4_to_j2000(),
                CoordinateSystem::Fk5 | CoordinateSystem::Icrs => Equatorial::new(a * 15.0, b),
            };

            if !seen.insert(record.name.clone()) {
                return Err(CatalogError::DuplicateName(record.name));
            }
            entries.push(CatalogEntry {
                name: record.name,
                system,
                position,
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    const SAMPLE: &str = "\
coordinate_system, coordinate_a, coordinate_b, name
fk4, 05 31 30, 21 58 00, Crab
icrs, 23h23m24s, +58d48m54s, CasA
galactic, 0, 0, G00
fk5, 12.5, -30.25, Decimal
";

    #[test]
    fn test_parse_sexagesimal_forms() {
        assert_relative_eq!(parse_sexagesimal("05 31 30").unwrap(), 5.525, epsilon = 1e-12);
        assert_relative_eq!(parse_sexagesimal("5:31:30").unwrap(), 5.525, epsilon = 1e-12);
        assert_relative_eq!(parse_sexagesimal("05h31m30s").unwrap(), 5.525, epsilon = 1e-12);
        assert_relative_eq!(parse_sexagesimal("-00:30:00").unwrap(), -0.5, epsilon = 1e-12);
        assert_relative_eq!(parse_sexagesimal("+12.75").unwrap(), 12.75, epsilon = 1e-12);
        assert!(parse_sexagesimal("abc").is_none());
        assert!(parse_sexagesimal("").is_none());
        assert!(parse_sexagesimal("1 2 3 4").is_none());
    }

    #[test]
    fn test_load_sample() {
        let catalog = Catalog::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 4);

        let crab = catalog.get("Crab").unwrap();
        assert_eq!(crab.system, CoordinateSystem::Fk4);
        // J2000 05h34m31.9s +22d00m52s
        assert_relative_eq!(crab.position.ra, 83.633, epsilon = 0.05);
        assert_relative_eq!(crab.position.dec, 22.014, epsilon = 0.05);

        let g00 = catalog.get("G00").unwrap();
        assert_relative_eq!(g00.position.ra, 266.405, epsilon = 1e-3);

        let decimal = catalog.get("Decimal").unwrap();
        assert_relative_eq!(decimal.position.ra, 187.5, epsilon = 1e-12);
        assert_relative_eq!(decimal.position.dec, -30.25, epsilon = 1e-12);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let catalog = Catalog::from_reader(SAMPLE.as_bytes()).unwrap();
        assert!(catalog.get("crab").is_none());
    }

    #[test]
    fn test_unknown_system() {
        let csv = "coordinate_system,coordinate_a,coordinate_b,name\nhorizon,1,2,X\n";
        assert!(matches!(
            Catalog::from_reader(csv.as_bytes()),
            Err(CatalogError::UnknownSystem { row: 1, .. })
        ));
    }

    #[test]
    fn test_bad_coordinate_and_duplicate() {
        let csv = "coordinate_system,coordinate_a,coordinate_b,name\nicrs,1,north,X\n";
        assert!(matches!(
            Catalog::from_reader(csv.as_bytes()),
            Err(CatalogError::BadCoordinate { .. })
        ));

        let csv = "coordinate_system,coordinate_a,coordinate_b,name\nicrs,1,2,X\nicrs,3,4,X\n";
        assert!(matches!(
            Catalog::from_reader(csv.as_bytes()),
            Err(CatalogError::DuplicateName(name)) if name == "X"
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let catalog = Catalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.entries()[0].name, "Crab");
    }
}
