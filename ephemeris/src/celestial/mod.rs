//! Catalog stars and their identifiers

pub mod catalog;

use serde::Deserialize;

pub use catalog::{load_catalog, read_catalog};

/// Upper bound on the identifiers shown in a star's display name
const MAX_NAME_PARTS: usize = 3;

/// One row of the star catalog, using the catalog's own column names.
///
/// Right ascension is in hours and declination in degrees, as published.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CatalogRow {
    #[serde(rename = "StarID")]
    pub star_id: u64,
    #[serde(rename = "RA")]
    pub ra_hours: f64,
    #[serde(rename = "Dec")]
    pub dec_degrees: f64,
    #[serde(rename = "name_IAU", default)]
    pub name_iau: Option<String>,
    #[serde(rename = "BayerFlamsteed", default)]
    pub bayer_flamsteed: Option<String>,
    #[serde(rename = "Hip", default)]
    pub hip: Option<f64>,
    #[serde(rename = "HR", default)]
    pub hr: Option<f64>,
    #[serde(rename = "Gliese", default)]
    pub gliese: Option<String>,
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Human readable name for a catalog row.
///
/// Collects the IAU name, Bayer/Flamsteed designation, HIP, HR and Gliese
/// numbers in that order, keeps the first three, and renders them as
/// `"first (second, third)"`. Rows without any identifier fall back to the
/// catalog id.
pub fn name_a_star(row: &CatalogRow) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(name) = non_empty(&row.name_iau) {
        parts.push(name.to_string());
    }
    if let Some(bf) = non_empty(&row.bayer_flamsteed) {
        parts.push(bf.to_string());
    }
    if let Some(hip) = row.hip.filter(|h| h.is_finite() && *h != 0.0) {
        parts.push(format!("HIP {}", hip as i64));
    }
    if let Some(hr) = row.hr.filter(|h| h.is_finite()) {
        parts.push(format!("HR {}", hr as i64));
    }
    if let Some(gliese) = non_empty(&row.gliese) {
        parts.push(format!("Gliese {gliese}"));
    }

    parts.truncate(MAX_NAME_PARTS);
    match parts.split_first() {
        None => format!("UNKNOWN (StarID {})", row.star_id),
        Some((first, [])) => first.clone(),
        Some((first, rest)) => format!("{first} ({})", rest.join(", ")),
    }
}

/// A fixed star. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Star {
    /// Catalog identifier
    pub identifier: u64,
    /// Right ascension in radians
    pub ra: f64,
    /// Declination in radians
    pub dec: f64,
    /// Display name
    pub name: String,
}

impl Star {
    pub fn new(ra: f64, dec: f64, name: impl Into<String>, identifier: u64) -> Self {
        Self {
            identifier,
            ra,
            dec,
            name: name.into(),
        }
    }

    /// Build from a catalog row, converting hours/degrees to radians
    pub fn from_row(row: &CatalogRow) -> Self {
        Self {
            identifier: row.star_id,
            ra: (row.ra_hours * 15.0).to_radians(),
            dec: row.dec_degrees.to_radians(),
            name: name_a_star(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn row() -> CatalogRow {
        CatalogRow {
            star_id: 42,
            ra_hours: 6.0,
            dec_degrees: -45.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_star_name() {
        assert_eq!(name_a_star(&row()), "UNKNOWN (StarID 42)");
    }

    #[test]
    fn test_single_identifier() {
        let r = CatalogRow {
            hip: Some(32349.0),
            ..row()
        };
        assert_eq!(name_a_star(&r), "HIP 32349");
    }

    #[test]
    fn test_zero_hip_is_ignored() {
        let r = CatalogRow {
            hip: Some(0.0),
            hr: Some(2491.0),
            ..row()
        };
        assert_eq!(name_a_star(&r), "HR 2491");
    }

    #[test]
    fn test_name_keeps_first_three_identifiers() {
        let r = CatalogRow {
            name_iau: Some("Sirius".to_string()),
            bayer_flamsteed: Some("9Alp CMa".to_string()),
            hip: Some(32349.0),
            hr: Some(2491.0),
            gliese: Some("Gl 244A".to_string()),
            ..row()
        };
        assert_eq!(name_a_star(&r), "Sirius (9Alp CMa, HIP 32349)");
    }

    #[test]
    fn test_empty_strings_are_missing() {
        let r = CatalogRow {
            name_iau: Some("  ".to_string()),
            gliese: Some("Gl 1".to_string()),
            ..row()
        };
        assert_eq!(name_a_star(&r), "Gliese Gl 1");
    }

    #[test]
    fn test_from_row_converts_units() {
        let star = Star::from_row(&row());
        assert_eq!(star.identifier, 42);
        assert_relative_eq!(star.ra, PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(star.dec, -PI / 4.0, epsilon = 1e-12);
    }
}
