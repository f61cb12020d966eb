//! CSV star catalog loading and field-of-view candidate selection.

use super::{CatalogRow, Star};
use crate::rotation::SkyRange;
use crate::EphemerisError;
use log::debug;
use std::io::Read;
use std::path::Path;

/// Read every row of a CSV catalog from any reader.
pub fn read_catalog<R: Read>(reader: R) -> Result<Vec<Star>, EphemerisError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut stars = Vec::new();
    for row in csv_reader.deserialize::<CatalogRow>() {
        stars.push(Star::from_row(&row?));
    }
    Ok(stars)
}

/// Load a CSV catalog file.
pub fn load_catalog(path: &Path) -> Result<Vec<Star>, EphemerisError> {
    let file = std::fs::File::open(path)?;
    let stars = read_catalog(file)?;
    debug!("Loaded {} stars from {}", stars.len(), path.display());
    Ok(stars)
}

/// Stars that may cross the field of view within a search box
pub fn stars_in_range<'a>(stars: &'a [Star], range: &SkyRange) -> Vec<&'a Star> {
    stars
        .iter()
        .filter(|star| range.contains(star.ra, star.dec))
        .collect()
}
