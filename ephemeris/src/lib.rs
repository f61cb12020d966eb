//! Star positions and their projection onto the detector.
//!
//! - [`celestial`]: catalog rows, star naming and catalog files
//! - [`rotation`]: earth rotation angle, catalog search boxes and alt/az
//! - [`projection`]: focal-plane coordinates and pixel indices of stars

pub mod celestial;
pub mod projection;
pub mod rotation;

pub use celestial::{name_a_star, CatalogRow, Star};
pub use projection::{pixel_tracks, FieldPointing, LocalCoords};
pub use rotation::{earth_rotation_angle, range_calculate, to_altaz, RangeParameters, SkyRange};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EphemerisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Star catalog error: {0}")]
    Catalog(#[from] csv::Error),
    #[error("Focal length must be positive, got {0}")]
    InvalidFocalLength(f64),
    #[error("End of time range precedes its start")]
    ReversedTimeRange,
}
