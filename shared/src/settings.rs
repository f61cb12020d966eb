//! Instrument settings shared by every tool in the kit.
//!
//! Settings are stored as a flat JSON object whose keys are the upper-case
//! parameter names (`PIXEL_SIZE`, `HALF_PIXELS`, ...). Missing keys fall back
//! to the defaults below, so older parameter files keep loading after new
//! parameters are introduced.

use crate::datetime_parser::{format_unixtime, DatetimeError};
use crate::geometry::DetectorGeometry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default observatory latitude in degrees
pub const DEFAULT_LATITUDE: f64 = 68.607279;
/// Default observatory longitude in degrees
pub const DEFAULT_LONGITUDE: f64 = 31.803085;
/// Default pixel pitch in focal-plane units
pub const DEFAULT_PIXEL_SIZE: f64 = 2.85;
/// Default half width of the dead band between the detector halves
pub const DEFAULT_HALF_GAP_SIZE: f64 = 2.0;
/// Default number of pixels on each side of the gap
pub const DEFAULT_HALF_PIXELS: usize = 8;
/// Default entrance aperture
pub const DEFAULT_APERTURE: f64 = 19.6e2;
/// Default timestamp rendering (time crate format description; strftime
/// patterns such as `%Y-%m-%d` are accepted too)
pub const DEFAULT_DATETIME_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed settings file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Global instrument configuration.
///
/// Constructed once at startup and passed by reference to whatever needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct InstrumentSettings {
    /// Observatory latitude in degrees
    pub main_latitude: f64,
    /// Observatory longitude in degrees
    pub main_longitude: f64,
    /// Pixel pitch
    pub pixel_size: f64,
    /// Half width of the central dead band
    pub half_gap_size: f64,
    /// Pixels on each side of the gap (grid is `2 * half_pixels` square)
    pub half_pixels: usize,
    /// Entrance aperture
    pub aperture: f64,
    /// Worker threads for the array kernels
    pub nproc: usize,
    /// Format description used when printing timestamps
    pub datetime_format: String,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            main_latitude: DEFAULT_LATITUDE,
            main_longitude: DEFAULT_LONGITUDE,
            pixel_size: DEFAULT_PIXEL_SIZE,
            half_gap_size: DEFAULT_HALF_GAP_SIZE,
            half_pixels: DEFAULT_HALF_PIXELS,
            aperture: DEFAULT_APERTURE,
            nproc: num_cpus::get(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }
}

impl InstrumentSettings {
    /// Check that the geometry parameters describe a usable detector.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.half_pixels == 0 {
            return Err(SettingsError::Invalid {
                name: "HALF_PIXELS",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.pixel_size > 0.0) {
            return Err(SettingsError::Invalid {
                name: "PIXEL_SIZE",
                reason: format!("must be positive, got {}", self.pixel_size),
            });
        }
        if !(self.half_gap_size >= 0.0) {
            return Err(SettingsError::Invalid {
                name: "HALF_GAP_SIZE",
                reason: format!("must not be negative, got {}", self.half_gap_size),
            });
        }
        if let Err(e) = format_unixtime(0.0, &self.datetime_format) {
            return Err(SettingsError::Invalid {
                name: "DATETIME_FORMAT",
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Detector geometry described by these settings
    pub fn detector_geometry(&self) -> DetectorGeometry {
        DetectorGeometry::new(self.half_pixels, self.pixel_size, self.half_gap_size)
    }

    /// Observatory latitude and longitude in radians
    pub fn site_radians(&self) -> (f64, f64) {
        (
            self.main_latitude.to_radians(),
            self.main_longitude.to_radians(),
        )
    }

    /// Render a Unix timestamp with the configured `DATETIME_FORMAT`
    pub fn format_datetime(&self, unix: f64) -> Result<String, DatetimeError> {
        format_unixtime(unix, &self.datetime_format)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }
}
