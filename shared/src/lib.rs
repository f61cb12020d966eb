//! Shared components for the detector tool-kit.
//!
//! Holds everything the projection and flat-fielding crates both need:
//! instrument settings and their on-disk storage, the detector geometry,
//! free-form timestamp parsing and the worker pool for array kernels.

pub mod config_storage;
pub mod datetime_parser;
pub mod geometry;
pub mod kernels;
pub mod settings;

pub use config_storage::ConfigStorage;
pub use geometry::{DetectorGeometry, NO_PIXEL};
pub use settings::{InstrumentSettings, SettingsError};
