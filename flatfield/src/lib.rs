//! Flat-fielding calibration for the segmented pixel detector.
//!
//! Raw per-pixel readings are turned into calibrated flux by per-pixel
//! response models ([`Linear`], [`NonlinearSaturation`], [`NonlinearPileup`])
//! that can be composed in a [`Chain`]. Every model carries a broken-pixel
//! mask so degenerate pixels can be excluded from downstream sums, and
//! round-trips through the JSON model file format.
//!
//! The crate also provides the per-pixel calibration lookup
//! ([`interpolation::interpolate_matrix`]) and JSON frame I/O.

pub mod frames;
pub mod grid;
pub mod interpolation;
pub mod lambert;
pub mod models;

use ndarray::ShapeError;
use thiserror::Error;

pub use frames::{light_curve, read_frames, write_frames};
pub use interpolation::{interpolate_matrix, InterpolationError};
pub use models::{
    Chain, DisplayParameter, FlatFieldModel, Linear, ModelKind, ModelRecord, NonlinearPileup,
    NonlinearSaturation, Response, ResponseCurve,
};

/// Errors from building, evaluating and storing flat-field models
#[derive(Error, Debug)]
pub enum FlatFieldError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Unknown model kind: {0:?}")]
    UnknownModel(String),

    #[error("Shape mismatch: expected trailing shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: Vec<usize>,
    },

    #[error("Pixel ({i}, {j}) outside the {rows}x{cols} grid")]
    PixelOutOfRange {
        i: usize,
        j: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Invalid frame file: {0}")]
    InvalidFrames(String),

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}
