//! Frame files and light curves.
//!
//! Frames are stored as nested JSON lists: a single frame is `[[...], ...]`
//! indexed `[i][j]`, a series adds the frame index in front.

use crate::models::FlatFieldModel;
use crate::FlatFieldError;
use ndarray::{Array1, ArrayBase, ArrayD, ArrayViewD, Axis, Data, Ix3, IxDyn};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

fn depth_error() -> FlatFieldError {
    FlatFieldError::InvalidFrames("inconsistent nesting depth".into())
}

/// Flatten a nested list, recording the extent of every level
fn flatten(
    value: &Value,
    depth: usize,
    shape: &mut Vec<usize>,
    out: &mut Vec<f64>,
) -> Result<(), FlatFieldError> {
    match value {
        Value::Array(items) => {
            if depth == shape.len() {
                // A new level after the first number means mixed depths
                if !out.is_empty() {
                    return Err(depth_error());
                }
                shape.push(items.len());
            } else if shape[depth] != items.len() {
                return Err(FlatFieldError::InvalidFrames(format!(
                    "ragged list at depth {depth}: {} entries, expected {}",
                    items.len(),
                    shape[depth]
                )));
            }
            for item in items {
                flatten(item, depth + 1, shape, out)?;
            }
            Ok(())
        }
        Value::Number(_) | Value::Null => {
            if depth != shape.len() {
                return Err(depth_error());
            }
            // NaN is written as null
            let x = match value {
                Value::Number(number) => number.as_f64().ok_or_else(|| {
                    FlatFieldError::InvalidFrames(format!("not a float: {number}"))
                })?,
                _ => f64::NAN,
            };
            out.push(x);
            Ok(())
        }
        other => Err(FlatFieldError::InvalidFrames(format!("unexpected value {other}"))),
    }
}

fn nested(view: ArrayViewD<f64>) -> Value {
    if view.ndim() == 0 {
        return view.iter().next().map_or(Value::Null, |&x| Value::from(x));
    }
    Value::Array(view.outer_iter().map(nested).collect())
}

/// Read a frame file into an array of rank 2 (one frame) or 3 (a series)
pub fn read_frames(path: &Path) -> Result<ArrayD<f64>, FlatFieldError> {
    let value: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let mut shape = Vec::new();
    let mut values = Vec::new();
    flatten(&value, 0, &mut shape, &mut values)?;
    if !(2..=3).contains(&shape.len()) {
        return Err(FlatFieldError::InvalidFrames(format!(
            "expected 2 or 3 nested levels, found {}",
            shape.len()
        )));
    }
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

/// Write frames of any rank as nested lists
pub fn write_frames<S, D>(path: &Path, frames: &ArrayBase<S, D>) -> Result<(), FlatFieldError>
where
    S: Data<Elem = f64>,
    D: ndarray::Dimension,
{
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &nested(frames.view().into_dyn()))?;
    writer.flush()?;
    Ok(())
}

/// Calibrated sum over the detector for every frame, broken pixels excluded
pub fn light_curve<S>(
    model: &FlatFieldModel,
    frames: &ArrayBase<S, Ix3>,
) -> Result<Array1<f64>, FlatFieldError>
where
    S: Data<Elem = f64>,
{
    let calibrated = model.apply_nobreak(frames)?;
    Ok(calibrated.sum_axis(Axis(2)).sum_axis(Axis(1)))
}
