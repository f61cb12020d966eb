//! Per-pixel calibration lookup.
//!
//! Each pixel has its own calibration curve: the readings `xf[:, i, j]` it
//! produced for a shared series of reference values `y`. Looking a reading
//! up on its pixel's curve gives the calibrated value. Values outside a curve
//! clamp to its first or last reference value.
//!
//! The kernels run on the rayon pool; every pixel is independent so the
//! result does not depend on the number of threads.

use ndarray::{
    Array2, Array3, ArrayD, ArrayView1, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3, Zip,
};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum InterpolationError {
    #[error("Calibration curve has no points")]
    EmptyCurve,

    #[error("Curve length mismatch: {xp} abscissa samples, {fp} ordinates")]
    LengthMismatch { xp: usize, fp: usize },

    #[error("Pixel grid mismatch: data {data:?}, curves {curves:?}")]
    ShapeMismatch {
        data: Vec<usize>,
        curves: Vec<usize>,
    },

    #[error("Expected a 2-D frame or 3-D frame series, got {0} dimensions")]
    UnsupportedRank(usize),
}

/// One-dimensional linear interpolation with the conventions of `numpy.interp`.
///
/// `xp` must be increasing. Below `xp[0]` returns `fp[0]`, above the last
/// sample returns the last ordinate, and NaN input gives NaN. The curves must
/// be non-empty and of equal length.
pub fn interp(x: f64, xp: ArrayView1<f64>, fp: ArrayView1<f64>) -> f64 {
    let n = xp.len();
    if x.is_nan() {
        return f64::NAN;
    }
    if n == 1 || x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }

    // Largest lo with xp[lo] <= x; the curve need not be contiguous in memory
    let (mut lo, mut hi) = (0, n - 1);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if xp[mid] <= x {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let dx = xp[hi] - xp[lo];
    if dx == 0.0 {
        return fp[lo];
    }
    let slope = (fp[hi] - fp[lo]) / dx;
    slope * (x - xp[lo]) + fp[lo]
}

fn check_curves(xf: &ArrayView3<f64>, y: &ArrayView1<f64>) -> Result<(), InterpolationError> {
    if y.is_empty() {
        return Err(InterpolationError::EmptyCurve);
    }
    if xf.len_of(Axis(0)) != y.len() {
        return Err(InterpolationError::LengthMismatch {
            xp: xf.len_of(Axis(0)),
            fp: y.len(),
        });
    }
    Ok(())
}

fn check_grid(data: &[usize], xf: &ArrayView3<f64>) -> Result<(), InterpolationError> {
    let n = data.len();
    if n < 2 || data[n - 2..] != xf.shape()[1..] {
        return Err(InterpolationError::ShapeMismatch {
            data: data.to_vec(),
            curves: xf.shape().to_vec(),
        });
    }
    Ok(())
}

/// Interpolate a series of frames `x[t, i, j]` on the per-pixel curves
pub fn interpolate_matrix_3d(
    x: ArrayView3<f64>,
    xf: ArrayView3<f64>,
    y: ArrayView1<f64>,
) -> Result<Array3<f64>, InterpolationError> {
    check_curves(&xf, &y)?;
    check_grid(x.shape(), &xf)?;

    let mut result = Array3::zeros(x.raw_dim());
    Zip::from(result.lanes_mut(Axis(0)))
        .and(x.lanes(Axis(0)))
        .and(xf.lanes(Axis(0)))
        .par_for_each(|mut out, samples, curve| {
            for (o, &value) in out.iter_mut().zip(samples.iter()) {
                *o = interp(value, curve, y);
            }
        });
    Ok(result)
}

/// Interpolate a single frame `x[i, j]` on the per-pixel curves
pub fn interpolate_matrix_2d(
    x: ArrayView2<f64>,
    xf: ArrayView3<f64>,
    y: ArrayView1<f64>,
) -> Result<Array2<f64>, InterpolationError> {
    check_curves(&xf, &y)?;
    check_grid(x.shape(), &xf)?;

    let mut result = Array2::zeros(x.raw_dim());
    Zip::from(&mut result)
        .and(&x)
        .and(xf.lanes(Axis(0)))
        .par_for_each(|o, &value, curve| *o = interp(value, curve, y));
    Ok(result)
}

/// Dispatch to the 2-D or 3-D kernel by the rank of `x`
pub fn interpolate_matrix(
    x: ArrayViewD<f64>,
    xf: ArrayView3<f64>,
    y: ArrayView1<f64>,
) -> Result<ArrayD<f64>, InterpolationError> {
    match x.ndim() {
        2 => {
            let frame = x
                .into_dimensionality::<Ix2>()
                .map_err(|_| InterpolationError::UnsupportedRank(2))?;
            Ok(interpolate_matrix_2d(frame, xf, y)?.into_dyn())
        }
        3 => {
            let frames = x
                .into_dimensionality::<Ix3>()
                .map_err(|_| InterpolationError::UnsupportedRank(3))?;
            Ok(interpolate_matrix_3d(frames, xf, y)?.into_dyn())
        }
        rank => Err(InterpolationError::UnsupportedRank(rank)),
    }
}
