//! Focal-plane geometry of the segmented pixel detector.
//!
//! The detector is two tiled halves separated by a dead band straddling the
//! optical axis. Along each axis the layout is:
//!
//! ```text
//!  -half_extent        -half_gap  0  +half_gap        +half_extent
//!      |  pixel 0 .. N-1  |   dead band    |  pixel N .. 2N-1  |
//! ```
//!
//! Pixels on the negative side are numbered outwards-in so that index `N-1`
//! touches the gap from the negative side and index `N` from the positive side.

use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

/// Index value used for coordinates that do not land on a pixel
pub const NO_PIXEL: i64 = -1;

/// Immutable description of the detector layout along one axis.
///
/// The grid is square: the same mapping applies to both planar axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorGeometry {
    /// Number of pixels on each side of the gap
    pub half_pixels: usize,
    /// Pixel pitch
    pub pixel_size: f64,
    /// Half width of the central dead band
    pub half_gap_size: f64,
}

impl DetectorGeometry {
    pub fn new(half_pixels: usize, pixel_size: f64, half_gap_size: f64) -> Self {
        Self {
            half_pixels,
            pixel_size,
            half_gap_size,
        }
    }

    /// Pixels along one side of the square grid
    pub fn grid_size(&self) -> usize {
        2 * self.half_pixels
    }

    /// Shape of per-pixel arrays co-indexed with the detector
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.grid_size(), self.grid_size())
    }

    /// Distance from the optical axis to the outer detector edge
    pub fn half_extent(&self) -> f64 {
        self.half_gap_size + self.half_pixels as f64 * self.pixel_size
    }

    /// Map a signed planar coordinate to a pixel index along one axis.
    ///
    /// Returns `None` inside the dead band, beyond the outer edge, or for NaN.
    /// The outer edge itself belongs to the outermost pixel.
    pub fn pixel_index(&self, coord: f64) -> Option<usize> {
        let abs = coord.abs();
        if !(abs >= self.half_gap_size && abs <= self.half_extent()) || self.half_pixels == 0 {
            return None;
        }

        let n = self.half_pixels;
        let raw = (((abs - self.half_gap_size) / self.pixel_size) as usize).min(n - 1);
        if coord < 0.0 {
            Some(n - 1 - raw)
        } else {
            Some(n + raw)
        }
    }

    /// Same as [`pixel_index`](Self::pixel_index) but with the [`NO_PIXEL`] sentinel.
    pub fn find_index(&self, coord: f64) -> i64 {
        self.pixel_index(coord).map_or(NO_PIXEL, |i| i as i64)
    }

    /// Element-wise [`find_index`](Self::find_index) over an array of coordinates
    pub fn find_indices<D: Dimension>(&self, coords: &Array<f64, D>) -> Array<i64, D> {
        coords.mapv(|c| self.find_index(c))
    }

    /// Planar interval `(lo, hi)` covered by a pixel index.
    pub fn pixel_interval(&self, index: usize) -> Option<(f64, f64)> {
        let n = self.half_pixels;
        let gap = self.half_gap_size;
        let pitch = self.pixel_size;

        if index < n {
            let raw = (n - 1 - index) as f64;
            Some((-(gap + (raw + 1.0) * pitch), -(gap + raw * pitch)))
        } else if index < 2 * n {
            let raw = (index - n) as f64;
            Some((gap + raw * pitch, gap + (raw + 1.0) * pitch))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    fn geometry() -> DetectorGeometry {
        DetectorGeometry::new(8, 2.85, 2.0)
    }

    #[rstest]
    #[case(0.0, NO_PIXEL)]
    #[case(1.999, NO_PIXEL)]
    #[case(-1.5, NO_PIXEL)]
    #[case(2.0, 8)]
    #[case(2.1, 8)]
    #[case(-2.1, 7)]
    #[case(2.0 + 2.85 * 1.5, 9)]
    #[case(-(2.0 + 2.85 * 1.5), 6)]
    #[case(2.0 + 2.85 * 7.5, 15)]
    #[case(-(2.0 + 2.85 * 7.5), 0)]
    #[case(2.0 + 8.0 * 2.85, 15)]
    #[case(-(2.0 + 8.0 * 2.85), 0)]
    #[case(24.81, NO_PIXEL)]
    #[case(-100.0, NO_PIXEL)]
    #[case(f64::NAN, NO_PIXEL)]
    fn test_find_index(#[case] coord: f64, #[case] expected: i64) {
        assert_eq!(geometry().find_index(coord), expected);
    }

    #[test]
    fn test_in_bounds_coordinates_fall_inside_their_pixel() {
        let geometry = geometry();
        let extent = geometry.half_extent();
        let steps = 2000;
        for k in 0..=steps {
            let coord = -extent + 2.0 * extent * k as f64 / steps as f64;
            match geometry.pixel_index(coord) {
                Some(index) => {
                    assert!(index < geometry.grid_size());
                    let (lo, hi) = geometry.pixel_interval(index).unwrap();
                    assert!(
                        lo - 1e-9 <= coord && coord <= hi + 1e-9,
                        "{coord} not in pixel {index} = [{lo}, {hi}]"
                    );
                }
                None => assert!(coord.abs() < geometry.half_gap_size || coord.abs() > extent),
            }
        }
    }

    #[test]
    fn test_pixel_interval_out_of_range() {
        assert!(geometry().pixel_interval(16).is_none());
    }

    #[test]
    fn test_find_indices_array() {
        let coords = array![-30.0, -3.0, 0.0, 3.0, 30.0];
        let indices = geometry().find_indices(&coords);
        assert_eq!(indices, array![NO_PIXEL, 7, NO_PIXEL, 8, NO_PIXEL]);
    }

    #[test]
    fn test_zero_gap_origin_is_positive_side() {
        let geometry = DetectorGeometry::new(2, 1.0, 0.0);
        assert_eq!(geometry.find_index(0.0), 2);
        assert_eq!(geometry.find_index(-0.5), 1);
    }
}
