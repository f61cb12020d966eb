//! Projection of catalog stars onto the detector.
//!
//! A star's equatorial position is rotated into the local frame of the field
//! (hour-angle phase, field declination, field roll) and projected through a
//! pinhole onto the focal plane. The planar coordinates are then binned into
//! pixel indices by the detector geometry.
//!
//! Stars behind the projection plane (`z <= 0`) produce meaningless planar
//! coordinates; they are masked to [`NO_PIXEL`] before any index lookup.

use crate::celestial::Star;
use ndarray::Array2;
use shared::{DetectorGeometry, NO_PIXEL};

/// Orientation of the field of view and the optics focal length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldPointing {
    /// Right ascension offset of the field center, radians
    pub ra0: f64,
    /// Declination of the field center, radians
    pub dec: f64,
    /// Field roll angle, radians
    pub psi: f64,
    /// Focal length, same unit as the detector geometry
    pub focal_length: f64,
}

/// Planar position of a star on the focal plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalCoords {
    pub x: f64,
    pub y: f64,
    /// Star lies on the sky-facing hemisphere of the projection
    pub visible: bool,
}

impl LocalCoords {
    /// Pixel indices `(i, j)`, [`NO_PIXEL`] on each axis that misses the detector
    pub fn pixel(&self, geometry: &DetectorGeometry) -> (i64, i64) {
        if !self.visible {
            return (NO_PIXEL, NO_PIXEL);
        }
        (geometry.find_index(self.x), geometry.find_index(self.y))
    }
}

impl Star {
    /// Project the star onto the focal plane at earth rotation angle `era`.
    pub fn get_local_coords(&self, era: f64, pointing: &FieldPointing) -> LocalCoords {
        let phase = era + pointing.ra0 - self.ra;
        let (sin_d0, cos_d0) = pointing.dec.sin_cos();
        let (sin_d, cos_d) = self.dec.sin_cos();
        let (sin_psi, cos_psi) = pointing.psi.sin_cos();
        let (sin_ph, cos_ph) = phase.sin_cos();

        let z = sin_d0 * sin_d + cos_d0 * cos_d * cos_ph;
        let x = sin_d0 * cos_d * sin_psi * cos_ph
            - cos_d0 * sin_d * sin_psi
            - cos_psi * sin_ph * cos_d;
        let y = -sin_d0 * cos_d * cos_psi * cos_ph + cos_d0 * sin_d * cos_psi
            - sin_psi * sin_ph * cos_d;

        let f = pointing.focal_length;
        LocalCoords {
            x: -x * f / z,
            y: y * f / z,
            visible: z > 0.0,
        }
    }

    /// Detector pixel `(i, j)` hit by the star at `era`
    pub fn get_pixel(
        &self,
        era: f64,
        pointing: &FieldPointing,
        geometry: &DetectorGeometry,
    ) -> (i64, i64) {
        self.get_local_coords(era, pointing).pixel(geometry)
    }

    /// Pixel track of the star over a sequence of rotation angles
    pub fn track(
        &self,
        eras: &[f64],
        pointing: &FieldPointing,
        geometry: &DetectorGeometry,
    ) -> Vec<(i64, i64)> {
        eras.iter()
            .map(|&era| self.get_pixel(era, pointing, geometry))
            .collect()
    }
}

/// Pixel indices for every star at every rotation angle.
///
/// Returns `(i, j)` index arrays of shape `[stars, eras]`.
pub fn pixel_tracks(
    stars: &[Star],
    eras: &[f64],
    pointing: &FieldPointing,
    geometry: &DetectorGeometry,
) -> (Array2<i64>, Array2<i64>) {
    let shape = (stars.len(), eras.len());
    let mut i_index = Array2::from_elem(shape, NO_PIXEL);
    let mut j_index = Array2::from_elem(shape, NO_PIXEL);
    for (s, star) in stars.iter().enumerate() {
        for (t, &era) in eras.iter().enumerate() {
            let (i, j) = star.get_pixel(era, pointing, geometry);
            i_index[[s, t]] = i;
            j_index[[s, t]] = j;
        }
    }
    (i_index, j_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{PI, TAU};

    const F: f64 = 100.0;

    fn geometry() -> DetectorGeometry {
        DetectorGeometry::new(8, 2.85, 2.0)
    }

    fn pointing(dec: f64) -> FieldPointing {
        FieldPointing {
            ra0: 0.3,
            dec,
            psi: 0.0,
            focal_length: F,
        }
    }

    #[test]
    fn test_field_center_lands_in_gap() {
        let era = 1.1;
        let p = FieldPointing {
            psi: 0.7,
            ..pointing(0.4)
        };
        let star = Star::new(era + p.ra0, p.dec, "center", 1);
        let local = star.get_local_coords(era, &p);
        assert!(local.visible);
        assert_relative_eq!(local.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(local.y, 0.0, epsilon = 1e-9);
        assert_eq!(star.get_pixel(era, &p, &geometry()), (NO_PIXEL, NO_PIXEL));
    }

    #[test]
    fn test_hour_angle_offset_moves_along_x() {
        let era = 0.5;
        let p = pointing(0.0);
        let star = Star::new(era + p.ra0 - 0.1f64.atan(), 0.0, "east", 2);
        let local = star.get_local_coords(era, &p);
        assert_relative_eq!(local.x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(local.y, 0.0, epsilon = 1e-9);
        assert_eq!(star.get_pixel(era, &p, &geometry()), (10, NO_PIXEL));
    }

    #[test]
    fn test_declination_offset_moves_along_y() {
        let era = 0.5;
        let p = pointing(0.0);
        let north = Star::new(era + p.ra0, 0.1f64.atan(), "north", 3);
        let south = Star::new(era + p.ra0, -(0.1f64.atan()), "south", 4);
        assert_eq!(north.get_pixel(era, &p, &geometry()), (NO_PIXEL, 10));
        assert_eq!(south.get_pixel(era, &p, &geometry()), (NO_PIXEL, 5));
    }

    #[test]
    fn test_star_behind_projection_is_masked() {
        let era = 0.0;
        let p = pointing(0.0);
        let star = Star::new(p.ra0 + PI, 0.0, "behind", 5);
        let local = star.get_local_coords(era, &p);
        assert!(!local.visible);
        assert_eq!(local.pixel(&geometry()), (NO_PIXEL, NO_PIXEL));
    }

    fn count_transitions(star: &Star, p: &FieldPointing) -> usize {
        let steps = 3600;
        let visible: Vec<bool> = (0..steps)
            .map(|k| star.get_local_coords(TAU * k as f64 / steps as f64, p).visible)
            .collect();
        (0..steps)
            .filter(|&k| visible[k] != visible[(k + 1) % steps])
            .count()
    }

    #[test]
    fn test_equatorial_star_rises_and_sets_once() {
        let p = pointing(0.2);
        let star = Star::new(1.0, 0.1, "equatorial", 6);
        assert_eq!(count_transitions(&star, &p), 2);
    }

    #[test]
    fn test_circumpolar_star_is_always_visible() {
        let p = pointing(80f64.to_radians());
        let star = Star::new(2.0, 80f64.to_radians(), "circumpolar", 7);
        assert_eq!(count_transitions(&star, &p), 0);
        assert!(star.get_local_coords(1.23, &p).visible);
    }

    #[test]
    fn test_track_and_pixel_tracks_agree() {
        let p = pointing(0.0);
        let stars = vec![
            Star::new(0.3, 0.0, "a", 1),
            Star::new(0.35, 0.1f64.atan(), "b", 2),
        ];
        let eras: Vec<f64> = (0..20).map(|k| -0.2 + 0.02 * k as f64).collect();
        let (i_index, j_index) = pixel_tracks(&stars, &eras, &p, &geometry());
        assert_eq!(i_index.dim(), (2, 20));

        for (s, star) in stars.iter().enumerate() {
            let track = star.track(&eras, &p, &geometry());
            assert_eq!(track.len(), eras.len());
            for (t, (i, j)) in track.into_iter().enumerate() {
                assert_eq!(i_index[[s, t]], i);
                assert_eq!(j_index[[s, t]], j);
            }
        }
        assert!(i_index.iter().any(|&i| i != NO_PIXEL));
    }
}
