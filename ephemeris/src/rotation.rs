//! Sky rotation and frame conversions.
//!
//! The earth rotation angle (ERA) is the phase with which fixed stars sweep
//! past a ground-based field of view. It is computed from the IERS 2000
//! definition, treating UTC as UT1 (the sub-second difference is far below a
//! pixel for this detector).

use crate::EphemerisError;
use log::debug;
use nalgebra::{Matrix3, Vector3};
use shared::DetectorGeometry;
use std::f64::consts::{FRAC_PI_2, TAU};
use time::OffsetDateTime;

const SECONDS_PER_DAY: f64 = 86_400.0;
/// Julian date of the Unix epoch minus Julian date of J2000.0
const UNIX_EPOCH_FROM_J2000_DAYS: f64 = 2_440_587.5 - 2_451_545.0;
/// ERA at J2000.0, in turns
const ERA_AT_J2000: f64 = 0.779_057_273_264_0;
/// Excess rotation per UT1 day beyond one full turn
const ERA_RATE_EXCESS: f64 = 0.002_737_811_911_354_48;
/// Full rotations per solar day
const SIDEREAL_RATE: f64 = 1.0 + ERA_RATE_EXCESS;

/// Earth rotation angle in radians, wrapped to `[0, 2π)`.
pub fn earth_rotation_angle(t: OffsetDateTime) -> f64 {
    let unix = t.unix_timestamp_nanos() as f64 * 1e-9;
    let days = unix / SECONDS_PER_DAY + UNIX_EPOCH_FROM_J2000_DAYS;
    // Keeping the whole-day part out of the product preserves precision
    let turns = ERA_AT_J2000 + ERA_RATE_EXCESS * days + days.fract();
    turns.rem_euclid(1.0) * TAU
}

/// Field pointing used to bound a catalog query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeParameters {
    /// Field right ascension offset in degrees
    pub ra0: f64,
    /// Field declination in degrees
    pub dec0: f64,
    /// Focal length, same unit as the detector geometry
    pub f: f64,
}

/// Right ascension / declination search box, in radians.
///
/// `ra_high` may exceed `2π`; containment is evaluated modulo a full turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyRange {
    pub ra_low: f64,
    pub ra_high: f64,
    pub dec_low: f64,
    pub dec_high: f64,
}

impl SkyRange {
    /// Whether a sky position falls inside the box
    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        if dec < self.dec_low || dec > self.dec_high {
            return false;
        }
        let span = self.ra_high - self.ra_low;
        if span >= TAU {
            return true;
        }
        (ra - self.ra_low).rem_euclid(TAU) <= span
    }
}

/// Half angle of view of the detector for a focal length
pub fn half_field_of_view(geometry: &DetectorGeometry, focal_length: f64) -> f64 {
    (geometry.half_extent() * 2.0 / focal_length).atan()
}

/// Bounding box of every sky position that may cross the detector between
/// `t1` and `t2`.
///
/// The right ascension band follows the rotation from `t1` to `t2` and is
/// padded by twice the half field of view; the declination band by one half
/// field of view.
pub fn range_calculate(
    params: &RangeParameters,
    t1: OffsetDateTime,
    t2: OffsetDateTime,
    geometry: &DetectorGeometry,
) -> Result<SkyRange, EphemerisError> {
    if !(params.f > 0.0) {
        return Err(EphemerisError::InvalidFocalLength(params.f));
    }
    if t2 < t1 {
        return Err(EphemerisError::ReversedTimeRange);
    }

    let ra0 = params.ra0.to_radians();
    let dec0 = params.dec0.to_radians();
    let half_fov = half_field_of_view(geometry, params.f);

    let era1 = earth_rotation_angle(t1);
    let elapsed_days = (t2 - t1).as_seconds_f64() / SECONDS_PER_DAY;
    let era2 = if elapsed_days * SIDEREAL_RATE >= 1.0 {
        era1 + TAU
    } else {
        era1 + (earth_rotation_angle(t2) - era1).rem_euclid(TAU)
    };
    debug!("Range query: era {era1:.6} .. {era2:.6}, half fov {half_fov:.6}");

    Ok(SkyRange {
        ra_low: era1 + ra0 - half_fov * 2.0,
        ra_high: era2 + ra0 + half_fov * 2.0,
        dec_low: dec0 - half_fov,
        dec_high: dec0 + half_fov,
    })
}

/// Convert a field pointing to local altitude/azimuth at an observing site.
///
/// The unit x vector is rotated by declination, then by right ascension
/// relative to the site longitude, then by site latitude. Returns
/// `(altitude, azimuth)` in radians.
pub fn to_altaz(dec0: f64, ra0: f64, lat: f64, lon: f64) -> (f64, f64) {
    let (sd, cd) = dec0.sin_cos();
    let (sl, cl) = lat.sin_cos();
    let (sh, ch) = (ra0 - lon).sin_cos();

    let dec_rotate = Matrix3::new(cd, 0.0, -sd, 0.0, 1.0, 0.0, sd, 0.0, cd);
    let ra_rotate = Matrix3::new(ch, -sh, 0.0, sh, ch, 0.0, 0.0, 0.0, 1.0);
    let lat_rotate = Matrix3::new(cl, 0.0, sl, 0.0, 1.0, 0.0, -sl, 0.0, cl);

    let v = lat_rotate * (ra_rotate * (dec_rotate * Vector3::x()));
    let rev_alt = (v.x / v.norm()).clamp(-1.0, 1.0).acos();
    let az = FRAC_PI_2 - v.z.atan2(v.y);
    (FRAC_PI_2 - rev_alt, az)
}
