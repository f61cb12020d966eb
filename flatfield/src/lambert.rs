//! Principal branch of the Lambert W function on the real axis.
//!
//! `W0(x)` solves `w * exp(w) = x` for `w >= -1`, defined for `x >= -1/e`.
//! Evaluated by Halley iteration from a branch-point series or logarithmic
//! starting guess.

use std::f64::consts::E;

/// Lower end of the real domain, `-1/e`
pub const BRANCH_POINT: f64 = -1.0 / E;

const MAX_ITERATIONS: usize = 32;
const TOLERANCE: f64 = 4.0 * f64::EPSILON;

/// Arguments this close below the branch point are treated as the branch point.
/// `-(d/e)/d` can round one ulp past `-1/e`.
const BRANCH_SLACK: f64 = 1e-12;

/// Principal-branch Lambert W. Returns NaN below the real domain.
pub fn lambert_w0(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x <= BRANCH_POINT {
        return if x >= BRANCH_POINT - BRANCH_SLACK {
            -1.0
        } else {
            f64::NAN
        };
    }
    if x == 0.0 {
        return 0.0;
    }
    if x.is_infinite() {
        return f64::INFINITY;
    }

    let p_squared = 2.0 * (E * x + 1.0);
    let mut w = if p_squared < 0.25 {
        // Series about the branch point in p = sqrt(2(ex + 1))
        let p = p_squared.sqrt();
        let series = -1.0 + p - p * p / 3.0 + 11.0 / 72.0 * p * p * p;
        if p < 1e-4 {
            return series;
        }
        series
    } else if x < 3.0 {
        x.ln_1p()
    } else {
        let l = x.ln();
        l - l.ln()
    };

    for _ in 0..MAX_ITERATIONS {
        let ew = w.exp();
        let f = w * ew - x;
        let w1 = w + 1.0;
        let step = f / (ew * w1 - (w + 2.0) * f / (2.0 * w1));
        if !step.is_finite() {
            break;
        }
        w -= step;
        if step.abs() <= TOLERANCE * (1.0 + w.abs()) {
            break;
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_known_values() {
        assert_eq!(lambert_w0(0.0), 0.0);
        assert_relative_eq!(lambert_w0(E), 1.0, epsilon = 1e-14);
        assert_relative_eq!(lambert_w0(1.0), 0.567_143_290_409_783_8, epsilon = 1e-14);
        assert_relative_eq!(lambert_w0(-0.2), -0.259_171_101_819_073_7, epsilon = 1e-14);
        assert_relative_eq!(lambert_w0(BRANCH_POINT), -1.0);
    }

    #[test]
    fn test_domain() {
        assert!(lambert_w0(-0.5).is_nan());
        assert!(lambert_w0(f64::NAN).is_nan());
        assert_eq!(lambert_w0(f64::INFINITY), f64::INFINITY);
        // One ulp below the branch point still counts as the branch point
        let d = 3.7;
        assert_relative_eq!(lambert_w0(-(d / E) / d), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inverse_identity() {
        let samples = 500;
        for k in 1..=samples {
            let x = BRANCH_POINT + (20.0 - BRANCH_POINT) * k as f64 / samples as f64;
            let w = lambert_w0(x);
            assert!(w >= -1.0, "W({x}) = {w}");
            assert_relative_eq!(w * w.exp(), x, epsilon = 1e-12, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_near_branch_point() {
        for eps in [1e-14, 1e-10, 1e-8, 1e-6, 1e-3] {
            let x = BRANCH_POINT + eps;
            let w = lambert_w0(x);
            assert!(w > -1.0 - 1e-9 && w < 0.0, "W({x}) = {w}");
            assert_relative_eq!(w * w.exp(), x, epsilon = 1e-12);
        }
    }
}
