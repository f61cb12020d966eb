use super::{check_grid, DisplayParameter, ModelKind, ResponseCurve};
use crate::grid::{self, Rows};
use crate::lambert::lambert_w0;
use crate::FlatFieldError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::E;

/// Dead-time (pile-up) response.
///
/// Counted events fall behind true events as `raw = flux * s * exp(-flux * s / d)`
/// (after the global `prescaler`), inverted on the principal branch of the
/// Lambert W function: `flux = -(d / s) * W0(-raw / d)`. Readings are clipped
/// to `[0, d / e]`, the range that branch covers, and non-finite results are
/// folded to finite numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearPileup {
    sensitivity: Array2<f64>,
    divider: Array2<f64>,
    prescaler: f64,
}

#[derive(Deserialize)]
struct PileupParameters {
    #[serde(deserialize_with = "grid::deserialize")]
    sensitivity: Array2<f64>,
    #[serde(deserialize_with = "grid::deserialize")]
    divider: Array2<f64>,
    #[serde(deserialize_with = "grid::float::deserialize")]
    prescaler: f64,
    #[serde(default, deserialize_with = "grid::optional::deserialize")]
    broken: Option<Array2<bool>>,
}

#[derive(Serialize)]
struct PileupParametersRef<'a> {
    sensitivity: Rows<'a, f64>,
    divider: Rows<'a, f64>,
    #[serde(serialize_with = "grid::float::serialize")]
    prescaler: f64,
    broken: Rows<'a, bool>,
}

/// NaN to zero, infinities to the largest finite values
fn nan_to_num(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        f64::MAX
    } else if value == f64::NEG_INFINITY {
        f64::MIN
    } else {
        value
    }
}

impl NonlinearPileup {
    pub fn new(
        sensitivity: Array2<f64>,
        divider: Array2<f64>,
        prescaler: f64,
    ) -> Result<Self, FlatFieldError> {
        check_grid(sensitivity.dim(), divider.shape())?;
        Ok(Self {
            sensitivity,
            divider,
            prescaler,
        })
    }

    pub fn sensitivity(&self) -> &Array2<f64> {
        &self.sensitivity
    }

    pub fn divider(&self) -> &Array2<f64> {
        &self.divider
    }

    pub fn prescaler(&self) -> f64 {
        self.prescaler
    }

    pub(crate) fn from_parameters(
        parameters: Value,
    ) -> Result<(Self, Option<Array2<bool>>), FlatFieldError> {
        let p: PileupParameters = serde_json::from_value(parameters)?;
        Ok((Self::new(p.sensitivity, p.divider, p.prescaler)?, p.broken))
    }
}

impl ResponseCurve for NonlinearPileup {
    fn kind(&self) -> ModelKind {
        ModelKind::NonlinearPileup
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some(self.sensitivity.dim())
    }

    fn evaluate_pixel(&self, raw: f64, i: usize, j: usize) -> f64 {
        let divider = self.divider[[i, j]];
        let sensitivity = self.sensitivity[[i, j]];
        let clipped = (raw * self.prescaler).max(0.0).min(divider / E);
        nan_to_num(-divider / sensitivity * lambert_w0(-clipped / divider))
    }

    fn broken_auto(&self) -> Array2<bool> {
        self.sensitivity.mapv(|s| s <= 0.0)
    }

    fn parameters(&self, broken: &Array2<bool>) -> Result<Value, FlatFieldError> {
        Ok(serde_json::to_value(PileupParametersRef {
            sensitivity: Rows(&self.sensitivity),
            divider: Rows(&self.divider),
            prescaler: self.prescaler,
            broken: Rows(broken),
        })?)
    }

    fn display_parameters(&self) -> [DisplayParameter<'_>; 2] {
        [
            DisplayParameter::new("flatfielder.sensitivity.title", &self.sensitivity),
            DisplayParameter::new("flatfielder.divider.title", &self.divider),
        ]
    }
}
