use super::{check_grid, DisplayParameter, ModelKind, ResponseCurve, BROKEN_TOLERANCE};
use crate::grid::{self, Rows};
use crate::FlatFieldError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Offset and gain per pixel: `(raw - baseline) / coefficient`
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    coefficients: Array2<f64>,
    baseline: Array2<f64>,
}

#[derive(Deserialize)]
struct LinearParameters {
    #[serde(deserialize_with = "grid::deserialize")]
    coefficients: Array2<f64>,
    #[serde(deserialize_with = "grid::deserialize")]
    baseline: Array2<f64>,
    #[serde(default, deserialize_with = "grid::optional::deserialize")]
    broken: Option<Array2<bool>>,
}

#[derive(Serialize)]
struct LinearParametersRef<'a> {
    coefficients: Rows<'a, f64>,
    baseline: Rows<'a, f64>,
    broken: Rows<'a, bool>,
}

impl Linear {
    pub fn new(coefficients: Array2<f64>, baseline: Array2<f64>) -> Result<Self, FlatFieldError> {
        check_grid(coefficients.dim(), baseline.shape())?;
        Ok(Self {
            coefficients,
            baseline,
        })
    }

    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn baseline(&self) -> &Array2<f64> {
        &self.baseline
    }

    pub(crate) fn from_parameters(
        parameters: Value,
    ) -> Result<(Self, Option<Array2<bool>>), FlatFieldError> {
        let p: LinearParameters = serde_json::from_value(parameters)?;
        Ok((Self::new(p.coefficients, p.baseline)?, p.broken))
    }
}

impl ResponseCurve for Linear {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some(self.coefficients.dim())
    }

    fn evaluate_pixel(&self, raw: f64, i: usize, j: usize) -> f64 {
        let coefficient = self.coefficients[[i, j]];
        let reciprocal = if coefficient == 0.0 {
            0.0
        } else {
            1.0 / coefficient
        };
        (raw - self.baseline[[i, j]]) * reciprocal
    }

    fn broken_auto(&self) -> Array2<bool> {
        self.coefficients.mapv(|c| c.abs() <= BROKEN_TOLERANCE)
    }

    fn parameters(&self, broken: &Array2<bool>) -> Result<Value, FlatFieldError> {
        Ok(serde_json::to_value(LinearParametersRef {
            coefficients: Rows(&self.coefficients),
            baseline: Rows(&self.baseline),
            broken: Rows(broken),
        })?)
    }

    fn display_parameters(&self) -> [DisplayParameter<'_>; 2] {
        [
            DisplayParameter::new("flatfielder.coefficients.title", &self.coefficients),
            DisplayParameter::new("flatfielder.baselevel.title", &self.baseline),
        ]
    }
}
