use super::{check_grid, DisplayParameter, ModelKind, ResponseCurve, BROKEN_TOLERANCE};
use crate::grid::{self, Rows};
use crate::FlatFieldError;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exponentially saturating response.
///
/// The detector is modelled as
/// `raw = saturation * (1 - exp(-(response / saturation) * (flux - offset)))`
/// and the inverse is evaluated per pixel:
/// `flux = offset - (saturation / response) * ln(1 - raw / saturation)`.
/// Readings at or above saturation have no preimage and map to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearSaturation {
    saturation: Array2<f64>,
    response: Array2<f64>,
    offset: Array2<f64>,
}

#[derive(Deserialize)]
struct SaturationParameters {
    #[serde(deserialize_with = "grid::deserialize")]
    saturation: Array2<f64>,
    #[serde(deserialize_with = "grid::deserialize")]
    response: Array2<f64>,
    #[serde(deserialize_with = "grid::deserialize")]
    offset: Array2<f64>,
    #[serde(default, deserialize_with = "grid::optional::deserialize")]
    broken: Option<Array2<bool>>,
}

#[derive(Serialize)]
struct SaturationParametersRef<'a> {
    saturation: Rows<'a, f64>,
    response: Rows<'a, f64>,
    offset: Rows<'a, f64>,
    broken: Rows<'a, bool>,
}

impl NonlinearSaturation {
    pub fn new(
        saturation: Array2<f64>,
        response: Array2<f64>,
        offset: Array2<f64>,
    ) -> Result<Self, FlatFieldError> {
        check_grid(saturation.dim(), response.shape())?;
        check_grid(saturation.dim(), offset.shape())?;
        Ok(Self {
            saturation,
            response,
            offset,
        })
    }

    pub fn saturation(&self) -> &Array2<f64> {
        &self.saturation
    }

    pub fn response(&self) -> &Array2<f64> {
        &self.response
    }

    pub fn offset(&self) -> &Array2<f64> {
        &self.offset
    }

    pub(crate) fn from_parameters(
        parameters: Value,
    ) -> Result<(Self, Option<Array2<bool>>), FlatFieldError> {
        let p: SaturationParameters = serde_json::from_value(parameters)?;
        Ok((Self::new(p.saturation, p.response, p.offset)?, p.broken))
    }
}

impl ResponseCurve for NonlinearSaturation {
    fn kind(&self) -> ModelKind {
        ModelKind::NonlinearSaturation
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some(self.saturation.dim())
    }

    fn evaluate_pixel(&self, raw: f64, i: usize, j: usize) -> f64 {
        let saturation = self.saturation[[i, j]];
        let response = self.response[[i, j]];
        let inv_saturation = if saturation == 0.0 {
            0.0
        } else {
            1.0 / saturation
        };
        let scale = if saturation == 0.0 || response == 0.0 {
            0.0
        } else {
            saturation / response
        };
        let argument = 1.0 - raw * inv_saturation;
        if argument <= 0.0 {
            return 0.0;
        }
        self.offset[[i, j]] - argument.ln() * scale
    }

    fn broken_auto(&self) -> Array2<bool> {
        Zip::from(&self.saturation)
            .and(&self.response)
            .map_collect(|&s, &r| s.abs() <= BROKEN_TOLERANCE || (s / r).abs() <= BROKEN_TOLERANCE)
    }

    fn parameters(&self, broken: &Array2<bool>) -> Result<Value, FlatFieldError> {
        Ok(serde_json::to_value(SaturationParametersRef {
            saturation: Rows(&self.saturation),
            response: Rows(&self.response),
            offset: Rows(&self.offset),
            broken: Rows(broken),
        })?)
    }

    fn display_parameters(&self) -> [DisplayParameter<'_>; 2] {
        [
            DisplayParameter::new("flatfielder.saturation.title", &self.saturation),
            DisplayParameter::new("flatfielder.response.title", &self.response),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn single(saturation: f64, response: f64, offset: f64) -> NonlinearSaturation {
        NonlinearSaturation::new(array![[saturation]], array![[response]], array![[offset]])
            .unwrap()
    }

    #[test]
    fn test_inverts_forward_model() {
        let (s, r, o) = (10.0, 5.0, 0.5);
        let model = single(s, r, o);
        for flux in [0.5, 1.0, 2.0, 4.0] {
            let raw = s * (1.0 - (-(r / s) * (flux - o)).exp());
            assert_relative_eq!(model.evaluate_pixel(raw, 0, 0), flux, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_saturated_readings_map_to_zero() {
        let model = single(10.0, 5.0, 0.0);
        assert_eq!(model.evaluate_pixel(10.0, 0, 0), 0.0);
        assert_eq!(model.evaluate_pixel(25.0, 0, 0), 0.0);
        assert!(model.evaluate_pixel(9.999, 0, 0).is_finite());
    }

    #[test]
    fn test_degenerate_parameters() {
        // Zero saturation leaves only the offset
        assert_relative_eq!(single(0.0, 5.0, 1.5).evaluate_pixel(3.0, 0, 0), 1.5);
        // Zero response drops the logarithmic term
        assert_relative_eq!(single(10.0, 0.0, 0.5).evaluate_pixel(3.0, 0, 0), 0.5);
    }

    #[test]
    fn test_broken_pixels() {
        let model = NonlinearSaturation::new(
            array![[0.0, 1e-9, 10.0, 10.0]],
            array![[1.0, 1.0, 1e12, 5.0]],
            Array2::zeros((1, 4)),
        )
        .unwrap();
        assert_eq!(model.broken_auto(), array![[true, true, true, false]]);
    }
}
