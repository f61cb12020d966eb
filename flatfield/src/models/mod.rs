//! Per-pixel response models.
//!
//! Every model maps a raw reading of pixel `(i, j)` to a calibrated value
//! using that pixel's own fitted parameters. The concrete curves implement
//! [`ResponseCurve`]; [`Response`] is the closed set of curves a model file
//! can name, and [`FlatFieldModel`] adds the global gain and the
//! broken-pixel mask on top of a response.
//!
//! Model files are JSON records of the form
//! `{"model": <kind>, "parameters": {...}, "master_coeff": <float>}`.

mod chain;
mod linear;
mod pileup;
mod saturation;

pub use chain::Chain;
pub use linear::Linear;
pub use pileup::NonlinearPileup;
pub use saturation::NonlinearSaturation;

use crate::FlatFieldError;
use log::debug;
use ndarray::{Array, Array1, Array2, ArrayBase, Data, Dimension, Ix1};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Grid assumed for models that carry no per-pixel parameters of their own
pub const DEFAULT_GRID: (usize, usize) = (16, 16);

/// Parameters within this distance of zero mark a pixel as broken
pub const BROKEN_TOLERANCE: f64 = 1e-8;

/// Kind discriminator stored in the `model` field of a model file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Linear,
    NonlinearSaturation,
    NonlinearPileup,
    Chain,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Linear,
        ModelKind::NonlinearSaturation,
        ModelKind::NonlinearPileup,
        ModelKind::Chain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "Linear",
            ModelKind::NonlinearSaturation => "NonlinearSaturation",
            ModelKind::NonlinearPileup => "NonlinearPileup",
            ModelKind::Chain => "Chain",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = FlatFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FlatFieldError::UnknownModel(s.to_string()))
    }
}

/// A titled per-pixel parameter map for display.
///
/// `title` is a localization key; `values` is `None` when the model has
/// nothing to show.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayParameter<'a> {
    pub title: &'static str,
    pub values: Option<&'a Array2<f64>>,
}

impl<'a> DisplayParameter<'a> {
    pub const NOTHING: &'static str = "tool_flatfielder.nothing";

    pub fn new(title: &'static str, values: &'a Array2<f64>) -> Self {
        Self {
            title,
            values: Some(values),
        }
    }

    pub fn nothing() -> Self {
        Self {
            title: Self::NOTHING,
            values: None,
        }
    }
}

/// Per-pixel calibration curve
pub trait ResponseCurve {
    fn kind(&self) -> ModelKind;

    /// Pixel grid of the parameters, `None` when any grid is accepted
    fn shape(&self) -> Option<(usize, usize)>;

    /// Calibrated value of one raw reading of pixel `(i, j)`.
    ///
    /// Callers guarantee `(i, j)` lies inside [`ResponseCurve::shape`].
    fn evaluate_pixel(&self, raw: f64, i: usize, j: usize) -> f64;

    /// Broken-pixel mask derived from the parameters alone
    fn broken_auto(&self) -> Array2<bool>;

    /// The `parameters` object of the model file
    fn parameters(&self, broken: &Array2<bool>) -> Result<Value, FlatFieldError>;

    /// Primary and secondary parameter maps
    fn display_parameters(&self) -> [DisplayParameter<'_>; 2];
}

/// The closed set of response curves
#[derive(Debug, Clone)]
pub enum Response {
    Linear(Linear),
    NonlinearSaturation(NonlinearSaturation),
    NonlinearPileup(NonlinearPileup),
    Chain(Chain),
}

impl Response {
    fn curve(&self) -> &dyn ResponseCurve {
        match self {
            Response::Linear(model) => model,
            Response::NonlinearSaturation(model) => model,
            Response::NonlinearPileup(model) => model,
            Response::Chain(model) => model,
        }
    }

    /// Build a response from the `parameters` object of a model file.
    ///
    /// Returns the stored broken mask alongside, if the file carries one.
    pub fn from_parameters(
        kind: ModelKind,
        parameters: Value,
    ) -> Result<(Self, Option<Array2<bool>>), FlatFieldError> {
        Ok(match kind {
            ModelKind::Linear => {
                let (model, broken) = Linear::from_parameters(parameters)?;
                (model.into(), broken)
            }
            ModelKind::NonlinearSaturation => {
                let (model, broken) = NonlinearSaturation::from_parameters(parameters)?;
                (model.into(), broken)
            }
            ModelKind::NonlinearPileup => {
                let (model, broken) = NonlinearPileup::from_parameters(parameters)?;
                (model.into(), broken)
            }
            ModelKind::Chain => {
                let (model, broken) = Chain::from_parameters(parameters)?;
                (model.into(), broken)
            }
        })
    }
}

impl ResponseCurve for Response {
    fn kind(&self) -> ModelKind {
        self.curve().kind()
    }

    fn shape(&self) -> Option<(usize, usize)> {
        self.curve().shape()
    }

    fn evaluate_pixel(&self, raw: f64, i: usize, j: usize) -> f64 {
        self.curve().evaluate_pixel(raw, i, j)
    }

    fn broken_auto(&self) -> Array2<bool> {
        self.curve().broken_auto()
    }

    fn parameters(&self, broken: &Array2<bool>) -> Result<Value, FlatFieldError> {
        self.curve().parameters(broken)
    }

    fn display_parameters(&self) -> [DisplayParameter<'_>; 2] {
        self.curve().display_parameters()
    }
}

impl From<Linear> for Response {
    fn from(model: Linear) -> Self {
        Response::Linear(model)
    }
}

impl From<NonlinearSaturation> for Response {
    fn from(model: NonlinearSaturation) -> Self {
        Response::NonlinearSaturation(model)
    }
}

impl From<NonlinearPileup> for Response {
    fn from(model: NonlinearPileup) -> Self {
        Response::NonlinearPileup(model)
    }
}

impl From<Chain> for Response {
    fn from(model: Chain) -> Self {
        Response::Chain(model)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Chain(chain) => fmt::Display::fmt(chain, f),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

fn unit_coeff() -> f64 {
    1.0
}

/// On-disk form of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model: String,
    pub parameters: Value,
    #[serde(default = "unit_coeff", with = "crate::grid::float")]
    pub master_coeff: f64,
}

/// A response curve with its global gain and broken-pixel mask.
///
/// The mask is derived from the parameters on first use and cached. A mask
/// set explicitly (or loaded from a model file) replaces the derived one
/// until [`FlatFieldModel::reset_broken`] is called.
#[derive(Debug, Clone)]
pub struct FlatFieldModel {
    response: Response,
    /// Scalar gain applied after the per-pixel correction
    pub master_coeff: f64,
    broken: OnceCell<Array2<bool>>,
    broken_overridden: bool,
}

impl FlatFieldModel {
    pub fn new(response: impl Into<Response>) -> Self {
        Self {
            response: response.into(),
            master_coeff: 1.0,
            broken: OnceCell::new(),
            broken_overridden: false,
        }
    }

    pub fn with_master_coeff(mut self, master_coeff: f64) -> Self {
        self.master_coeff = master_coeff;
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.response.kind()
    }

    pub fn shape(&self) -> Option<(usize, usize)> {
        self.response.shape()
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response; drops a derived broken mask
    pub fn response_mut(&mut self) -> &mut Response {
        if !self.broken_overridden {
            self.broken.take();
        }
        &mut self.response
    }

    pub fn as_chain(&self) -> Option<&Chain> {
        match &self.response {
            Response::Chain(chain) => Some(chain),
            _ => None,
        }
    }

    pub fn as_chain_mut(&mut self) -> Option<&mut Chain> {
        match self.response_mut() {
            Response::Chain(chain) => Some(chain),
            _ => None,
        }
    }

    /// Grid the trailing axes of `shape` are indexed by
    fn grid_for(&self, shape: &[usize]) -> Result<(usize, usize), FlatFieldError> {
        let n = shape.len();
        match self.shape() {
            Some(expected) => {
                if n >= 2 && (shape[n - 2], shape[n - 1]) == expected {
                    Ok(expected)
                } else {
                    Err(FlatFieldError::ShapeMismatch {
                        expected,
                        found: shape.to_vec(),
                    })
                }
            }
            None => Ok(match n {
                0 => (1, 1),
                1 => (1, shape[0]),
                _ => (shape[n - 2], shape[n - 1]),
            }),
        }
    }

    fn check_pixel(&self, i: usize, j: usize) -> Result<(), FlatFieldError> {
        match self.shape() {
            Some((rows, cols)) if i >= rows || j >= cols => {
                Err(FlatFieldError::PixelOutOfRange { i, j, rows, cols })
            }
            _ => Ok(()),
        }
    }

    /// Map every element of `data` with its pixel coordinates
    fn map_pixels<S, D, F>(
        &self,
        data: &ArrayBase<S, D>,
        f: F,
    ) -> Result<Array<f64, D>, FlatFieldError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
        F: Fn(f64, usize, usize) -> f64,
    {
        let (rows, cols) = self.grid_for(data.shape())?;
        let plane = rows * cols;
        let values: Vec<f64> = data
            .iter()
            .enumerate()
            .map(|(k, &raw)| {
                let p = k % plane;
                f(raw, p / cols, p % cols)
            })
            .collect();
        Ok(Array::from_shape_vec(data.raw_dim(), values)?)
    }

    pub(crate) fn apply_pixel(&self, raw: f64, i: usize, j: usize) -> f64 {
        self.master_coeff * self.response.evaluate_pixel(raw, i, j)
    }

    /// Per-pixel correction of `data`, whose trailing axes are the pixel grid
    pub fn evaluate<S, D>(&self, data: &ArrayBase<S, D>) -> Result<Array<f64, D>, FlatFieldError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        self.map_pixels(data, |raw, i, j| self.response.evaluate_pixel(raw, i, j))
    }

    /// [`FlatFieldModel::evaluate`] scaled by the master coefficient
    pub fn apply<S, D>(&self, data: &ArrayBase<S, D>) -> Result<Array<f64, D>, FlatFieldError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        self.map_pixels(data, |raw, i, j| self.apply_pixel(raw, i, j))
    }

    /// Apply the model and zero every broken pixel
    pub fn apply_nobreak<S, D>(
        &self,
        data: &ArrayBase<S, D>,
    ) -> Result<Array<f64, D>, FlatFieldError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let broken = self.broken();
        self.map_pixels(data, |raw, i, j| {
            if broken.get((i, j)).copied().unwrap_or(false) {
                0.0
            } else {
                self.apply_pixel(raw, i, j)
            }
        })
    }

    /// Correct a series of readings of the single pixel `(i, j)`
    pub fn evaluate_single<S>(
        &self,
        data: &ArrayBase<S, Ix1>,
        i: usize,
        j: usize,
    ) -> Result<Array1<f64>, FlatFieldError>
    where
        S: Data<Elem = f64>,
    {
        self.check_pixel(i, j)?;
        Ok(data.mapv(|raw| self.response.evaluate_pixel(raw, i, j)))
    }

    pub fn apply_single<S>(
        &self,
        data: &ArrayBase<S, Ix1>,
        i: usize,
        j: usize,
    ) -> Result<Array1<f64>, FlatFieldError>
    where
        S: Data<Elem = f64>,
    {
        self.check_pixel(i, j)?;
        Ok(data.mapv(|raw| self.apply_pixel(raw, i, j)))
    }

    /// Zeros for a broken pixel, otherwise [`FlatFieldModel::apply_single`]
    pub fn apply_single_nobreak<S>(
        &self,
        data: &ArrayBase<S, Ix1>,
        i: usize,
        j: usize,
    ) -> Result<Array1<f64>, FlatFieldError>
    where
        S: Data<Elem = f64>,
    {
        if self.is_broken(i, j)? {
            Ok(Array1::zeros(data.len()))
        } else {
            self.apply_single(data, i, j)
        }
    }

    /// Effective broken-pixel mask
    pub fn broken(&self) -> &Array2<bool> {
        self.broken.get_or_init(|| {
            debug!("Generated broken-pixel mask for {} model", self.kind());
            self.response.broken_auto()
        })
    }

    /// Override the derived mask until [`FlatFieldModel::reset_broken`]
    pub fn set_broken(&mut self, broken: Array2<bool>) -> Result<(), FlatFieldError> {
        if let Some(expected) = self.shape() {
            if broken.dim() != expected {
                return Err(FlatFieldError::ShapeMismatch {
                    expected,
                    found: broken.shape().to_vec(),
                });
            }
        }
        self.broken = OnceCell::from(broken);
        self.broken_overridden = true;
        Ok(())
    }

    /// Go back to the mask derived from the parameters
    pub fn reset_broken(&mut self) {
        self.broken.take();
        self.broken_overridden = false;
    }

    /// Coordinates `(i, j)` of every broken pixel, in row-major order
    pub fn broken_query(&self) -> Vec<(usize, usize)> {
        self.broken()
            .indexed_iter()
            .filter(|(_, &flag)| flag)
            .map(|(index, _)| index)
            .collect()
    }

    /// Whether `(i, j)` is masked. A model without a pixel grid treats
    /// pixels beyond its mask as working.
    pub fn is_broken(&self, i: usize, j: usize) -> Result<bool, FlatFieldError> {
        let broken = self.broken();
        match broken.get((i, j)) {
            Some(&flag) => Ok(flag),
            None if self.shape().is_none() => Ok(false),
            None => {
                let (rows, cols) = broken.dim();
                Err(FlatFieldError::PixelOutOfRange { i, j, rows, cols })
            }
        }
    }

    pub fn display_parameters(&self) -> [DisplayParameter<'_>; 2] {
        self.response.display_parameters()
    }

    /// Model file record, optionally with a different master coefficient
    pub fn dump(&self, override_master_coeff: Option<f64>) -> Result<ModelRecord, FlatFieldError> {
        Ok(ModelRecord {
            model: self.kind().as_str().to_string(),
            parameters: self.response.parameters(self.broken())?,
            master_coeff: override_master_coeff.unwrap_or(self.master_coeff),
        })
    }

    /// Write the model file as indented JSON with sorted keys
    pub fn save(
        &self,
        path: &Path,
        override_master_coeff: Option<f64>,
    ) -> Result<(), FlatFieldError> {
        // Going through Value sorts the object keys
        let value = serde_json::to_value(self.dump(override_master_coeff)?)?;
        let mut writer = BufWriter::new(File::create(path)?);
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
        value.serialize(&mut serializer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, FlatFieldError> {
        let reader = BufReader::new(File::open(path)?);
        let record: ModelRecord = serde_json::from_reader(reader)?;
        Self::from_record(record)
    }

    pub fn from_record(record: ModelRecord) -> Result<Self, FlatFieldError> {
        let kind: ModelKind = record.model.parse()?;
        let (response, broken) = Response::from_parameters(kind, record.parameters)?;
        let mut model = FlatFieldModel::new(response).with_master_coeff(record.master_coeff);
        if let Some(broken) = broken {
            model.set_broken(broken)?;
        }
        Ok(model)
    }
}

impl fmt::Display for FlatFieldModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.response, f)
    }
}

/// Error unless `array` has the `expected` pixel grid
pub(crate) fn check_grid(expected: (usize, usize), array: &[usize]) -> Result<(), FlatFieldError> {
    if array.len() == 2 && (array[0], array[1]) == expected {
        Ok(())
    } else {
        Err(FlatFieldError::ShapeMismatch {
            expected,
            found: array.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array3};

    fn linear() -> FlatFieldModel {
        FlatFieldModel::new(
            Linear::new(array![[2.0, 0.0], [4.0, 1e-9]], array![[1.0, 0.0], [2.0, 0.0]]).unwrap(),
        )
    }

    #[test]
    fn test_model_kind_names() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
        }
        let err = "Quadratic".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, FlatFieldError::UnknownModel(ref name) if name == "Quadratic"));
    }

    #[test]
    fn test_apply_scales_by_master_coeff() {
        let model = linear().with_master_coeff(3.0);
        let data = array![[5.0, 7.0], [10.0, 1.0]];
        let evaluated = model.evaluate(&data).unwrap();
        let applied = model.apply(&data).unwrap();
        assert_relative_eq!(evaluated[[0, 0]], 2.0);
        assert_relative_eq!(evaluated[[1, 0]], 2.0);
        // Zero coefficient has a zero reciprocal
        assert_eq!(evaluated[[0, 1]], 0.0);
        assert_eq!(applied, &evaluated * 3.0);
    }

    #[test]
    fn test_single_matches_batch() {
        let model = linear().with_master_coeff(0.5);
        let series =
            Array3::from_shape_fn((6, 2, 2), |(t, i, j)| t as f64 * 1.5 + i as f64 - j as f64);
        let batch = model.apply(&series).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let lane = series.slice(ndarray::s![.., i, j]);
                let single = model.apply_single(&lane, i, j).unwrap();
                assert_eq!(single, batch.slice(ndarray::s![.., i, j]));
            }
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let model = linear();
        let err = model.evaluate(&Array3::<f64>::zeros((3, 2, 3))).unwrap_err();
        assert!(matches!(err, FlatFieldError::ShapeMismatch { expected: (2, 2), .. }));
        assert!(model.evaluate(&array![1.0, 2.0]).is_err());
        assert!(matches!(
            model.apply_single(&array![1.0], 2, 0),
            Err(FlatFieldError::PixelOutOfRange { i: 2, j: 0, .. })
        ));
    }

    #[test]
    fn test_broken_override_and_reset() {
        let mut model = linear();
        assert_eq!(model.broken_query(), vec![(0, 1), (1, 1)]);

        model.set_broken(array![[true, false], [false, false]]).unwrap();
        assert_eq!(model.broken_query(), vec![(0, 0)]);
        assert!(model.is_broken(0, 0).unwrap());
        assert!(!model.is_broken(1, 1).unwrap());

        // Overrides survive edits to the response
        model.response_mut();
        assert_eq!(model.broken_query(), vec![(0, 0)]);

        model.reset_broken();
        assert_eq!(model.broken_query(), vec![(0, 1), (1, 1)]);
        assert!(model.set_broken(Array2::from_elem((3, 3), false)).is_err());
        assert!(model.is_broken(5, 0).is_err());
    }

    #[test]
    fn test_nobreak_zeroes_broken_pixels() {
        let mut model = linear();
        model.set_broken(array![[false, false], [true, false]]).unwrap();
        let data = Array3::from_elem((3, 2, 2), 9.0);
        let out = model.apply_nobreak(&data).unwrap();
        for t in 0..3 {
            assert_eq!(out[[t, 1, 0]], 0.0);
            assert_relative_eq!(out[[t, 0, 0]], 4.0);
        }
        assert_eq!(model.apply_single_nobreak(&array![9.0, 9.0], 1, 0).unwrap(), array![0.0, 0.0]);
        assert_relative_eq!(model.apply_single_nobreak(&array![9.0], 0, 0).unwrap()[0], 4.0);
    }

    #[test]
    fn test_dump_overrides_master_coeff() {
        let model = linear().with_master_coeff(2.0);
        assert_eq!(model.dump(None).unwrap().master_coeff, 2.0);
        let record = model.dump(Some(0.25)).unwrap();
        assert_eq!(record.model, "Linear");
        assert_eq!(record.master_coeff, 0.25);
        assert_eq!(record.parameters["broken"], serde_json::json!([[false, true], [false, true]]));
    }

    #[test]
    fn test_record_defaults_master_coeff() {
        let record: ModelRecord = serde_json::from_str(
            r#"{
                "model": "NonlinearPileup",
                "parameters": {"sensitivity": [[1.0]], "divider": [[2.0]], "prescaler": 1.0}
            }"#,
        )
        .unwrap();
        assert_eq!(record.master_coeff, 1.0);
        let model = FlatFieldModel::from_record(record).unwrap();
        assert_eq!(model.kind(), ModelKind::NonlinearPileup);
        assert_eq!(model.shape(), Some((1, 1)));
    }

    #[test]
    fn test_unknown_model_record() {
        let record = ModelRecord {
            model: "Polynomial".into(),
            parameters: serde_json::json!({}),
            master_coeff: 1.0,
        };
        assert!(matches!(
            FlatFieldModel::from_record(record),
            Err(FlatFieldError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(linear().to_string(), "Linear");
        let [primary, secondary] = linear().display_parameters().map(|p| p.title);
        assert_eq!(primary, "flatfielder.coefficients.title");
        assert_eq!(secondary, "flatfielder.baselevel.title");
    }
}
