use super::{DisplayParameter, FlatFieldModel, ModelKind, ModelRecord, ResponseCurve, DEFAULT_GRID};
use crate::grid::{self, Rows};
use crate::FlatFieldError;
use log::debug;
use ndarray::{Array, Array2, ArrayBase, Data, Dimension, Zip};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Models applied in sequence, each fed the previous model's output.
///
/// Every member contributes its own master coefficient. A pixel is broken
/// in the chain when any member flags it.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    models: Vec<FlatFieldModel>,
}

#[derive(Deserialize)]
struct ChainParameters {
    #[serde(default)]
    models: Vec<ModelRecord>,
    #[serde(default, deserialize_with = "grid::optional::deserialize")]
    broken: Option<Array2<bool>>,
}

#[derive(Serialize)]
struct ChainParametersRef<'a> {
    models: Vec<ModelRecord>,
    broken: Rows<'a, bool>,
}

/// Grid shared by `models`, from the first member that has one
fn shape_of(models: &[FlatFieldModel]) -> Option<(usize, usize)> {
    models.iter().find_map(FlatFieldModel::shape)
}

fn check_member(
    members: &[FlatFieldModel],
    candidate: &FlatFieldModel,
) -> Result<(), FlatFieldError> {
    match (shape_of(members), candidate.shape()) {
        (Some(expected), Some(found)) if expected != found => Err(FlatFieldError::ShapeMismatch {
            expected,
            found: vec![found.0, found.1],
        }),
        _ => Ok(()),
    }
}

impl Chain {
    pub fn new(models: Vec<FlatFieldModel>) -> Result<Self, FlatFieldError> {
        let mut chain = Self::default();
        for model in models {
            chain.append_model(model)?;
        }
        Ok(chain)
    }

    pub fn models(&self) -> &[FlatFieldModel] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn append_model(&mut self, model: FlatFieldModel) -> Result<(), FlatFieldError> {
        check_member(&self.models, &model)?;
        debug!("Appended {model} to chain");
        self.models.push(model);
        Ok(())
    }

    /// Replace the last model, if there is one
    pub fn amend_model(&mut self, model: FlatFieldModel) -> Result<(), FlatFieldError> {
        if let Some((_, rest)) = self.models.split_last() {
            check_member(rest, &model)?;
            if let Some(last) = self.models.last_mut() {
                *last = model;
            }
        }
        Ok(())
    }

    /// Apply every model but the last, which is the one being re-fitted
    pub fn apply_amending<S, D>(
        &self,
        data: &ArrayBase<S, D>,
    ) -> Result<Array<f64, D>, FlatFieldError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let mut output = data.to_owned();
        if let Some((_, leading)) = self.models.split_last() {
            for model in leading {
                output = model.apply(&output)?;
            }
        }
        Ok(output)
    }

    pub(crate) fn from_parameters(
        parameters: Value,
    ) -> Result<(Self, Option<Array2<bool>>), FlatFieldError> {
        let p: ChainParameters = serde_json::from_value(parameters)?;
        let models = p
            .models
            .into_iter()
            .map(FlatFieldModel::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((Self::new(models)?, p.broken))
    }
}

impl ResponseCurve for Chain {
    fn kind(&self) -> ModelKind {
        ModelKind::Chain
    }

    fn shape(&self) -> Option<(usize, usize)> {
        shape_of(&self.models)
    }

    fn evaluate_pixel(&self, raw: f64, i: usize, j: usize) -> f64 {
        self.models
            .iter()
            .fold(raw, |value, model| model.apply_pixel(value, i, j))
    }

    fn broken_auto(&self) -> Array2<bool> {
        let shape = self.shape().unwrap_or(DEFAULT_GRID);
        let mut broken = Array2::from_elem(shape, false);
        for model in &self.models {
            let member = model.broken();
            if member.dim() == shape {
                Zip::from(&mut broken)
                    .and(member)
                    .for_each(|any, &flag| *any |= flag);
            }
        }
        broken
    }

    fn parameters(&self, broken: &Array2<bool>) -> Result<Value, FlatFieldError> {
        let models = self
            .models
            .iter()
            .map(|model| model.dump(None))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::to_value(ChainParametersRef {
            models,
            broken: Rows(broken),
        })?)
    }

    fn display_parameters(&self) -> [DisplayParameter<'_>; 2] {
        match self.models.last() {
            Some(model) => model.display_parameters(),
            None => [DisplayParameter::nothing(), DisplayParameter::nothing()],
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", ModelKind::Chain)?;
        for (k, model) in self.models.iter().enumerate() {
            if k > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{model}")?;
        }
        f.write_str("]")
    }
}
