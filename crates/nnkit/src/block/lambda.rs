use std::fmt;
use std::sync::Arc;

use super::{Block, LeafBlock, LeafKernel, LeafParams, ParamBag};
use crate::error::{NnError, Result};
use crate::manager::ResourceManager;
use crate::parameter::ParameterKind;
use crate::tensor::{Shape, TensorList};

type LambdaFn = dyn Fn(&TensorList, &ParamBag) -> Result<TensorList> + Send + Sync;

/// Maps input shapes to output shapes without running the function.
pub type ShapeFn = dyn Fn(&[Shape]) -> Result<Vec<Shape>> + Send + Sync;

/// Parameterless leaf wrapping a plain function over the input list.
///
/// Output shapes are only known when a shape rule is attached; the built-in element-wise
/// lambdas carry one.
#[derive(Clone)]
pub struct Lambda {
    name: String,
    f: Arc<LambdaFn>,
    shapes: Option<Arc<ShapeFn>>,
}

impl Lambda {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TensorList, &ParamBag) -> Result<TensorList> + Send + Sync + 'static,
    {
        Lambda {
            name: name.into(),
            f: Arc::new(f),
            shapes: None,
        }
    }

    /// Attaches the rule [`Block::output_shapes`] uses for this lambda.
    pub fn with_output_shapes<F>(mut self, rule: F) -> Self
    where
        F: Fn(&[Shape]) -> Result<Vec<Shape>> + Send + Sync + 'static,
    {
        self.shapes = Some(Arc::new(rule));
        self
    }

    fn shape_preserving(self) -> Self {
        self.with_output_shapes(|inputs| Ok(inputs.to_vec()))
    }

    pub fn identity() -> Self {
        Lambda::new("identity", |inputs, _| Ok(inputs.clone())).shape_preserving()
    }

    /// Element-wise `max(x, 0)` over every input.
    pub fn relu() -> Self {
        Lambda::new("relu", |inputs, _| {
            inputs.iter().map(|t| t.map(|v| v.max(0.0))).collect()
        })
        .shape_preserving()
    }

    /// Multiplies every input by the `scale` entry of the parameter bag (default 1).
    pub fn scale() -> Self {
        Lambda::new("scale", |inputs, bag| {
            let factor = match bag.get("scale") {
                None => 1.0,
                Some(value) => value.as_f64().ok_or_else(|| {
                    NnError::invalid_argument(format!("scale must be a number, got {value}"))
                })? as f32,
            };
            inputs.iter().map(|t| t.map(|v| v * factor)).collect()
        })
        .shape_preserving()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(self, manager: &ResourceManager) -> Result<Block> {
        Ok(LeafBlock::new(manager, self)?.into())
    }
}

impl LeafKernel for Lambda {
    fn type_name(&self) -> &str {
        "LambdaBlock"
    }

    fn parameters(&self) -> Vec<(String, ParameterKind)> {
        Vec::new()
    }

    fn parameter_shape(&self, _name: &str, _inputs: &[Shape]) -> Result<Shape> {
        Err(NnError::invalid_argument(format!(
            "LambdaBlock '{}' has no parameters",
            self.name
        )))
    }

    fn output_shapes(&self, inputs: &[Shape]) -> Result<Vec<Shape>> {
        match &self.shapes {
            Some(rule) => rule(inputs),
            None => Err(NnError::unsupported(format!(
                "LambdaBlock '{}' has no output shape rule",
                self.name
            ))),
        }
    }

    fn forward(
        &self,
        _params: &LeafParams<'_>,
        inputs: &TensorList,
        bag: &ParamBag,
    ) -> Result<TensorList> {
        (self.f)(inputs, bag)
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda").field("name", &self.name).finish()
    }
}
