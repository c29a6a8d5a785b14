//! Fully connected layer `y = x W + b`.

use super::{Block, LeafBlock, LeafKernel, LeafParams, ParamBag};
use crate::error::{NnError, Result};
use crate::manager::ResourceManager;
use crate::parameter::ParameterKind;
use crate::tensor::{Shape, Tensor, TensorList};

const WEIGHT: &str = "weight";
const BIAS: &str = "bias";

/// Dense projection over rank-2 inputs `[batch, in]` producing `[batch, units]`.
///
/// `weight` is `[in, units]` and `bias` is `[units]`; `in` is taken from the first input
/// the block sees.
#[derive(Debug, Clone, Copy)]
pub struct Linear {
    units: usize,
    bias: bool,
}

impl Linear {
    pub fn new(units: usize) -> Self {
        Linear { units, bias: true }
    }

    pub fn without_bias(mut self) -> Self {
        self.bias = false;
        self
    }

    pub fn units(&self) -> usize {
        self.units
    }

    /// Wraps the kernel in a leaf block bound to `manager`.
    pub fn build(self, manager: &ResourceManager) -> Result<Block> {
        Ok(LeafBlock::new(manager, self)?.into())
    }

    fn input_features(inputs: &[Shape]) -> Result<usize> {
        let input = inputs
            .first()
            .ok_or_else(|| NnError::invalid_argument("Linear expects one input, got none"))?;
        if input.rank() != 2 {
            return Err(NnError::invalid_argument(format!(
                "Linear expects 2D input, got shape {input}"
            )));
        }
        Ok(input.dims()[1])
    }
}

impl LeafKernel for Linear {
    fn type_name(&self) -> &str {
        "Linear"
    }

    fn parameters(&self) -> Vec<(String, ParameterKind)> {
        let mut params = vec![(WEIGHT.to_string(), ParameterKind::Weight)];
        if self.bias {
            params.push((BIAS.to_string(), ParameterKind::Bias));
        }
        params
    }

    fn parameter_shape(&self, name: &str, inputs: &[Shape]) -> Result<Shape> {
        match name {
            WEIGHT => Ok(Shape::new([Self::input_features(inputs)?, self.units])),
            BIAS => Ok(Shape::new([self.units])),
            other => Err(NnError::invalid_argument(format!(
                "Linear has no parameter {other}"
            ))),
        }
    }

    fn validate_inputs(&self, inputs: &[Shape]) -> Result<()> {
        if self.units == 0 {
            return Err(NnError::invalid_argument("Linear needs at least one unit"));
        }
        Self::input_features(inputs).map(|_| ())
    }

    fn output_shapes(&self, inputs: &[Shape]) -> Result<Vec<Shape>> {
        self.validate_inputs(inputs)?;
        let batch = inputs[0].dims()[0];
        Ok(vec![Shape::new([batch, self.units])])
    }

    fn forward(
        &self,
        params: &LeafParams<'_>,
        inputs: &TensorList,
        _bag: &ParamBag,
    ) -> Result<TensorList> {
        let input = inputs
            .get(0)
            .ok_or_else(|| NnError::invalid_argument("Linear expects one input, got none"))?;
        let dims = input.shape().dims();
        let weight = params.get(WEIGHT)?;
        let weight_dims = weight.shape().dims();
        if dims.len() != 2 || weight_dims.len() != 2 || dims[1] != weight_dims[0] {
            return Err(NnError::invalid_argument(format!(
                "input shape {} does not match weight shape {}",
                input.shape(),
                weight.shape()
            )));
        }
        let (rows, inner, cols) = (dims[0], dims[1], weight_dims[1]);
        let x = input.to_f32_vec()?;
        let w = weight.to_f32_vec()?;
        let mut out = if self.bias {
            let bias = params.get(BIAS)?.to_f32_vec()?;
            if bias.len() != cols {
                return Err(NnError::invalid_argument(format!(
                    "bias has {} elements, weight shape {} needs {cols}",
                    bias.len(),
                    weight.shape()
                )));
            }
            bias.repeat(rows)
        } else {
            vec![0.0; rows * cols]
        };
        for r in 0..rows {
            for k in 0..inner {
                let a = x[r * inner + k];
                for c in 0..cols {
                    out[r * cols + c] += a * w[k * cols + c];
                }
            }
        }
        Ok(TensorList::single(Tensor::from_vec([rows, cols], out)?))
    }
}
