//! Opaque training collaborators.
//!
//! Engines construct these; the block graph only hands them parameters and tensors.

use std::fmt::Debug;

use crate::error::Result;
use crate::parameter::ParameterList;
use crate::tensor::Tensor;

/// Update rule shared with a [`ParameterStore`].
pub trait Optimizer: Send + Sync + Debug {
    fn name(&self) -> &str;
}

/// Records operations and produces gradients for a scalar result.
pub trait GradientCollector: Send {
    fn backward(&mut self, target: &Tensor) -> Result<()>;
}

/// Holds the parameters being trained and applies optimizer steps to them.
pub trait ParameterStore: Send {
    fn init(&mut self, parameters: &ParameterList) -> Result<()>;

    fn update_all(&mut self) -> Result<()>;
}
