use std::collections::HashSet;
use std::sync::Arc;

use super::{InitGate, ParamBag};
use crate::error::{NnError, Result};
use crate::manager::ResourceManager;
use crate::parameter::{Parameter, ParameterKind};
use crate::tensor::{Shape, Tensor, TensorList};

/// Computation owned by a leaf block: which parameters it needs, how big they are, and how
/// to run a forward pass over them.
pub trait LeafKernel: Send + Sync {
    fn type_name(&self) -> &str;

    /// Declared parameters, in the order they are named, initialized, and streamed.
    fn parameters(&self) -> Vec<(String, ParameterKind)>;

    fn parameter_shape(&self, name: &str, inputs: &[Shape]) -> Result<Shape>;

    /// Shape checks run once, before parameters are materialized.
    fn validate_inputs(&self, _inputs: &[Shape]) -> Result<()> {
        Ok(())
    }

    /// Output shapes for inputs of `inputs`, computed without running `forward`.
    fn output_shapes(&self, _inputs: &[Shape]) -> Result<Vec<Shape>> {
        Err(NnError::unsupported(format!(
            "{} cannot infer output shapes",
            self.type_name()
        )))
    }

    fn forward(
        &self,
        params: &LeafParams<'_>,
        inputs: &TensorList,
        bag: &ParamBag,
    ) -> Result<TensorList>;
}

/// Read access to a leaf's parameters during `forward`.
pub struct LeafParams<'a> {
    parameters: &'a [Arc<Parameter>],
}

impl LeafParams<'_> {
    pub fn get(&self, name: &str) -> Result<Tensor> {
        self.parameters
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| NnError::invalid_argument(format!("could not find parameter {name}")))?
            .array()
    }
}

pub struct LeafBlock {
    kernel: Box<dyn LeafKernel>,
    parameters: Vec<Arc<Parameter>>,
    manager: ResourceManager,
    pub(super) gate: InitGate,
}

impl LeafBlock {
    /// Builds an uninitialized leaf; parameter names must be unique, non-empty ASCII without
    /// `/` or `.`.
    pub fn new(manager: &ResourceManager, kernel: impl LeafKernel + 'static) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut parameters = Vec::new();
        for (name, kind) in kernel.parameters() {
            if name.is_empty() || !name.is_ascii() || name.contains(['/', '.']) {
                return Err(NnError::invalid_argument(format!(
                    "{}: invalid parameter name '{name}'",
                    kernel.type_name()
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(NnError::invalid_argument(format!(
                    "{}: duplicate parameter name '{name}'",
                    kernel.type_name()
                )));
            }
            parameters.push(Arc::new(Parameter::new(name, kind)));
        }
        Ok(LeafBlock {
            kernel: Box::new(kernel),
            parameters,
            manager: manager.clone(),
            gate: InitGate::default(),
        })
    }

    pub fn type_name(&self) -> &str {
        self.kernel.type_name()
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    pub fn parameters(&self) -> &[Arc<Parameter>] {
        &self.parameters
    }

    pub(super) fn before_initialize(&self, inputs: &[Shape]) -> Result<()> {
        self.kernel.validate_inputs(inputs)
    }

    pub(super) fn parameter_shape(&self, name: &str, inputs: &[Shape]) -> Result<Shape> {
        if !self.parameters.iter().any(|p| p.name() == name) {
            return Err(NnError::invalid_argument(format!(
                "{} has no parameter {name}",
                self.type_name()
            )));
        }
        self.kernel.parameter_shape(name, inputs)
    }

    pub(super) fn output_shapes(&self, inputs: &[Shape]) -> Result<Vec<Shape>> {
        self.kernel.output_shapes(inputs)
    }

    pub(super) fn forward(&self, inputs: &TensorList, bag: &ParamBag) -> Result<TensorList> {
        let params = LeafParams {
            parameters: &self.parameters,
        };
        self.kernel.forward(&params, inputs, bag)
    }
}
