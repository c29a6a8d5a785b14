use super::{Block, InitGate, ParamBag};
use crate::error::Result;
use crate::manager::ResourceManager;
use crate::tensor::{Shape, TensorList};

/// Chains children: each child runs on the previous child's output.
///
/// A child is initialized with the exact input it will see, so shape inference flows down
/// the chain on the first forward pass.
pub struct SequentialBlock {
    blocks: Vec<Block>,
    manager: ResourceManager,
    pub(super) gate: InitGate,
}

impl SequentialBlock {
    pub const TYPE_NAME: &'static str = "SequentialBlock";

    pub fn new(manager: &ResourceManager) -> Self {
        SequentialBlock {
            blocks: Vec::new(),
            manager: manager.clone(),
            gate: InitGate::default(),
        }
    }

    pub fn add(mut self, block: impl Into<Block>) -> Self {
        self.blocks.push(block.into());
        self
    }

    pub fn add_all(mut self, blocks: impl IntoIterator<Item = Block>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    pub(super) fn output_shapes(&self, inputs: &[Shape]) -> Result<Vec<Shape>> {
        self.blocks
            .iter()
            .try_fold(inputs.to_vec(), |shapes, block| block.output_shapes(&shapes))
    }

    pub(super) fn forward(&self, inputs: &TensorList, params: &ParamBag) -> Result<TensorList> {
        let mut current = inputs.clone();
        for block in &self.blocks {
            block.ensure_initialized(&current)?;
            current = block.forward(&current, params)?;
        }
        Ok(current)
    }
}
