use std::sync::Arc;

use rayon::prelude::*;

use super::{Block, InitGate, ParamBag};
use crate::error::{NnError, Result};
use crate::manager::ResourceManager;
use crate::tensor::{Shape, TensorList};

/// Merges the per-child outputs, given in child order, into the block's output.
pub type CombineFn = dyn Fn(Vec<TensorList>) -> Result<TensorList> + Send + Sync;

/// Shape-level counterpart of a [`CombineFn`].
pub type CombineShapesFn = dyn Fn(Vec<Vec<Shape>>) -> Result<Vec<Shape>> + Send + Sync;

/// Branches in the graph: every child sees the same input and the outputs are combined.
///
/// Child forwards run on the rayon pool; their outputs are reassembled in child order
/// before the combination function runs, so the result never depends on scheduling.
pub struct ParallelBlock {
    blocks: Vec<Block>,
    combine: Arc<CombineFn>,
    combine_shapes: Option<Arc<CombineShapesFn>>,
    manager: ResourceManager,
    pub(super) gate: InitGate,
}

impl ParallelBlock {
    pub const TYPE_NAME: &'static str = "ParallelBlock";

    pub fn new<F>(manager: &ResourceManager, blocks: Vec<Block>, combine: F) -> Self
    where
        F: Fn(Vec<TensorList>) -> Result<TensorList> + Send + Sync + 'static,
    {
        ParallelBlock {
            blocks,
            combine: Arc::new(combine),
            combine_shapes: None,
            manager: manager.clone(),
            gate: InitGate::default(),
        }
    }

    /// Parallel block whose output is every child's output list, concatenated in child order.
    pub fn concat(manager: &ResourceManager, blocks: Vec<Block>) -> Self {
        ParallelBlock::new(manager, blocks, |outputs| Ok(TensorList::concat(outputs)))
            .with_output_shapes(|shapes| Ok(shapes.into_iter().flatten().collect()))
    }

    /// Attaches the shape rule matching this block's combine function.
    pub fn with_output_shapes<F>(mut self, combine_shapes: F) -> Self
    where
        F: Fn(Vec<Vec<Shape>>) -> Result<Vec<Shape>> + Send + Sync + 'static,
    {
        self.combine_shapes = Some(Arc::new(combine_shapes));
        self
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    pub(super) fn output_shapes(&self, inputs: &[Shape]) -> Result<Vec<Shape>> {
        let combine_shapes = self.combine_shapes.as_ref().ok_or_else(|| {
            NnError::unsupported("ParallelBlock combine function has no shape rule")
        })?;
        let per_child = self
            .blocks
            .iter()
            .map(|block| block.output_shapes(inputs))
            .collect::<Result<Vec<_>>>()?;
        combine_shapes(per_child)
    }

    pub(super) fn forward(&self, inputs: &TensorList, params: &ParamBag) -> Result<TensorList> {
        let run = |block: &Block| -> Result<TensorList> {
            block.ensure_initialized(inputs)?;
            block.forward(inputs, params)
        };
        let outputs = if self.blocks.len() > 1 {
            self.blocks.par_iter().map(run).collect::<Result<Vec<_>>>()?
        } else {
            self.blocks.iter().map(run).collect::<Result<Vec<_>>>()?
        };
        (self.combine)(outputs)
    }
}
