//! Composable computation-graph nodes.
//!
//! A [`Block`] is one of a closed set of variants: a leaf that owns parameters and a
//! [`LeafKernel`], or a composite ([`ParallelBlock`], [`SequentialBlock`]) that owns child
//! blocks. Every variant shares the same capability surface: lazy initialization driven by
//! the first forward pass, recursive initializer overrides, deterministic parameter naming,
//! and a versioned parameter stream.
//!
//! Children are named `"{index:02}:{type name}"`, and a child's parameters appear in the
//! parent's [`ParameterList`] as `"{child name}_{parameter name}"`. That naming is the
//! persistence contract and must not change for a given graph shape.

mod lambda;
mod leaf;
mod linear;
mod parallel;
mod sequential;

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub use lambda::{Lambda, ShapeFn};
pub use leaf::{LeafBlock, LeafKernel, LeafParams};
pub use linear::Linear;
pub use parallel::{CombineFn, CombineShapesFn, ParallelBlock};
pub use sequential::SequentialBlock;

use crate::error::{NnError, Result};
use crate::initializer::Initializer;
use crate::manager::ResourceManager;
use crate::parameter::{Parameter, ParameterList};
use crate::stream;
use crate::tensor::{DType, Shape, TensorList};

/// Named extra arguments threaded through `forward` to every block in the tree.
pub type ParamBag = BTreeMap<String, serde_json::Value>;

/// Direct children paired with their deterministic names, in construction order.
pub type BlockList<'a> = Vec<(String, &'a Block)>;

/// Parameters decoded from a stream but not yet applied.
type Staged = Vec<(Arc<Parameter>, ResourceManager, crate::tensor::Tensor)>;

pub enum Block {
    Leaf(LeafBlock),
    Parallel(ParallelBlock),
    Sequential(SequentialBlock),
}

impl Block {
    /// Concrete type name used in child names (`Linear`, `ParallelBlock`, ...).
    pub fn type_name(&self) -> &str {
        match self {
            Block::Leaf(b) => b.type_name(),
            Block::Parallel(_) => ParallelBlock::TYPE_NAME,
            Block::Sequential(_) => SequentialBlock::TYPE_NAME,
        }
    }

    /// The resource manager this block was built with.
    pub fn manager(&self) -> &ResourceManager {
        match self {
            Block::Leaf(b) => b.manager(),
            Block::Parallel(b) => b.manager(),
            Block::Sequential(b) => b.manager(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.gate().is_open()
    }

    /// Runs the block on `inputs`, initializing it first if needed. `inputs` is not modified.
    pub fn forward(&self, inputs: &TensorList, params: &ParamBag) -> Result<TensorList> {
        self.ensure_initialized(inputs)?;
        match self {
            Block::Leaf(b) => b.forward(inputs, params),
            Block::Parallel(b) => b.forward(inputs, params),
            Block::Sequential(b) => b.forward(inputs, params),
        }
    }

    /// Shapes `forward` would produce for inputs of `input_shapes`, without initializing
    /// anything. Fails with `UnsupportedOperation` when some block in the tree has no shape
    /// rule.
    pub fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>> {
        match self {
            Block::Leaf(b) => b.output_shapes(input_shapes),
            Block::Parallel(b) => b.output_shapes(input_shapes),
            Block::Sequential(b) => b.output_shapes(input_shapes),
        }
    }

    pub fn forward_simple(&self, inputs: &TensorList) -> Result<TensorList> {
        self.forward(inputs, &ParamBag::new())
    }

    /// Infers shapes and materializes direct parameters once; later calls are no-ops.
    pub fn ensure_initialized(&self, inputs: &TensorList) -> Result<()> {
        self.ensure_initialized_with(inputs, None)
    }

    /// Like [`Block::ensure_initialized`], with `default` used for direct parameters that have
    /// no assigned initializer.
    pub fn ensure_initialized_with(
        &self,
        inputs: &TensorList,
        default: Option<&Arc<dyn Initializer>>,
    ) -> Result<()> {
        let shapes = inputs.shapes();
        self.gate().run(|| {
            self.before_initialize(&shapes)?;
            for parameter in self.direct_parameters() {
                let shape = self.parameter_shape(parameter.name(), &shapes)?;
                // Values loaded before the first forward must fit the inferred shape.
                if let Some(existing) = parameter.shape() {
                    if existing != shape {
                        return Err(NnError::invalid_argument(format!(
                            "{}: parameter '{}' has shape {existing}, inputs {:?} need {shape}",
                            self.type_name(),
                            parameter.name(),
                            shapes.iter().map(Shape::to_string).collect::<Vec<_>>()
                        )));
                    }
                }
                parameter.initialize(self.manager(), shape, default, false)?;
            }
            Ok(())
        })
    }

    fn before_initialize(&self, shapes: &[Shape]) -> Result<()> {
        match self {
            Block::Leaf(b) => b.before_initialize(shapes),
            // Children infer their own shapes when they first run.
            Block::Parallel(_) | Block::Sequential(_) => Ok(()),
        }
    }

    /// Parameters owned by this block itself, in declared order.
    pub fn direct_parameters(&self) -> &[Arc<Parameter>] {
        match self {
            Block::Leaf(b) => b.parameters(),
            Block::Parallel(_) | Block::Sequential(_) => &[],
        }
    }

    pub fn children(&self) -> BlockList<'_> {
        let blocks: &[Block] = match self {
            Block::Leaf(_) => &[],
            Block::Parallel(b) => b.blocks(),
            Block::Sequential(b) => b.blocks(),
        };
        blocks
            .iter()
            .enumerate()
            .map(|(i, block)| (format!("{:02}:{}", i, block.type_name()), block))
            .collect()
    }

    /// Direct parameters first, then each child's parameters prefixed with `"{child}_"`.
    pub fn parameters(&self) -> ParameterList {
        let mut list = ParameterList::new();
        for parameter in self.direct_parameters() {
            list.push(parameter.name(), Arc::clone(parameter));
        }
        for (child_name, child) in self.children() {
            for (name, parameter) in child.parameters() {
                list.push(format!("{child_name}_{name}"), parameter);
            }
        }
        list
    }

    /// Shape the named direct parameter takes for inputs of `input_shapes`.
    pub fn parameter_shape(&self, name: &str, input_shapes: &[Shape]) -> Result<Shape> {
        match self {
            Block::Leaf(b) => b.parameter_shape(name, input_shapes),
            Block::Parallel(_) | Block::Sequential(_) => Err(NnError::invalid_argument(format!(
                "{} has no parameters",
                self.type_name()
            ))),
        }
    }

    /// Assigns `initializer` to every parameter in this block and all descendants.
    pub fn set_initializer(&self, initializer: Arc<dyn Initializer>, overwrite: bool) {
        for parameter in self.direct_parameters() {
            parameter.set_initializer(Arc::clone(&initializer), overwrite);
        }
        for (_, child) in self.children() {
            child.set_initializer(Arc::clone(&initializer), overwrite);
        }
    }

    /// Assigns `initializer` to the direct parameter `name` only.
    pub fn set_initializer_for(
        &self,
        initializer: Arc<dyn Initializer>,
        name: &str,
        overwrite: bool,
    ) -> Result<()> {
        let parameter = self
            .direct_parameters()
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| {
                NnError::invalid_argument(format!("could not find parameter {name}"))
            })?;
        parameter.set_initializer(initializer, overwrite);
        Ok(())
    }

    /// Converts every parameter to `dtype`. No built-in variant supports this.
    pub fn cast(&self, dtype: DType) -> Result<()> {
        Err(NnError::unsupported(format!(
            "{} cannot cast parameters to {dtype:?}",
            self.type_name()
        )))
    }

    /// Gradient computation belongs to the engine's gradient collector.
    pub fn backward(&self) {}

    /// Writes `[version][payload]` for this block and, recursively, its children.
    pub fn save_parameters(&self, w: &mut dyn Write) -> Result<()> {
        stream::write_u8(w, stream::FORMAT_VERSION)?;
        for parameter in self.direct_parameters() {
            parameter.save(w)?;
        }
        for (child_name, child) in self.children() {
            child
                .save_parameters(w)
                .map_err(|err| err.within(&child_name))?;
        }
        Ok(())
    }

    /// Reads a stream produced by [`Block::save_parameters`] on a tree of the same shape.
    ///
    /// The whole stream is decoded before anything is applied, so a failed load leaves every
    /// parameter as it was.
    pub fn load_parameters(&self, r: &mut dyn Read) -> Result<()> {
        let mut staged = Staged::new();
        self.stage_load(r, &mut staged)?;
        for (parameter, manager, value) in staged {
            parameter.set_array(&manager, value)?;
        }
        Ok(())
    }

    fn stage_load(&self, r: &mut dyn Read, staged: &mut Staged) -> Result<()> {
        stream::read_version(r)?;
        for parameter in self.direct_parameters() {
            let value = parameter.decode(r)?;
            staged.push((Arc::clone(parameter), self.manager().clone(), value));
        }
        for (child_name, child) in self.children() {
            child
                .stage_load(r, staged)
                .map_err(|err| err.within(&child_name))?;
        }
        Ok(())
    }

    fn gate(&self) -> &InitGate {
        match self {
            Block::Leaf(b) => &b.gate,
            Block::Parallel(b) => &b.gate,
            Block::Sequential(b) => &b.gate,
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct(self.type_name());
        s.field("initialized", &self.is_initialized());
        for parameter in self.direct_parameters() {
            s.field(parameter.name(), &parameter.shape());
        }
        for (name, child) in self.children() {
            s.field(&name, child);
        }
        s.finish()
    }
}

impl From<LeafBlock> for Block {
    fn from(block: LeafBlock) -> Self {
        Block::Leaf(block)
    }
}

impl From<ParallelBlock> for Block {
    fn from(block: ParallelBlock) -> Self {
        Block::Parallel(block)
    }
}

impl From<SequentialBlock> for Block {
    fn from(block: SequentialBlock) -> Self {
        Block::Sequential(block)
    }
}

/// One-shot initialization barrier.
///
/// The flag is published only after the initializer closure succeeds; racing callers wait
/// on the mutex and then observe the flag, so the closure body runs at most once successfully.
#[derive(Default)]
pub(crate) struct InitGate {
    open: AtomicBool,
    lock: Mutex<()>,
}

impl InitGate {
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn run(&self, init: impl FnOnce() -> Result<()>) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.is_open() {
            return Ok(());
        }
        init()?;
        self.open.store(true, Ordering::Release);
        Ok(())
    }
}
