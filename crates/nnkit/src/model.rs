//! A named root block bound to a context and resource manager.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::block::{Block, ParamBag};
use crate::context::Context;
use crate::error::{NnError, Result};
use crate::manager::ResourceManager;
use crate::stream;
use crate::tensor::TensorList;

/// Extension of parameter artifacts written by [`Model::save_parameters`].
pub const PARAMS_EXTENSION: &str = "params";

pub struct Model {
    name: String,
    context: Context,
    manager: ResourceManager,
    block: Option<Block>,
    pending: Option<Vec<u8>>,
}

impl Model {
    pub fn new(name: impl Into<String>, context: Context, manager: ResourceManager) -> Self {
        Model {
            name: name.into(),
            context,
            manager,
            block: None,
            pending: None,
        }
    }

    /// Model whose parameters come from the artifact at `path`.
    ///
    /// The stream is read now and applied when [`Model::set_block`] supplies the tree.
    pub fn from_artifact(
        name: impl Into<String>,
        context: Context,
        manager: ResourceManager,
        path: &Path,
    ) -> Result<Self> {
        let bytes = fs::read(path).map_err(|err| NnError::io(path.display().to_string(), err))?;
        if let Some(&version) = bytes.first() {
            if version != stream::FORMAT_VERSION {
                return Err(NnError::invalid_argument(format!(
                    "{}: unsupported encoding version: {version}",
                    path.display()
                )));
            }
        }
        let mut model = Model::new(name, context, manager);
        debug!(model = %model.name, path = %path.display(), bytes = bytes.len(), "loaded parameter artifact");
        model.pending = Some(bytes);
        Ok(model)
    }

    /// `<dir>/<name>.params`, or `<dir>/<name>-<epoch:04>.params` for a checkpoint.
    pub fn artifact_path(dir: &Path, name: &str, epoch: Option<u32>) -> PathBuf {
        match epoch {
            Some(epoch) => dir.join(format!("{name}-{epoch:04}.{PARAMS_EXTENSION}")),
            None => dir.join(format!("{name}.{PARAMS_EXTENSION}")),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> Context {
        self.context
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    pub fn block(&self) -> Option<&Block> {
        self.block.as_ref()
    }

    /// True while a loaded artifact is waiting for a block to apply to.
    pub fn has_pending_parameters(&self) -> bool {
        self.pending.is_some()
    }

    /// Installs the root block, applying any pending artifact to it.
    ///
    /// On a failed load the block stays installed with its own values and the artifact
    /// stays pending.
    pub fn set_block(&mut self, block: Block) -> Result<()> {
        let block = self.block.insert(block);
        if let Some(bytes) = self.pending.take() {
            if let Err(err) = block.load_parameters(&mut bytes.as_slice()) {
                self.pending = Some(bytes);
                return Err(err);
            }
            debug!(model = %self.name, "applied pending parameters");
        }
        Ok(())
    }

    pub fn forward(&self, inputs: &TensorList, params: &ParamBag) -> Result<TensorList> {
        self.root()?.forward(inputs, params)
    }

    /// Writes the root block's parameter stream to `<dir>/<name>.params`.
    pub fn save_parameters(&self, dir: &Path) -> Result<PathBuf> {
        let block = self.root()?;
        let path = Model::artifact_path(dir, &self.name, None);
        let file_path = path.display().to_string();
        let file = File::create(&path).map_err(|err| NnError::io(&file_path, err))?;
        let mut writer = BufWriter::new(file);
        block
            .save_parameters(&mut writer)
            .map_err(|err| err.within(&file_path))?;
        writer.flush().map_err(|err| NnError::io(&file_path, err))?;
        debug!(model = %self.name, path = %file_path, "saved parameters");
        Ok(path)
    }

    /// Replaces the root block's parameters with a stream from `reader`.
    pub fn load_parameters_from(&mut self, reader: &mut dyn Read) -> Result<()> {
        self.root()?.load_parameters(reader)
    }

    fn root(&self) -> Result<&Block> {
        self.block.as_ref().ok_or_else(|| {
            NnError::invalid_argument(format!("model '{}' has no block", self.name))
        })
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("block", &self.block)
            .field("pending", &self.pending.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Lambda, Linear, SequentialBlock};
    use crate::tensor::Tensor;

    fn model(name: &str) -> Model {
        let manager = ResourceManager::new_root("test", Context::cpu());
        Model::new(name, Context::cpu(), manager)
    }

    fn mlp(manager: &ResourceManager) -> Block {
        SequentialBlock::new(manager)
            .add(Linear::new(4).build(manager).unwrap())
            .add(Lambda::relu().build(manager).unwrap())
            .add(Linear::new(1).build(manager).unwrap())
            .into()
    }

    fn input() -> TensorList {
        TensorList::single(Tensor::from_vec([2, 3], vec![0.5, -1.0, 2.0, 1.5, 0.0, -0.5]).unwrap())
    }

    #[test]
    fn artifact_paths() {
        let dir = Path::new("/models");
        assert_eq!(
            Model::artifact_path(dir, "mlp", None),
            Path::new("/models/mlp.params")
        );
        assert_eq!(
            Model::artifact_path(dir, "mlp", Some(7)),
            Path::new("/models/mlp-0007.params")
        );
    }

    #[test]
    fn operations_without_block_fail() {
        let mut m = model("empty");
        assert!(m.forward(&input(), &ParamBag::new()).unwrap_err().is_invalid_argument());
        assert!(m
            .load_parameters_from(&mut [1u8].as_slice())
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn save_then_from_artifact_restores_outputs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = model("mlp");
        let block = mlp(source.manager());
        source.set_block(block)?;
        let expected = source.forward(&input(), &ParamBag::new())?;
        let path = source.save_parameters(dir.path())?;
        assert_eq!(path, dir.path().join("mlp.params"));

        let manager = ResourceManager::new_root("test", Context::cpu());
        let mut restored = Model::from_artifact("mlp", Context::cpu(), manager, &path)?;
        assert!(restored.has_pending_parameters());
        let block = mlp(restored.manager());
        restored.set_block(block)?;
        assert!(!restored.has_pending_parameters());
        assert_eq!(restored.forward(&input(), &ParamBag::new())?, expected);
        Ok(())
    }

    #[test]
    fn mismatched_block_keeps_artifact_pending() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = model("mlp");
        let block = mlp(source.manager());
        source.set_block(block)?;
        source.forward(&input(), &ParamBag::new())?;
        let path = source.save_parameters(dir.path())?;

        let manager = ResourceManager::new_root("test", Context::cpu());
        let mut restored = Model::from_artifact("mlp", Context::cpu(), manager, &path)?;
        let wrong = Linear::new(2).build(restored.manager())?;
        assert!(restored.set_block(wrong).is_err());
        assert!(restored.has_pending_parameters());
        Ok(())
    }

    #[test]
    fn missing_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ResourceManager::new_root("test", Context::cpu());
        let err = Model::from_artifact("mlp", Context::cpu(), manager, &dir.path().join("nope.params"))
            .unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("nope.params"));
    }
}
