//! Named, lazily-shaped learnable tensors.
//!
//! A parameter is created without a shape when its block is built. The first forward pass
//! fixes the shape and materializes storage in the block's resource manager; after that the
//! parameter only holds a [`TensorHandle`] into the arena.

use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::error::{NnError, Result};
use crate::initializer::{ConstantInit, Initializer, XavierInit};
use crate::manager::{ResourceManager, TensorHandle};
use crate::stream;
use crate::tensor::{DType, Shape, Tensor};

/// Role of a parameter inside its block; decides the fallback initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Weight,
    Bias,
    Gamma,
    Beta,
    Other,
}

impl ParameterKind {
    pub fn default_initializer(self) -> Arc<dyn Initializer> {
        match self {
            ParameterKind::Weight | ParameterKind::Other => Arc::new(XavierInit::new()),
            ParameterKind::Bias | ParameterKind::Beta => Arc::new(ConstantInit::zeros()),
            ParameterKind::Gamma => Arc::new(ConstantInit::ones()),
        }
    }
}

#[derive(Default)]
struct ParamState {
    shape: Option<Shape>,
    storage: Option<TensorHandle>,
    initializer: Option<Arc<dyn Initializer>>,
}

pub struct Parameter {
    name: String,
    kind: ParameterKind,
    dtype: DType,
    state: RwLock<ParamState>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Parameter::with_dtype(name, kind, DType::F32)
    }

    pub fn with_dtype(name: impl Into<String>, kind: ParameterKind, dtype: DType) -> Self {
        Parameter {
            name: name.into(),
            kind,
            dtype,
            state: RwLock::new(ParamState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Shape fixed at initialization (or by a load); `None` before that.
    pub fn shape(&self) -> Option<Shape> {
        self.read_state().shape.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.read_state().storage.is_some()
    }

    /// The explicitly assigned initializer, if any. `None` means the kind's fallback applies.
    pub fn initializer(&self) -> Option<Arc<dyn Initializer>> {
        self.read_state().initializer.clone()
    }

    /// Assigns `initializer` unless one is already set and `overwrite` is false.
    pub fn set_initializer(&self, initializer: Arc<dyn Initializer>, overwrite: bool) {
        let mut state = self.write_state();
        if overwrite || state.initializer.is_none() {
            state.initializer = Some(initializer);
        }
    }

    /// Materializes storage of `shape` in `manager`.
    ///
    /// An initialized parameter is left untouched unless `force` is set. The initializer is
    /// the assigned one, then `fallback`, then the kind's default.
    pub fn initialize(
        &self,
        manager: &ResourceManager,
        shape: Shape,
        fallback: Option<&Arc<dyn Initializer>>,
        force: bool,
    ) -> Result<()> {
        let mut state = self.write_state();
        if state.storage.is_some() && !force {
            return Ok(());
        }
        let initializer = state
            .initializer
            .clone()
            .or_else(|| fallback.cloned())
            .unwrap_or_else(|| self.kind.default_initializer());
        let value = initializer.initialize(&shape, self.dtype)?;
        trace!(parameter = %self.name, shape = %shape, ?initializer, "initializing parameter");
        match state.storage.clone() {
            Some(handle) => handle.write(value)?,
            None => state.storage = Some(manager.attach(value)?),
        }
        state.shape = Some(shape);
        Ok(())
    }

    /// Returns a copy of the current value.
    pub fn array(&self) -> Result<Tensor> {
        let state = self.read_state();
        match &state.storage {
            Some(handle) => handle.read(),
            None => Err(NnError::invalid_argument(format!(
                "parameter '{}' is not initialized",
                self.name
            ))),
        }
    }

    /// Replaces the value, allocating storage in `manager` when the parameter has none yet.
    pub fn set_array(&self, manager: &ResourceManager, value: Tensor) -> Result<()> {
        self.check_compatible(&value)?;
        let mut state = self.write_state();
        state.shape = Some(value.shape().clone());
        match state.storage.clone() {
            Some(handle) => handle.write(value),
            None => {
                state.storage = Some(manager.attach(value)?);
                Ok(())
            }
        }
    }

    /// Writes this parameter's encoded value to `w`.
    pub fn save(&self, w: &mut dyn Write) -> Result<()> {
        let value = self.array()?;
        stream::write_u8(w, stream::FORMAT_VERSION)?;
        stream::write_str(w, &self.name)?;
        stream::write_u32(w, value.dtype().tag())?;
        let dims = value.shape().dims();
        stream::write_u32(w, dims.len() as u32)?;
        for &dim in dims {
            stream::write_u64(w, dim as u64)?;
        }
        stream::write_u64(w, value.as_bytes().len() as u64)?;
        stream::write_bytes(w, value.as_bytes())
    }

    /// Decodes one encoded value meant for this parameter without applying it.
    pub fn decode(&self, r: &mut dyn Read) -> Result<Tensor> {
        self.decode_inner(r).map_err(|err| err.within(&self.name))
    }

    fn decode_inner(&self, r: &mut dyn Read) -> Result<Tensor> {
        stream::read_version(r)?;
        let name = stream::read_str(r)?;
        if name != self.name {
            return Err(NnError::invalid_argument(format!(
                "expected parameter '{}', stream holds '{}'",
                self.name, name
            )));
        }
        let tag = stream::read_u32(r)?;
        let dtype = DType::from_tag(tag).ok_or_else(|| {
            NnError::invalid_argument(format!("unknown dtype tag {tag} for '{}'", self.name))
        })?;
        let rank = stream::read_u32(r)? as usize;
        let mut dims = Vec::with_capacity(rank.min(16));
        for _ in 0..rank {
            let dim = stream::read_u64(r)?;
            dims.push(usize::try_from(dim).map_err(|_| {
                NnError::invalid_argument(format!("dimension {dim} of '{}' overflows", self.name))
            })?);
        }
        let shape = Shape::new(dims);
        let len = stream::read_u64(r)?;
        let expected = shape
            .dims()
            .iter()
            .try_fold(dtype.size_in_bytes(), |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                NnError::invalid_argument(format!("shape {shape} of '{}' overflows", self.name))
            })?;
        if len != expected as u64 {
            return Err(NnError::invalid_argument(format!(
                "parameter '{}' declares {len} bytes, shape {shape} of {dtype:?} needs {expected}",
                self.name
            )));
        }
        let bytes = stream::read_bytes(r, expected)?;
        let value = Tensor::from_bytes(shape, dtype, bytes)?;
        self.check_compatible(&value)?;
        Ok(value)
    }

    fn check_compatible(&self, value: &Tensor) -> Result<()> {
        if value.dtype() != self.dtype {
            return Err(NnError::invalid_argument(format!(
                "parameter '{}' has dtype {:?}, value has {:?}",
                self.name,
                self.dtype,
                value.dtype()
            )));
        }
        if let Some(shape) = &self.read_state().shape {
            if shape != value.shape() {
                return Err(NnError::invalid_argument(format!(
                    "parameter '{}' has shape {}, value has {}",
                    self.name,
                    shape,
                    value.shape()
                )));
            }
        }
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ParamState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ParamState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("dtype", &self.dtype)
            .field("shape", &state.shape)
            .field("initialized", &state.storage.is_some())
            .finish()
    }
}

/// Ordered `(name, parameter)` pairs; names are unique within one list.
#[derive(Debug, Clone, Default)]
pub struct ParameterList {
    entries: Vec<(String, Arc<Parameter>)>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, parameter: Arc<Parameter>) {
        self.entries.push((name.into(), parameter));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, Arc<Parameter>)> {
        self.entries.iter()
    }
}

impl IntoIterator for ParameterList {
    type Item = (String, Arc<Parameter>);
    type IntoIter = std::vec::IntoIter<(String, Arc<Parameter>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn manager() -> ResourceManager {
        ResourceManager::new_root("test", Context::cpu())
    }

    #[test]
    fn set_initializer_respects_overwrite() {
        let p = Parameter::new("w", ParameterKind::Weight);
        p.set_initializer(Arc::new(ConstantInit(1.0)), false);
        p.set_initializer(Arc::new(ConstantInit(2.0)), false);
        let m = manager();
        p.initialize(&m, Shape::new([1]), None, false).unwrap();
        assert_eq!(p.array().unwrap().to_f32_vec().unwrap(), vec![1.0]);

        p.set_initializer(Arc::new(ConstantInit(3.0)), true);
        p.initialize(&m, Shape::new([1]), None, true).unwrap();
        assert_eq!(p.array().unwrap().to_f32_vec().unwrap(), vec![3.0]);
    }

    #[test]
    fn second_initialize_is_a_noop() {
        let m = manager();
        let p = Parameter::new("b", ParameterKind::Bias);
        p.initialize(&m, Shape::new([2]), None, false).unwrap();
        let fallback: Arc<dyn Initializer> = Arc::new(ConstantInit(4.0));
        p.initialize(&m, Shape::new([5]), Some(&fallback), false)
            .unwrap();
        assert_eq!(p.shape(), Some(Shape::new([2])));
        assert_eq!(p.array().unwrap().to_f32_vec().unwrap(), vec![0.0, 0.0]);
        assert_eq!(m.resource_count(), 1);
    }

    #[test]
    fn uninitialized_array_is_invalid_argument() {
        let p = Parameter::new("w", ParameterKind::Weight);
        assert!(p.array().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn closed_manager_invalidates_value() {
        let m = manager();
        let p = Parameter::new("w", ParameterKind::Gamma);
        p.initialize(&m, Shape::new([1]), None, false).unwrap();
        m.close();
        assert!(matches!(p.array(), Err(NnError::Closed(_))));
    }

    #[test]
    fn decode_rejects_foreign_name() {
        let m = manager();
        let a = Parameter::new("weight", ParameterKind::Weight);
        a.initialize(&m, Shape::new([2]), None, false).unwrap();
        let mut bytes = Vec::new();
        a.save(&mut bytes).unwrap();

        let b = Parameter::new("bias", ParameterKind::Bias);
        let err = b.decode(&mut bytes.as_slice()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn decode_rejects_shape_mismatch() {
        let m = manager();
        let a = Parameter::new("w", ParameterKind::Weight);
        a.initialize(&m, Shape::new([2]), None, false).unwrap();
        let mut bytes = Vec::new();
        a.save(&mut bytes).unwrap();

        let b = Parameter::new("w", ParameterKind::Weight);
        b.initialize(&m, Shape::new([3]), None, false).unwrap();
        assert!(b.decode(&mut bytes.as_slice()).unwrap_err().is_invalid_argument());
    }
}
