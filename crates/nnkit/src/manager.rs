//! Hierarchical arenas owning every tensor allocated for a graph.
//!
//! A [`ResourceManager`] is a cloneable handle to an arena. Tensors created through it are
//! addressed by [`TensorHandle`]s, which hold only a weak reference plus a slot index, so the
//! arena stays the sole owner of the storage. Closing a manager frees its slots and then
//! closes every child manager it spawned; the transition happens exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::debug;

use crate::context::Context;
use crate::error::{NnError, Result};
use crate::tensor::{DType, Shape, Tensor};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

struct Arena {
    slots: Vec<Option<Tensor>>,
    children: Vec<ResourceManager>,
}

struct ManagerInner {
    id: u64,
    engine: String,
    context: Context,
    closed: AtomicBool,
    arena: Mutex<Arena>,
}

#[derive(Clone)]
pub struct ResourceManager {
    inner: Arc<ManagerInner>,
}

/// Non-owning reference to a tensor slot in a manager's arena.
#[derive(Clone)]
pub struct TensorHandle {
    manager: Weak<ManagerInner>,
    manager_id: u64,
    slot: usize,
}

impl ResourceManager {
    /// Creates a top-level manager. Engines call this from `new_resource_manager`.
    pub fn new_root(engine: impl Into<String>, context: Context) -> Self {
        ResourceManager {
            inner: Arc::new(ManagerInner {
                id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
                engine: engine.into(),
                context,
                closed: AtomicBool::new(false),
                arena: Mutex::new(Arena {
                    slots: Vec::new(),
                    children: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Name of the engine that created the root of this manager tree.
    pub fn engine_name(&self) -> &str {
        &self.inner.engine
    }

    pub fn context(&self) -> Context {
        self.inner.context
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Spawns a child manager on the same context. The child closes with its parent.
    pub fn new_sub_manager(&self) -> Result<ResourceManager> {
        self.new_sub_manager_on(self.inner.context)
    }

    pub fn new_sub_manager_on(&self, context: Context) -> Result<ResourceManager> {
        let mut arena = self.lock_open("spawn child manager")?;
        arena.children.retain(|child| !child.is_closed());
        let child = ResourceManager::new_root(self.inner.engine.clone(), context);
        arena.children.push(child.clone());
        Ok(child)
    }

    /// Allocates a zero-filled tensor owned by this manager.
    pub fn create_tensor(&self, shape: impl Into<Shape>, dtype: DType) -> Result<TensorHandle> {
        self.attach(Tensor::zeros(shape, dtype))
    }

    /// Moves `tensor` into this manager's arena.
    pub fn attach(&self, tensor: Tensor) -> Result<TensorHandle> {
        let mut arena = self.lock_open("allocate tensor")?;
        arena.slots.push(Some(tensor));
        Ok(TensorHandle {
            manager: Arc::downgrade(&self.inner),
            manager_id: self.inner.id,
            slot: arena.slots.len() - 1,
        })
    }

    /// Number of live tensors owned directly by this manager.
    pub fn resource_count(&self) -> usize {
        let arena = self
            .inner
            .arena
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        arena.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Releases every owned tensor and recursively closes child managers.
    /// Calling `close` again is a no-op.
    pub fn close(&self) {
        self.inner.close();
    }

    fn lock_open(&self, action: &str) -> Result<MutexGuard<'_, Arena>> {
        self.inner.lock_open(action)
    }
}

impl ManagerInner {
    fn lock_open(&self, action: &str) -> Result<MutexGuard<'_, Arena>> {
        let guard = self
            .arena
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.closed.load(Ordering::Acquire) {
            return Err(NnError::closed(format!(
                "cannot {action}: manager {} is closed",
                self.id
            )));
        }
        Ok(guard)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let children = {
            let mut arena = self
                .arena
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            arena.slots.clear();
            std::mem::take(&mut arena.children)
        };
        debug!(
            manager = self.id,
            children = children.len(),
            "closing resource manager"
        );
        for child in children {
            child.close();
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("id", &self.inner.id)
            .field("engine", &self.inner.engine)
            .field("context", &self.inner.context)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TensorHandle {
    /// Returns a copy of the referenced tensor.
    pub fn read(&self) -> Result<Tensor> {
        self.with_slot(|slot| Ok(slot.clone()))
    }

    /// Replaces the referenced tensor in place.
    pub fn write(&self, tensor: Tensor) -> Result<()> {
        self.with_slot(|slot| {
            *slot = tensor;
            Ok(())
        })
    }

    pub fn manager_id(&self) -> u64 {
        self.manager_id
    }

    fn with_slot<T>(&self, f: impl FnOnce(&mut Tensor) -> Result<T>) -> Result<T> {
        let inner = self.manager.upgrade().ok_or_else(|| {
            NnError::closed(format!("manager {} was dropped", self.manager_id))
        })?;
        let mut arena = inner.lock_open("access tensor")?;
        let slot = arena
            .slots
            .get_mut(self.slot)
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                NnError::closed(format!(
                    "tensor slot {} of manager {} was released",
                    self.slot, self.manager_id
                ))
            })?;
        f(slot)
    }
}

impl std::fmt::Debug for TensorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorHandle")
            .field("manager", &self.manager_id)
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ResourceManager {
        ResourceManager::new_root("test", Context::cpu())
    }

    #[test]
    fn handles_read_back_what_was_written() {
        let m = manager();
        let h = m.create_tensor([2], DType::F32).unwrap();
        assert_eq!(h.read().unwrap().to_f32_vec().unwrap(), vec![0.0, 0.0]);
        h.write(Tensor::from_vec([2], vec![1.0, 2.0]).unwrap())
            .unwrap();
        assert_eq!(h.read().unwrap().to_f32_vec().unwrap(), vec![1.0, 2.0]);
        assert_eq!(m.resource_count(), 1);
    }

    #[test]
    fn close_releases_children_recursively() {
        let root = manager();
        let child = root.new_sub_manager().unwrap();
        let grandchild = child.new_sub_manager().unwrap();
        let h = grandchild.create_tensor([1], DType::F32).unwrap();

        root.close();
        assert!(child.is_closed());
        assert!(grandchild.is_closed());
        assert!(matches!(h.read(), Err(NnError::Closed(_))));
        assert_eq!(grandchild.resource_count(), 0);
    }

    #[test]
    fn close_is_idempotent_and_blocks_allocation() {
        let m = manager();
        m.close();
        m.close();
        assert!(matches!(
            m.create_tensor([1], DType::F32),
            Err(NnError::Closed(_))
        ));
        assert!(matches!(m.new_sub_manager(), Err(NnError::Closed(_))));
    }

    #[test]
    fn closing_child_leaves_parent_open() {
        let root = manager();
        let child = root.new_sub_manager().unwrap();
        let kept = root.create_tensor([1], DType::F32).unwrap();
        child.close();
        assert!(!root.is_closed());
        assert!(kept.read().is_ok());
    }

    #[test]
    fn closed_children_are_not_retained() {
        let root = manager();
        for _ in 0..64 {
            root.new_sub_manager().unwrap().close();
        }
        let open = root.new_sub_manager().unwrap();
        let children = root.inner.arena.lock().unwrap().children.len();
        assert!(children <= 2, "parent still tracks {children} children");
        root.close();
        assert!(open.is_closed());
    }

    #[test]
    fn dropping_last_handle_invalidates_tensors() {
        let h = {
            let m = manager();
            m.create_tensor([1], DType::F32).unwrap()
        };
        assert!(matches!(h.read(), Err(NnError::Closed(_))));
    }
}
