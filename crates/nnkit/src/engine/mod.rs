//! Backend engine contract and plugin discovery.
//!
//! An engine crate implements [`Engine`] and registers a provider in [`ENGINE_PROVIDERS`]:
//!
//! ```ignore
//! #[nnkit::linkme::distributed_slice(nnkit::engine::ENGINE_PROVIDERS)]
//! #[linkme(crate = nnkit::linkme)]
//! static PROVIDE_MY_ENGINE: nnkit::engine::EngineProviderFn = my_engine;
//! ```
//!
//! The process-wide registry in [`registry`] collects every linked provider on first use.

pub mod registry;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use registry::{
    active_engine, discover_engines, engine_by_name, registered_engines, reset_engine_registry,
    EngineRegistry,
};

use crate::context::Context;
use crate::error::Result;
use crate::manager::ResourceManager;
use crate::model::Model;
use crate::training::{GradientCollector, Optimizer, ParameterStore};

/// Backend-defined options for [`Engine::load_model`], passed through untouched.
pub type LoadOptions = BTreeMap<String, String>;

/// Constructor registered by engine crates.
pub type EngineProviderFn = fn() -> Arc<dyn Engine>;

/// Every engine provider linked into the binary, in link order.
#[linkme::distributed_slice]
pub static ENGINE_PROVIDERS: [EngineProviderFn] = [..];

/// Source of one engine instance.
pub trait EngineProvider {
    fn engine(&self) -> Arc<dyn Engine>;
}

impl<F> EngineProvider for F
where
    F: Fn() -> Arc<dyn Engine>,
{
    fn engine(&self) -> Arc<dyn Engine> {
        self()
    }
}

/// Device memory counters in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub init: u64,
    pub used: u64,
    pub committed: u64,
    pub max: u64,
}

/// Factory surface of a numeric backend.
///
/// Engines are shared process-wide as `Arc<dyn Engine>`; every method takes `&self`.
pub trait Engine: Send + Sync {
    /// Unique name used for lookup (e.g. `"ref-cpu"`).
    fn engine_name(&self) -> &str;

    fn version(&self) -> &str;

    fn accelerator_count(&self) -> u32;

    /// Memory counters for an accelerator context.
    ///
    /// Fails with `InvalidArgument` when `context` is not an accelerator and with
    /// `UnsupportedOperation` when the backend cannot report memory.
    fn accelerator_memory_usage(&self, context: &Context) -> Result<MemoryUsage>;

    /// First accelerator when the backend has one, otherwise the CPU.
    fn default_context(&self) -> Context {
        if self.accelerator_count() > 0 {
            Context::gpu(0)
        } else {
            Context::cpu()
        }
    }

    /// Empty model bound to `context`.
    fn new_model(&self, context: &Context) -> Model;

    /// Model named `name` whose parameters come from the artifact under `path`.
    fn load_model(
        &self,
        path: &Path,
        name: &str,
        context: &Context,
        options: &LoadOptions,
    ) -> Result<Model>;

    fn new_resource_manager(&self) -> ResourceManager {
        self.new_resource_manager_on(&self.default_context())
    }

    fn new_resource_manager_on(&self, context: &Context) -> ResourceManager;

    fn new_gradient_collector(&self) -> Box<dyn GradientCollector>;

    fn new_parameter_store(
        &self,
        optimizer: Arc<dyn Optimizer>,
        aggregate_on_accelerator: bool,
    ) -> Box<dyn ParameterStore>;
}

impl std::fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.engine_name())
            .field("version", &self.version())
            .finish()
    }
}
