use std::path::Path;
use std::sync::Arc;

use nnkit::engine::{LoadOptions, MemoryUsage};
use nnkit::training::{GradientCollector, Optimizer, ParameterStore};
use nnkit::{Context, Engine, Model, NnError, ResourceManager, Result};
use tracing::debug;

use crate::config::RefCpuConfig;
use crate::training::{RecordingCollector, RecordingParameterStore};

pub const ENGINE_NAME: &str = "ref-cpu";

/// Option key selecting a numbered checkpoint in [`Engine::load_model`].
pub const EPOCH_OPTION: &str = "epoch";

/// Host-only engine. Simulated accelerators only affect the reported device count.
#[derive(Debug, Clone, Default)]
pub struct RefCpuEngine {
    config: RefCpuConfig,
}

impl RefCpuEngine {
    pub fn new(config: RefCpuConfig) -> Self {
        RefCpuEngine { config }
    }

    pub fn config(&self) -> RefCpuConfig {
        self.config
    }

    fn parse_epoch(options: &LoadOptions) -> Result<Option<u32>> {
        if let Some(key) = options.keys().find(|key| key.as_str() != EPOCH_OPTION) {
            return Err(NnError::invalid_argument(format!(
                "{ENGINE_NAME} does not recognize load option '{key}'"
            )));
        }
        options
            .get(EPOCH_OPTION)
            .map(|value| {
                value.trim().parse::<u32>().map_err(|_| {
                    NnError::invalid_argument(format!("epoch must be a number, got '{value}'"))
                })
            })
            .transpose()
    }
}

impl Engine for RefCpuEngine {
    fn engine_name(&self) -> &str {
        ENGINE_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn accelerator_count(&self) -> u32 {
        self.config.accelerators
    }

    fn accelerator_memory_usage(&self, context: &Context) -> Result<MemoryUsage> {
        if !context.is_accelerator() || context.id() >= self.config.accelerators {
            return Err(NnError::invalid_argument(format!(
                "{context} is not an accelerator of {ENGINE_NAME}"
            )));
        }
        Err(NnError::unsupported(format!(
            "{ENGINE_NAME} cannot report memory for {context}"
        )))
    }

    fn new_model(&self, context: &Context) -> Model {
        Model::new("model", *context, self.new_resource_manager_on(context))
    }

    fn load_model(
        &self,
        path: &Path,
        name: &str,
        context: &Context,
        options: &LoadOptions,
    ) -> Result<Model> {
        let epoch = Self::parse_epoch(options)?;
        let artifact = Model::artifact_path(path, name, epoch);
        debug!(model = name, artifact = %artifact.display(), %context, "loading model");
        Model::from_artifact(name, *context, self.new_resource_manager_on(context), &artifact)
    }

    fn new_resource_manager_on(&self, context: &Context) -> ResourceManager {
        ResourceManager::new_root(ENGINE_NAME, *context)
    }

    fn new_gradient_collector(&self) -> Box<dyn GradientCollector> {
        Box::new(RecordingCollector::default())
    }

    fn new_parameter_store(
        &self,
        optimizer: Arc<dyn Optimizer>,
        aggregate_on_accelerator: bool,
    ) -> Box<dyn ParameterStore> {
        Box::new(RecordingParameterStore::new(
            optimizer,
            aggregate_on_accelerator,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> LoadOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn epoch_option_is_parsed() {
        assert_eq!(RefCpuEngine::parse_epoch(&options(&[])).unwrap(), None);
        assert_eq!(
            RefCpuEngine::parse_epoch(&options(&[("epoch", "12")])).unwrap(),
            Some(12)
        );
        assert!(RefCpuEngine::parse_epoch(&options(&[("epoch", "last")]))
            .unwrap_err()
            .is_invalid_argument());
        assert!(RefCpuEngine::parse_epoch(&options(&[("flavor", "x")]))
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn simulated_accelerators_drive_default_context() {
        let engine = RefCpuEngine::new(RefCpuConfig { accelerators: 2 });
        assert_eq!(engine.default_context(), Context::gpu(0));
        assert_eq!(engine.new_resource_manager().context(), Context::gpu(0));
        assert!(engine
            .accelerator_memory_usage(&Context::gpu(1))
            .unwrap_err()
            .is_unsupported());
        assert!(engine
            .accelerator_memory_usage(&Context::gpu(2))
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn cpu_only_engine_rejects_memory_queries() {
        let engine = RefCpuEngine::default();
        assert_eq!(engine.default_context(), Context::cpu());
        assert!(engine
            .accelerator_memory_usage(&Context::cpu())
            .unwrap_err()
            .is_invalid_argument());
    }
}
