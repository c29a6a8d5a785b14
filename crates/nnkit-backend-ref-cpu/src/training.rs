//! Stand-ins for the training collaborators. The reference engine has no autograd, so these
//! only record what they are handed.

use std::sync::Arc;

use nnkit::parameter::ParameterList;
use nnkit::training::{GradientCollector, Optimizer, ParameterStore};
use nnkit::{NnError, Result, Shape, Tensor};

#[derive(Debug, Default)]
pub struct RecordingCollector {
    targets: Vec<Shape>,
}

impl RecordingCollector {
    /// Shapes of every tensor passed to `backward`.
    pub fn targets(&self) -> &[Shape] {
        &self.targets
    }
}

impl GradientCollector for RecordingCollector {
    fn backward(&mut self, target: &Tensor) -> Result<()> {
        self.targets.push(target.shape().clone());
        Err(NnError::unsupported("ref-cpu does not compute gradients"))
    }
}

#[derive(Debug)]
pub struct RecordingParameterStore {
    optimizer: Arc<dyn Optimizer>,
    aggregate_on_accelerator: bool,
    parameters: Vec<String>,
}

impl RecordingParameterStore {
    pub fn new(optimizer: Arc<dyn Optimizer>, aggregate_on_accelerator: bool) -> Self {
        RecordingParameterStore {
            optimizer,
            aggregate_on_accelerator,
            parameters: Vec::new(),
        }
    }

    pub fn optimizer(&self) -> &Arc<dyn Optimizer> {
        &self.optimizer
    }

    pub fn aggregate_on_accelerator(&self) -> bool {
        self.aggregate_on_accelerator
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameters
    }
}

impl ParameterStore for RecordingParameterStore {
    fn init(&mut self, parameters: &ParameterList) -> Result<()> {
        self.parameters = parameters.names().into_iter().map(String::from).collect();
        Ok(())
    }

    fn update_all(&mut self) -> Result<()> {
        Err(NnError::unsupported(format!(
            "ref-cpu cannot apply {} updates",
            self.optimizer.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use nnkit::block::Linear;
    use nnkit::{Context, ResourceManager};

    use super::*;

    #[derive(Debug)]
    struct Sgd;

    impl Optimizer for Sgd {
        fn name(&self) -> &str {
            "sgd"
        }
    }

    #[test]
    fn store_records_parameters_and_refuses_updates() {
        let manager = ResourceManager::new_root("ref-cpu", Context::cpu());
        let block = Linear::new(2).build(&manager).unwrap();
        let mut store = RecordingParameterStore::new(Arc::new(Sgd), true);
        store.init(&block.parameters()).unwrap();
        assert_eq!(store.parameter_names(), ["weight", "bias"]);
        assert!(store.aggregate_on_accelerator());
        assert_eq!(store.optimizer().name(), "sgd");
        assert!(store.update_all().unwrap_err().is_unsupported());
    }

    #[test]
    fn collector_records_targets() {
        let mut collector = RecordingCollector::default();
        let loss = Tensor::full([1], 0.5);
        assert!(collector.backward(&loss).unwrap_err().is_unsupported());
        assert_eq!(collector.targets(), [Shape::new([1])]);
    }
}
