//! Reference host engine.
//!
//! Linking this crate registers the `"ref-cpu"` engine with nnkit's discovery. A binary that
//! never names the crate should still pull it in:
//!
//! ```ignore
//! use nnkit_backend_ref_cpu as _;
//! ```

mod config;
mod engine;
mod training;

use std::sync::{Arc, OnceLock};

use nnkit::engine::EngineProviderFn;
use nnkit::Engine;

pub use config::{RefCpuConfig, ACCELERATORS_VAR};
pub use engine::{RefCpuEngine, ENGINE_NAME, EPOCH_OPTION};
pub use training::{RecordingCollector, RecordingParameterStore};

static ENGINE: OnceLock<Arc<RefCpuEngine>> = OnceLock::new();

/// The process-wide engine, configured from the environment on first use.
pub fn engine() -> Arc<dyn Engine> {
    ENGINE
        .get_or_init(|| Arc::new(RefCpuEngine::new(RefCpuConfig::from_env())))
        .clone()
}

#[nnkit::linkme::distributed_slice(nnkit::engine::ENGINE_PROVIDERS)]
#[linkme(crate = nnkit::linkme)]
static PROVIDE_REF_CPU: EngineProviderFn = engine;
