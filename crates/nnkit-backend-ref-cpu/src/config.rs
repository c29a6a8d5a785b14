use std::env;
use std::sync::OnceLock;

use tracing::warn;

/// Number of simulated accelerators the engine reports.
pub const ACCELERATORS_VAR: &str = "NNKIT_REF_CPU_ACCELERATORS";

static CONFIG: OnceLock<RefCpuConfig> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefCpuConfig {
    pub accelerators: u32,
}

impl RefCpuConfig {
    /// Reads the environment once per process.
    pub fn from_env() -> Self {
        *CONFIG.get_or_init(|| Self::parse(env::var(ACCELERATORS_VAR).ok().as_deref()))
    }

    fn parse(accelerators: Option<&str>) -> Self {
        let accelerators = match accelerators.map(str::trim) {
            Some(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
                warn!(var = ACCELERATORS_VAR, value, "ignoring invalid accelerator count");
                0
            }),
            _ => 0,
        };
        RefCpuConfig { accelerators }
    }
}
