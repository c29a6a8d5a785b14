//! Process-wide engine discovery.
//!
//! Discovery runs once, on first access, over every provider in
//! [`ENGINE_PROVIDERS`](super::ENGINE_PROVIDERS). The outcome, success or failure, is cached
//! until [`reset_engine_registry`] so the active engine never changes underneath callers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use super::{Engine, EngineProvider, ENGINE_PROVIDERS};
use crate::error::{NnError, Result};

/// Engines found by one discovery pass, in discovery order.
pub struct EngineRegistry {
    engines: Vec<Arc<dyn Engine>>,
    by_name: HashMap<String, usize>,
}

impl EngineRegistry {
    /// Calls each provider once, in order. The first engine becomes the active one.
    ///
    /// Fails with `Configuration` when `providers` yields nothing. When two engines share a
    /// name, lookup keeps the first.
    pub fn discover<I>(providers: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: EngineProvider,
    {
        let mut engines: Vec<Arc<dyn Engine>> = Vec::new();
        let mut by_name = HashMap::new();
        for provider in providers {
            let engine = provider.engine();
            let name = engine.engine_name().to_string();
            if by_name.contains_key(&name) {
                warn!(engine = %name, "duplicate engine name; keeping the first registration");
            } else {
                by_name.insert(name, engines.len());
            }
            engines.push(engine);
        }

        let active = engines.first().ok_or_else(|| {
            NnError::configuration("no engine provider is linked into this binary")
        })?;
        if engines.len() > 1 {
            let names: Vec<&str> = engines.iter().map(|e| e.engine_name()).collect();
            warn!(
                ?names,
                active = active.engine_name(),
                "multiple engines discovered; using the first"
            );
        }
        debug!(
            engine = active.engine_name(),
            version = active.version(),
            "selected active engine"
        );
        Ok(EngineRegistry { engines, by_name })
    }

    /// The engine chosen at discovery.
    pub fn active(&self) -> Arc<dyn Engine> {
        Arc::clone(&self.engines[0])
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.engines[index]))
    }

    /// Names of the discovered engines in discovery order, duplicates included.
    pub fn names(&self) -> Vec<String> {
        self.engines
            .iter()
            .map(|e| e.engine_name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

/// Cached discovery outcome; a failure keeps its message so it can be reported again.
type Discovery = std::result::Result<Arc<EngineRegistry>, String>;

static GLOBAL_REGISTRY: RwLock<Option<Discovery>> = RwLock::new(None);

fn read_global() -> RwLockReadGuard<'static, Option<Discovery>> {
    GLOBAL_REGISTRY
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_global() -> RwLockWriteGuard<'static, Option<Discovery>> {
    GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn cached(discovery: &Discovery) -> Result<Arc<EngineRegistry>> {
    match discovery {
        Ok(registry) => Ok(Arc::clone(registry)),
        Err(message) => Err(NnError::configuration(message.clone())),
    }
}

/// Returns the process registry, running discovery on first use.
///
/// Concurrent first callers serialize on the registry lock; exactly one of them runs
/// discovery and all of them observe the same `Arc`.
pub fn discover_engines() -> Result<Arc<EngineRegistry>> {
    if let Some(discovery) = read_global().as_ref() {
        return cached(discovery);
    }
    let mut slot = write_global();
    if let Some(discovery) = slot.as_ref() {
        return cached(discovery);
    }
    let discovery = match EngineRegistry::discover(ENGINE_PROVIDERS.iter()) {
        Ok(registry) => Ok(Arc::new(registry)),
        Err(NnError::Configuration(message)) => Err(message),
        Err(other) => Err(other.to_string()),
    };
    cached(slot.insert(discovery))
}

/// The active engine. Stable for the life of the process.
pub fn active_engine() -> Result<Arc<dyn Engine>> {
    Ok(discover_engines()?.active())
}

/// Looks up a discovered engine; `Ok(None)` when no engine has that name.
pub fn engine_by_name(name: &str) -> Result<Option<Arc<dyn Engine>>> {
    Ok(discover_engines()?.get(name))
}

/// Names of every discovered engine, in discovery order.
pub fn registered_engines() -> Result<Vec<String>> {
    Ok(discover_engines()?.names())
}

/// Drops the cached discovery so the next access discovers again.
///
/// Test isolation only; engines already handed out stay alive.
pub fn reset_engine_registry() {
    write_global().take();
}
