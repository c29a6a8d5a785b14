use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, MutexGuard, OnceLock};

use anyhow::Result;
use nnkit::engine::{
    discover_engines, registered_engines, reset_engine_registry, EngineProviderFn, MemoryUsage,
    ENGINE_PROVIDERS,
};
use nnkit::linkme::distributed_slice;
use nnkit::training::{GradientCollector, Optimizer, ParameterStore};
use nnkit::{active_engine, engine_by_name, Context, Engine, LoadOptions, Model, NnError, ResourceManager};

struct Stub {
    name: &'static str,
}

impl Engine for Stub {
    fn engine_name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    fn accelerator_count(&self) -> u32 {
        0
    }

    fn accelerator_memory_usage(&self, _context: &Context) -> nnkit::Result<MemoryUsage> {
        Err(NnError::unsupported("stub"))
    }

    fn new_model(&self, context: &Context) -> Model {
        Model::new("stub", *context, self.new_resource_manager_on(context))
    }

    fn load_model(
        &self,
        _path: &Path,
        _name: &str,
        _context: &Context,
        _options: &LoadOptions,
    ) -> nnkit::Result<Model> {
        Err(NnError::unsupported("stub"))
    }

    fn new_resource_manager_on(&self, context: &Context) -> ResourceManager {
        ResourceManager::new_root(self.name, *context)
    }

    fn new_gradient_collector(&self) -> Box<dyn GradientCollector> {
        unimplemented!()
    }

    fn new_parameter_store(
        &self,
        _optimizer: Arc<dyn Optimizer>,
        _aggregate_on_accelerator: bool,
    ) -> Box<dyn ParameterStore> {
        unimplemented!()
    }
}

static PROVIDER_CALLS: AtomicUsize = AtomicUsize::new(0);

fn stub_a() -> Arc<dyn Engine> {
    PROVIDER_CALLS.fetch_add(1, Ordering::SeqCst);
    static ENGINE: OnceLock<Arc<Stub>> = OnceLock::new();
    ENGINE.get_or_init(|| Arc::new(Stub { name: "stub-a" })).clone()
}

fn stub_b() -> Arc<dyn Engine> {
    PROVIDER_CALLS.fetch_add(1, Ordering::SeqCst);
    Arc::new(Stub { name: "stub-b" })
}

#[distributed_slice(ENGINE_PROVIDERS)]
#[linkme(crate = nnkit::linkme)]
static PROVIDE_STUB_A: EngineProviderFn = stub_a;

#[distributed_slice(ENGINE_PROVIDERS)]
#[linkme(crate = nnkit::linkme)]
static PROVIDE_STUB_B: EngineProviderFn = stub_b;

/// Tests in this binary share the process registry.
fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn linked_providers_are_discovered() -> Result<()> {
    let _guard = serial();
    let mut names = registered_engines()?;
    names.sort();
    assert_eq!(names, ["stub-a", "stub-b"]);
    let active = active_engine()?;
    assert!(active.engine_name().starts_with("stub-"));
    Ok(())
}

#[test]
fn active_engine_is_stable() -> Result<()> {
    let _guard = serial();
    let first = active_engine()?;
    for _ in 0..16 {
        assert!(Arc::ptr_eq(&first, &active_engine()?));
    }
    Ok(())
}

#[test]
fn lookup_by_name() -> Result<()> {
    let _guard = serial();
    let a = engine_by_name("stub-a")?.expect("stub-a registered");
    assert_eq!(a.engine_name(), "stub-a");
    assert!(Arc::ptr_eq(&a, &engine_by_name("stub-a")?.expect("stub-a registered")));
    assert!(engine_by_name("missing")?.is_none());
    Ok(())
}

#[test]
fn concurrent_first_access_runs_one_discovery() -> Result<()> {
    let _guard = serial();
    reset_engine_registry();
    let before = PROVIDER_CALLS.load(Ordering::SeqCst);

    let threads = 8;
    let barrier = &Barrier::new(threads);
    let registries = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(move || {
                    barrier.wait();
                    discover_engines()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("discovery thread panicked"))
            .collect::<nnkit::Result<Vec<_>>>()
    })?;

    assert_eq!(PROVIDER_CALLS.load(Ordering::SeqCst) - before, 2);
    for registry in &registries[1..] {
        assert!(Arc::ptr_eq(&registries[0], registry));
    }
    Ok(())
}

#[test]
fn reset_rediscovers() -> Result<()> {
    let _guard = serial();
    let before = discover_engines()?;
    reset_engine_registry();
    let after = discover_engines()?;
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.active().engine_name(), after.active().engine_name());
    Ok(())
}
