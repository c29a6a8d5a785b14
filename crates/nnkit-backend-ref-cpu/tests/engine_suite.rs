nnkit_backend_tests::define_engine_tests!(ref_cpu_singleton, nnkit_backend_ref_cpu::engine);

nnkit_backend_tests::define_engine_tests!(ref_cpu_with_accelerators, || -> ::std::sync::Arc<dyn ::nnkit::Engine> {
    ::std::sync::Arc::new(::nnkit_backend_ref_cpu::RefCpuEngine::new(
        ::nnkit_backend_ref_cpu::RefCpuConfig { accelerators: 2 },
    ))
});
