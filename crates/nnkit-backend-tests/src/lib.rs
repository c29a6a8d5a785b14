pub mod smoke;

/// Instantiates the conformance suite for an engine.
///
/// `$engine_ctor` is any expression callable as `fn() -> Arc<dyn Engine>`.
#[macro_export]
macro_rules! define_engine_tests {
    ($module:ident, $engine_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            use $crate::smoke;

            #[test]
            fn smoke_engine_reports_identity() {
                let engine = ($engine_ctor)();
                smoke::engine_reports_identity(&engine);
            }

            #[test]
            fn smoke_memory_usage_rejects_cpu_context() {
                let engine = ($engine_ctor)();
                smoke::memory_usage_rejects_cpu_context(&engine);
            }

            #[test]
            fn smoke_resource_managers_follow_context() {
                let engine = ($engine_ctor)();
                smoke::resource_managers_follow_context(&engine);
            }

            #[test]
            fn smoke_closed_manager_invalidates_parameters() {
                let engine = ($engine_ctor)();
                smoke::closed_manager_invalidates_parameters(&engine);
            }

            #[test]
            fn smoke_model_runs_block_tree() {
                let engine = ($engine_ctor)();
                smoke::model_runs_block_tree(&engine);
            }

            #[test]
            fn smoke_load_model_round_trip() {
                let engine = ($engine_ctor)();
                smoke::load_model_round_trip(&engine);
            }

            #[test]
            fn smoke_load_model_missing_artifact() {
                let engine = ($engine_ctor)();
                smoke::load_model_missing_artifact(&engine);
            }

            #[test]
            fn smoke_load_model_rejects_unknown_option() {
                let engine = ($engine_ctor)();
                smoke::load_model_rejects_unknown_option(&engine);
            }

            #[test]
            fn smoke_training_helpers_construct() {
                let engine = ($engine_ctor)();
                smoke::training_helpers_construct(&engine);
            }
        }
    };
}
