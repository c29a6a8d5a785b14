use std::sync::Arc;

use nnkit::block::{Lambda, Linear, ParallelBlock, SequentialBlock};
use nnkit::initializer::NormalInit;
use nnkit::training::Optimizer;
use nnkit::{Block, Context, Engine, LoadOptions, ParamBag, ResourceManager, Tensor, TensorList};

#[derive(Debug)]
struct Sgd;

impl Optimizer for Sgd {
    fn name(&self) -> &str {
        "sgd"
    }
}

fn two_branch(manager: &ResourceManager) -> Block {
    let deep = SequentialBlock::new(manager)
        .add(Linear::new(6).build(manager).unwrap())
        .add(Lambda::relu().build(manager).unwrap())
        .add(Linear::new(2).build(manager).unwrap());
    let wide = Linear::new(3).build(manager).unwrap();
    ParallelBlock::concat(manager, vec![deep.into(), wide]).into()
}

fn batch() -> TensorList {
    let values = (0..12).map(|v| v as f32 / 4.0 - 1.0).collect();
    TensorList::single(Tensor::from_vec([3, 4], values).unwrap())
}

pub fn engine_reports_identity(engine: &Arc<dyn Engine>) {
    assert!(!engine.engine_name().is_empty());
    assert!(!engine.version().is_empty());
    let context = engine.default_context();
    assert_eq!(context.is_accelerator(), engine.accelerator_count() > 0);
}

pub fn memory_usage_rejects_cpu_context(engine: &Arc<dyn Engine>) {
    let err = engine
        .accelerator_memory_usage(&Context::cpu())
        .unwrap_err();
    assert!(err.is_invalid_argument(), "unexpected error {err}");
}

pub fn resource_managers_follow_context(engine: &Arc<dyn Engine>) {
    let manager = engine.new_resource_manager();
    assert_eq!(manager.context(), engine.default_context());
    assert_eq!(manager.engine_name(), engine.engine_name());

    let cpu = engine.new_resource_manager_on(&Context::cpu());
    assert_eq!(cpu.context(), Context::cpu());
    let child = cpu.new_sub_manager().unwrap();
    cpu.close();
    assert!(child.is_closed());
    assert!(cpu.attach(Tensor::full([1], 1.0)).unwrap_err().is_closed());
}

pub fn closed_manager_invalidates_parameters(engine: &Arc<dyn Engine>) {
    let manager = engine.new_resource_manager_on(&Context::cpu());
    let block = Linear::new(2).build(&manager).unwrap();
    block.forward_simple(&batch()).unwrap();
    let weight = Arc::clone(&block.direct_parameters()[0]);
    assert!(weight.array().is_ok());
    manager.close();
    assert!(weight.array().unwrap_err().is_closed());
}

pub fn model_runs_block_tree(engine: &Arc<dyn Engine>) {
    let mut model = engine.new_model(&Context::cpu());
    assert_eq!(model.context(), Context::cpu());
    let block = two_branch(model.manager());
    model.set_block(block).unwrap();

    let out = model.forward(&batch(), &ParamBag::new()).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].shape().dims(), &[3, 2]);
    assert_eq!(out[1].shape().dims(), &[3, 3]);
    assert_eq!(model.block().unwrap().parameters().len(), 6);
}

pub fn load_model_round_trip(engine: &Arc<dyn Engine>) {
    let dir = tempfile::tempdir().unwrap();
    let context = Context::cpu();

    let mut model = nnkit::Model::new("branches", context, engine.new_resource_manager_on(&context));
    let block = two_branch(model.manager());
    block.set_initializer(Arc::new(NormalInit::new(0.3)), true);
    model.set_block(block).unwrap();
    let expected = model.forward(&batch(), &ParamBag::new()).unwrap();
    model.save_parameters(dir.path()).unwrap();

    let mut loaded = engine
        .load_model(dir.path(), "branches", &context, &LoadOptions::new())
        .unwrap();
    assert_eq!(loaded.name(), "branches");
    let block = two_branch(loaded.manager());
    loaded.set_block(block).unwrap();
    assert_eq!(loaded.forward(&batch(), &ParamBag::new()).unwrap(), expected);
}

pub fn load_model_missing_artifact(engine: &Arc<dyn Engine>) {
    let dir = tempfile::tempdir().unwrap();
    let err = engine
        .load_model(dir.path(), "absent", &Context::cpu(), &LoadOptions::new())
        .unwrap_err();
    assert!(err.is_io(), "unexpected error {err}");
}

pub fn load_model_rejects_unknown_option(engine: &Arc<dyn Engine>) {
    let dir = tempfile::tempdir().unwrap();
    let mut options = LoadOptions::new();
    options.insert("no-such-option".to_string(), "1".to_string());
    let err = engine
        .load_model(dir.path(), "absent", &Context::cpu(), &options)
        .unwrap_err();
    assert!(err.is_invalid_argument(), "unexpected error {err}");
}

pub fn training_helpers_construct(engine: &Arc<dyn Engine>) {
    let _collector = engine.new_gradient_collector();
    let _store = engine.new_parameter_store(Arc::new(Sgd), false);
}
