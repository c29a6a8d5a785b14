use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use nnkit::block::{Linear, SequentialBlock};
use nnkit::{active_engine, engine_by_name, Context, ParamBag, Tensor, TensorList};
use nnkit_backend_ref_cpu::{ENGINE_NAME, EPOCH_OPTION};

#[test]
fn linked_engine_is_active() -> Result<()> {
    let engine = active_engine()?;
    assert_eq!(engine.engine_name(), ENGINE_NAME);
    assert!(Arc::ptr_eq(&engine, &nnkit_backend_ref_cpu::engine()));
    let by_name = engine_by_name(ENGINE_NAME)?.expect("ref-cpu registered");
    assert!(Arc::ptr_eq(&engine, &by_name));
    assert!(engine_by_name("tpu")?.is_none());
    Ok(())
}

#[test]
fn checkpoint_epochs_select_artifact() -> Result<()> {
    let engine = active_engine()?;
    let dir = tempfile::tempdir()?;
    let context = Context::cpu();
    let x = TensorList::single(Tensor::from_vec([1, 2], vec![1.0, -2.0])?);

    let manager = engine.new_resource_manager_on(&context);
    let block = SequentialBlock::new(&manager).add(Linear::new(3).build(&manager)?);
    let mut model = nnkit::Model::new("mlp", context, manager);
    model.set_block(block.into())?;
    let expected = model.forward(&x, &ParamBag::new())?;
    let saved = model.save_parameters(dir.path())?;
    std::fs::rename(&saved, dir.path().join("mlp-0003.params"))?;

    let mut options = BTreeMap::new();
    options.insert(EPOCH_OPTION.to_string(), "3".to_string());
    let mut loaded = engine.load_model(dir.path(), "mlp", &context, &options)?;
    let block = SequentialBlock::new(loaded.manager()).add(Linear::new(3).build(loaded.manager())?);
    loaded.set_block(block.into())?;
    assert_eq!(loaded.forward(&x, &ParamBag::new())?, expected);

    let missing = engine.load_model(dir.path(), "mlp", &context, &BTreeMap::new());
    assert!(missing.unwrap_err().is_io());
    Ok(())
}
