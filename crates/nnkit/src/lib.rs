//! Backend-agnostic engine registry and block composition graph.
//!
//! Engines plug in through [`engine::ENGINE_PROVIDERS`]; models are trees of [`Block`]s whose
//! parameters are shaped by the first forward pass and persisted as a versioned stream.

pub use linkme;

pub mod block;
pub mod context;
pub mod engine;
pub mod error;
pub mod initializer;
pub mod manager;
pub mod model;
pub mod parameter;
pub mod stream;
pub mod tensor;
pub mod training;

pub use block::{Block, ParamBag};
pub use context::{Context, Device};
pub use engine::{active_engine, engine_by_name, Engine, LoadOptions};
pub use error::{NnError, Result};
pub use manager::ResourceManager;
pub use model::Model;
pub use tensor::{DType, Shape, Tensor, TensorList};
