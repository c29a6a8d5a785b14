//! Host tensor types shared by blocks, parameters, and engines.
//!
//! The numeric library proper lives behind an engine; these types only carry shapes,
//! dtypes, and little-endian payloads so graphs can be built, initialized, and streamed.

pub mod dtype;
mod host_tensor;
mod list;
pub mod shape;

pub use dtype::DType;
pub use host_tensor::Tensor;
pub use list::TensorList;
pub use shape::Shape;
