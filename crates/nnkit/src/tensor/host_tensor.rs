//! Host-backed tensor used for parameter storage, block inputs, and the parameter stream.

use super::{dtype::DType, shape::Shape};
use crate::error::{NnError, Result};

/// Dense tensor stored as little-endian bytes in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    data: Vec<u8>,
}

impl Tensor {
    /// Constructs an `F32` tensor from raw values, validating the length against the shape.
    pub fn from_vec(shape: impl Into<Shape>, data: Vec<f32>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.num_elements() {
            return Err(NnError::invalid_argument(format!(
                "tensor data length ({}) does not match shape {}",
                data.len(),
                shape
            )));
        }
        Ok(Tensor {
            shape,
            dtype: DType::F32,
            data: data.iter().flat_map(|v| v.to_le_bytes()).collect(),
        })
    }

    /// Constructs an `I32` tensor, ensuring the payload matches the expected element count.
    pub fn from_i32(shape: impl Into<Shape>, data: Vec<i32>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.num_elements() {
            return Err(NnError::invalid_argument(format!(
                "tensor data length ({}) does not match shape {}",
                data.len(),
                shape
            )));
        }
        Ok(Tensor {
            shape,
            dtype: DType::I32,
            data: data.iter().flat_map(|v| v.to_le_bytes()).collect(),
        })
    }

    /// Wraps an already-encoded little-endian payload.
    pub fn from_bytes(shape: impl Into<Shape>, dtype: DType, data: Vec<u8>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.num_elements() * dtype.size_in_bytes();
        if data.len() != expected {
            return Err(NnError::invalid_argument(format!(
                "payload of {} bytes does not match {:?} tensor of shape {} ({} bytes)",
                data.len(),
                dtype,
                shape,
                expected
            )));
        }
        Ok(Tensor { shape, dtype, data })
    }

    /// Returns a zero-filled tensor; every supported dtype encodes zero as all-zero bytes.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        let len = shape.num_elements() * dtype.size_in_bytes();
        Tensor {
            shape,
            dtype,
            data: vec![0; len],
        }
    }

    /// Returns an `F32` tensor filled with `value`.
    pub fn full(shape: impl Into<Shape>, value: f32) -> Self {
        let shape = shape.into();
        let data = std::iter::repeat(value.to_le_bytes())
            .take(shape.num_elements())
            .flatten()
            .collect();
        Tensor {
            shape,
            dtype: DType::F32,
            data,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn len(&self) -> usize {
        self.shape.num_elements()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decodes the payload as `f32` values. Only `F32` tensors can be read this way.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        if self.dtype != DType::F32 {
            return Err(NnError::unsupported(format!(
                "reading {:?} tensor as f32",
                self.dtype
            )));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Decodes the payload as `i32` values. Only `I32` tensors can be read this way.
    pub fn to_i32_vec(&self) -> Result<Vec<i32>> {
        if self.dtype != DType::I32 {
            return Err(NnError::unsupported(format!(
                "reading {:?} tensor as i32",
                self.dtype
            )));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Applies `f` element-wise to an `F32` tensor, keeping the shape.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Result<Tensor> {
        let values = self.to_f32_vec()?.into_iter().map(f).collect();
        Tensor::from_vec(self.shape.clone(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_length_mismatch() {
        let err = Tensor::from_vec([2, 2], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn f32_payload_is_little_endian() {
        let t = Tensor::from_vec([1], vec![1.0]).unwrap();
        assert_eq!(t.as_bytes(), &1.0f32.to_le_bytes());
        assert_eq!(t.to_f32_vec().unwrap(), vec![1.0]);
    }

    #[test]
    fn reading_wrong_dtype_is_unsupported() {
        let t = Tensor::zeros([3], DType::F16);
        assert!(t.to_f32_vec().unwrap_err().is_unsupported());
        assert_eq!(t.as_bytes().len(), 6);
    }

    #[test]
    fn map_keeps_shape() {
        let t = Tensor::from_vec([2], vec![-1.0, 2.0]).unwrap();
        let relu = t.map(|v| v.max(0.0)).unwrap();
        assert_eq!(relu.shape().dims(), &[2]);
        assert_eq!(relu.to_f32_vec().unwrap(), vec![0.0, 2.0]);
    }
}
