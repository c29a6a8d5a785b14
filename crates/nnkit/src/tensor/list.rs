//! Ordered tensor lists flowing into and out of blocks.

use std::ops::Index;

use super::{Shape, Tensor};

/// Ordered list of tensors; the unit of block input and output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorList {
    tensors: Vec<Tensor>,
}

impl TensorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(tensor: Tensor) -> Self {
        TensorList {
            tensors: vec![tensor],
        }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn push(&mut self, tensor: Tensor) {
        self.tensors.push(tensor);
    }

    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.tensors.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.tensors.iter()
    }

    pub fn shapes(&self) -> Vec<Shape> {
        self.tensors.iter().map(|t| t.shape().clone()).collect()
    }

    /// Flattens a list of lists into one list, preserving outer then inner order.
    pub fn concat(lists: Vec<TensorList>) -> TensorList {
        lists.into_iter().flatten().collect()
    }

    pub fn into_vec(self) -> Vec<Tensor> {
        self.tensors
    }
}

impl From<Vec<Tensor>> for TensorList {
    fn from(tensors: Vec<Tensor>) -> Self {
        TensorList { tensors }
    }
}

impl FromIterator<Tensor> for TensorList {
    fn from_iter<I: IntoIterator<Item = Tensor>>(iter: I) -> Self {
        TensorList {
            tensors: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TensorList {
    type Item = Tensor;
    type IntoIter = std::vec::IntoIter<Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.into_iter()
    }
}

impl<'a> IntoIterator for &'a TensorList {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.iter()
    }
}

impl Index<usize> for TensorList {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.tensors[index]
    }
}
