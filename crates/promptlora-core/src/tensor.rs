//! Dense f32 tensors and named weight maps
//!
//! Adapter files may store f16, bf16 or f64 data, but everything is
//! converted to row-major f32 on load so patching and encoding can work
//! on a single representation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Named tensors, ordered by key
pub type WeightMap = BTreeMap<String, Tensor>;

/// Tensor errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    #[error("Shape {shape:?} needs {expected} values, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot multiply {left:?} by {right:?}")]
    IncompatibleMatmul { left: Vec<usize>, right: Vec<usize> },

    #[error("Element count mismatch: {expected} vs {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// A dense row-major f32 tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Unchecked wire form; deserialization goes through `Tensor::new`
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = TensorError;

    fn try_from(raw: RawTensor) -> Result<Self, Self::Error> {
        Tensor::new(raw.shape, raw.data)
    }
}

impl Tensor {
    /// Create a tensor, checking that the data fills the shape
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Create a zero-filled tensor
    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; numel],
        }
    }

    /// Create a 0-d tensor holding one value
    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// First value, for scalars such as LoRA alpha
    pub fn first(&self) -> Option<f32> {
        self.data.first().copied()
    }

    /// View as a matrix: leading dimension by the product of the rest.
    ///
    /// Conv LoRA weights (`[out, rank, 1, 1]`) flatten to plain matrices.
    pub fn as_matrix(&self) -> Option<(usize, usize)> {
        let (&rows, rest) = self.shape.split_first()?;
        Some((rows, rest.iter().product()))
    }

    /// Matrix product of the 2-D views of `self` and `other`
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        let incompatible = || TensorError::IncompatibleMatmul {
            left: self.shape.clone(),
            right: other.shape.clone(),
        };
        let (m, k) = self.as_matrix().ok_or_else(incompatible)?;
        let (k2, n) = other.as_matrix().ok_or_else(incompatible)?;
        if k != k2 {
            return Err(incompatible());
        }

        let mut out = vec![0.0; m * n];
        for i in 0..m {
            for r in 0..k {
                let a = self.data[i * k + r];
                if a == 0.0 {
                    continue;
                }
                let row = &other.data[r * n..(r + 1) * n];
                for (o, b) in out[i * n..(i + 1) * n].iter_mut().zip(row) {
                    *o += a * b;
                }
            }
        }

        Ok(Tensor {
            shape: vec![m, n],
            data: out,
        })
    }

    /// `self += scale * other`, matched element-wise
    pub fn add_scaled(&mut self, other: &Tensor, scale: f32) -> Result<(), TensorError> {
        if self.numel() != other.numel() {
            return Err(TensorError::SizeMismatch {
                expected: self.numel(),
                actual: other.numel(),
            });
        }
        for (w, d) in self.data.iter_mut().zip(&other.data) {
            *w += scale * d;
        }
        Ok(())
    }

    /// Column means of the matrix view, shaped `[1, cols]`.
    ///
    /// `None` for scalars and for matrices with no rows or columns.
    pub fn mean_rows(&self) -> Option<Tensor> {
        let (rows, cols) = self.as_matrix()?;
        if rows == 0 || cols == 0 {
            return None;
        }

        let mut sums = vec![0.0f32; cols];
        for row in self.data.chunks_exact(cols) {
            for (sum, v) in sums.iter_mut().zip(row) {
                *sum += v;
            }
        }
        for sum in &mut sums {
            *sum /= rows as f32;
        }

        Some(Self {
            shape: vec![1, cols],
            data: sums,
        })
    }

    /// Estimate memory usage in bytes
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
            + self.shape.len() * std::mem::size_of::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_shape() {
        assert!(Tensor::new(vec![2, 3], vec![0.0; 6]).is_ok());

        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            TensorError::ShapeMismatch {
                shape: vec![2, 3],
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_matmul() {
        // [2x2] @ [2x3]
        let a = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::new(vec![2, 3], vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.data(), &[1.0, 2.0, 3.0, 3.0, 4.0, 7.0]);
    }

    #[test]
    fn test_matmul_flattens_conv_shapes() {
        let up = Tensor::new(vec![2, 1, 1, 1], vec![1.0, 2.0]).unwrap();
        let down = Tensor::new(vec![1, 2, 1, 1], vec![3.0, 4.0]).unwrap();

        let delta = up.matmul(&down).unwrap();
        assert_eq!(delta.data(), &[3.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_matmul_rejects_mismatch() {
        let a = Tensor::zeros(vec![2, 3]);
        let b = Tensor::zeros(vec![2, 3]);
        assert!(matches!(
            a.matmul(&b),
            Err(TensorError::IncompatibleMatmul { .. })
        ));
        assert!(Tensor::scalar(1.0).matmul(&a).is_err());
    }

    #[test]
    fn test_add_scaled() {
        let mut w = Tensor::new(vec![2], vec![1.0, 1.0]).unwrap();
        let d = Tensor::new(vec![1, 2], vec![2.0, 4.0]).unwrap();

        w.add_scaled(&d, 0.5).unwrap();
        assert_eq!(w.data(), &[2.0, 3.0]);

        let wrong = Tensor::zeros(vec![3]);
        assert!(w.add_scaled(&wrong, 1.0).is_err());
    }

    #[test]
    fn test_mean_rows() {
        let t = Tensor::new(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 9.0]).unwrap();
        let mean = t.mean_rows().unwrap();
        assert_eq!(mean.shape(), &[1, 2]);
        assert_eq!(mean.data(), &[3.0, 5.0]);

        assert!(Tensor::zeros(vec![0, 4]).mean_rows().is_none());
        assert!(Tensor::scalar(1.0).mean_rows().is_none());
    }

    #[test]
    fn test_deserialize_checks_shape() {
        let t: Tensor = serde_json::from_str(r#"{"shape":[2,2],"data":[1.0,0.0,0.0,1.0]}"#).unwrap();
        assert_eq!(t.numel(), 4);

        let err = serde_json::from_str::<Tensor>(r#"{"shape":[2,2],"data":[1.0]}"#).unwrap_err();
        assert!(err.to_string().contains("Shape"), "{err}");
    }
}
