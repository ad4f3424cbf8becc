//! Blob-style tensor containers.
//!
//! A layer exchanges data with the surrounding network through *blobs*: a value buffer
//! paired with a gradient buffer of the same shape. This module provides the two pieces:
//!
//! - [`Tensor<T>`]: a shape plus flat, row-major data
//! - [`WithGrad<T>`]: any value paired with its gradient
//!
//! The activation kernels never look at the shape; they operate on `tensor.data` as a flat
//! buffer of `count` elements.
//!
//! ## Example
//!
//! ```rust
//! use relu_layer::tensors::{Tensor, WithGrad};
//! let blob = WithGrad::new(Tensor::new(vec![2, 3], vec![1.0f32, -2.0, 3.0, -4.0, 5.0, -6.0]));
//! assert_eq!(blob.value.count(), 6);
//! assert_eq!(blob.grad.data, vec![0.0; 6]);
//! ```

use crate::element::Element;

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - `shape` defines the structure, e.g. `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }
}

impl<T: Element> Tensor<T> {
    /// A tensor of the given shape filled with zeros.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::filled(shape, T::zero())
    }

    /// A tensor of the given shape filled with `value`.
    pub fn filled(shape: impl Into<Vec<usize>>, value: T) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }
}

/// A value paired with its gradient.
///
/// For a blob, `value` is the activations and `grad` the gradient of the loss with respect
/// to them.
#[derive(Debug, Clone, PartialEq)]
pub struct WithGrad<T> {
    pub value: T,
    pub grad: T,
}

impl<T: Element> WithGrad<Tensor<T>> {
    /// Wraps `value` with a zeroed gradient of the same shape.
    pub fn new(value: Tensor<T>) -> Self {
        let grad = Tensor::zeros(value.shape.clone());
        Self { value, grad }
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape. Negative
/// literals are accepted.
///
/// # Example
/// ```
/// use relu_layer::tensor;
/// let t = tensor!([[1.0, -2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// assert_eq!(t.data, vec![1.0, -2.0, 3.0, 4.0]);
/// ```
#[macro_export]
macro_rules! tensor {
    (@rows [$($acc:expr),+]) => {{
        let children = vec![ $( $acc ),+ ];
        let first_shape = &children[0].shape;
        assert!(children.iter().all(|c| c.shape == *first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};

    (@rows [$($acc:expr),*] - $lit:literal $(, $($rest:tt)*)?) => {
        $crate::tensor!(@rows [$($acc,)* $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![-$lit])] $($($rest)*)?)
    };

    (@rows [$($acc:expr),*] $inner:tt $(, $($rest:tt)*)?) => {
        $crate::tensor!(@rows [$($acc,)* $crate::tensor!($inner)] $($($rest)*)?)
    };

    ($lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$lit])
    };

    ([ $($body:tt)+ ]) => {
        $crate::tensor!(@rows [] $($body)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_panics() {
        let result = std::panic::catch_unwind(|| Tensor::new(vec![2, 2], vec![1.0f32, 2.0, 3.0]));
        assert!(result.is_err());
    }

    #[test]
    fn macro_flattens_row_major() {
        let t = crate::tensor!([[-1.0, 2.0, 0.0], [3.0, -4.0, 5.0]]);
        assert_eq!(t.shape, vec![2, 3]);
        assert_eq!(t.data, vec![-1.0, 2.0, 0.0, 3.0, -4.0, 5.0]);
    }

    #[test]
    fn with_grad_starts_with_zero_gradient() {
        let blob = WithGrad::new(Tensor::new(vec![3], vec![1.0f64, 2.0, 3.0]));
        assert_eq!(blob.grad, Tensor::zeros(vec![3]));
    }
}
