//! The ReLU / leaky-ReLU layer.
//!
//! [`ReluLayer`] binds a [`ReluParam`] to the kernels and works on blobs
//! (`WithGrad<Tensor<T>>`): `value` carries activations, `grad` carries gradients.
//!
//! - forward: `top.value = max(bottom.value, 0) + negative_slope * min(bottom.value, 0)`
//! - backward: `bottom.grad = top.grad * ([bottom.value > 0] + negative_slope * [bottom.value <= 0])`
//!
//! Element counts are validated before any kernel runs, so a mismatched call returns a
//! [`LayerError`] and leaves every buffer untouched.
//!
//! # Example
//!
//! ```rust
//! use relu_layer::layer::{ReluLayer, ReluParam};
//! use relu_layer::tensors::{Tensor, WithGrad};
//!
//! let layer = ReluLayer::new(ReluParam::leaky(0.1f32));
//! let bottom = WithGrad::new(Tensor::new(vec![5], vec![-2.0, -1.0, 0.0, 1.0, 2.0]));
//! let mut top = WithGrad::new(Tensor::zeros(vec![5]));
//!
//! layer.forward(&bottom, &mut top).unwrap();
//! assert_eq!(top.value.data, vec![-0.2, -0.1, 0.0, 1.0, 2.0]);
//! ```

use thiserror::Error;

use crate::backend::{Backend, get_backend};
use crate::element::Element;
use crate::ops::dispatch;
use crate::tensors::{Tensor, WithGrad};

/// Errors reported by [`ReluLayer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    /// Two buffers of one call hold different numbers of elements.
    #[error("{role} holds {actual} elements, expected {expected}")]
    CountMismatch {
        role: &'static str,
        expected: usize,
        actual: usize,
    },
    /// In-place backward reads the forward output in place of the input, which only picks
    /// the same branch as the input when the slope is non-negative.
    #[error("in-place backward requires a non-negative slope")]
    InPlaceNegativeSlope,
}

/// Configuration of a [`ReluLayer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReluParam<T> {
    /// Slope applied to non-positive inputs. `0` gives the plain ReLU.
    pub negative_slope: T,
    /// Backend pinned to this layer. `None` follows [`get_backend`].
    pub engine: Option<Backend>,
}

impl<T: Element> Default for ReluParam<T> {
    fn default() -> Self {
        Self {
            negative_slope: T::zero(),
            engine: None,
        }
    }
}

impl<T: Element> ReluParam<T> {
    /// A leaky ReLU with the given slope.
    pub fn leaky(negative_slope: T) -> Self {
        Self {
            negative_slope,
            ..Self::default()
        }
    }

    /// Pins the layer to `backend`.
    #[must_use]
    pub fn with_engine(mut self, backend: Backend) -> Self {
        self.engine = Some(backend);
        self
    }
}

/// Elementwise rectified-linear activation with an optional negative slope.
#[derive(Debug, Clone)]
pub struct ReluLayer<T> {
    param: ReluParam<T>,
}

impl<T: Element> Default for ReluLayer<T> {
    fn default() -> Self {
        Self::new(ReluParam::default())
    }
}

fn check_count(role: &'static str, expected: usize, actual: usize) -> Result<(), LayerError> {
    if expected == actual {
        Ok(())
    } else {
        Err(LayerError::CountMismatch {
            role,
            expected,
            actual,
        })
    }
}

impl<T: Element> ReluLayer<T> {
    pub fn new(param: ReluParam<T>) -> Self {
        Self { param }
    }

    pub fn param(&self) -> &ReluParam<T> {
        &self.param
    }

    pub fn negative_slope(&self) -> T {
        self.param.negative_slope
    }

    /// The backend this layer dispatches to right now.
    pub fn backend(&self) -> Backend {
        self.param.engine.unwrap_or_else(get_backend)
    }

    /// Computes `top.value` from `bottom.value`.
    pub fn forward(
        &self,
        bottom: &WithGrad<Tensor<T>>,
        top: &mut WithGrad<Tensor<T>>,
    ) -> Result<(), LayerError> {
        check_count("top data", bottom.value.count(), top.value.count())?;
        dispatch::relu_forward(
            self.backend(),
            &bottom.value.data,
            &mut top.value.data,
            self.param.negative_slope,
        );
        Ok(())
    }

    /// Computes the activation of `blob.value` in place.
    pub fn forward_in_place(&self, blob: &mut WithGrad<Tensor<T>>) {
        dispatch::relu_forward_in_place(self.backend(), &mut blob.value.data, self.param.negative_slope);
    }

    /// Computes `bottom.grad` from `top.grad` and the forward input `bottom.value`.
    ///
    /// With `propagate_down == false` nothing is validated or written.
    pub fn backward(
        &self,
        top: &WithGrad<Tensor<T>>,
        propagate_down: bool,
        bottom: &mut WithGrad<Tensor<T>>,
    ) -> Result<(), LayerError> {
        if !propagate_down {
            return Ok(());
        }
        let count = bottom.value.count();
        check_count("top diff", count, top.grad.count())?;
        check_count("bottom diff", count, bottom.grad.count())?;

        dispatch::relu_backward(
            self.backend(),
            &top.grad.data,
            propagate_down,
            &bottom.value.data,
            &mut bottom.grad.data,
            self.param.negative_slope,
        );
        Ok(())
    }

    /// Backward pass for a layer computed in place: `blob.value` holds the forward output
    /// and `blob.grad` the upstream gradient, which is replaced by the input gradient.
    ///
    /// The output has the sign of the input for any non-negative slope, so the branch
    /// decision is unchanged. A negative slope flips that sign and is rejected.
    pub fn backward_in_place(
        &self,
        propagate_down: bool,
        blob: &mut WithGrad<Tensor<T>>,
    ) -> Result<(), LayerError> {
        if !propagate_down {
            return Ok(());
        }
        if self.param.negative_slope < T::zero() {
            return Err(LayerError::InPlaceNegativeSlope);
        }
        check_count("diff", blob.value.count(), blob.grad.count())?;

        dispatch::relu_backward_in_place(
            self.backend(),
            &mut blob.grad.data,
            propagate_down,
            &blob.value.data,
            self.param.negative_slope,
        );
        Ok(())
    }
}
