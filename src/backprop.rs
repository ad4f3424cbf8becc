//! Closure-style differentiable activations.
//!
//! For callers that manage gradients by hand rather than through a layer, each operation
//! follows the pattern:
//!
//! 1. **Input** is a reference to `WithGrad<Tensor<T>>`.
//! 2. **Forward Pass** computes and returns the output tensor.
//! 3. **Backward Pass** is a closure borrowing the input, mapping `dL/d(out)` to `dL/d(input)`.
//!
//! Both passes run on the process-wide default backend ([`crate::backend::get_backend`]).

use crate::backend::get_backend;
use crate::element::Element;
use crate::ops::dispatch;
use crate::tensors::{Tensor, WithGrad};

/// Applies the leaky ReLU `max(x, 0) + negative_slope * min(x, 0)` elementwise.
///
/// # Returns
/// - `out`: activated tensor of the input's shape.
/// - `back`: closure mapping `dL/d(out)` to `dL/d(input)`: the upstream gradient where the
///   input was positive, scaled by `negative_slope` elsewhere (zero included).
///
/// # Panics
/// The closure panics if the gradient does not have as many elements as the input.
///
/// # Example
/// ```rust
/// use relu_layer::{tensor, tensors::WithGrad};
///
/// let input = WithGrad::new(tensor!([[3.0, -3.0], [0.0, -1.0]]));
/// let (out, back) = relu_layer::backprop::leaky_relu(&input, 0.5);
/// assert_eq!(out.data, vec![3.0, -1.5, 0.0, -0.5]);
/// let grad_in = back(&tensor!([[2.0, 4.0], [6.0, 8.0]]));
/// assert_eq!(grad_in.data, vec![2.0, 2.0, 3.0, 4.0]);
/// ```
pub fn leaky_relu<T: Element>(
    input: &WithGrad<Tensor<T>>,
    negative_slope: T,
) -> (Tensor<T>, impl Fn(&Tensor<T>) -> Tensor<T> + '_) {
    let backend = get_backend();
    let mut out = Tensor::zeros(input.value.shape.clone());
    dispatch::relu_forward(backend, &input.value.data, &mut out.data, negative_slope);

    let back = move |grad_output: &Tensor<T>| {
        let mut grad = Tensor::zeros(input.value.shape.clone());
        dispatch::relu_backward(
            backend,
            &grad_output.data,
            true,
            &input.value.data,
            &mut grad.data,
            negative_slope,
        );
        grad
    };

    (out, back)
}

/// Applies the plain ReLU `max(x, 0)` elementwise. Equivalent to [`leaky_relu`] with a zero
/// slope.
pub fn relu<T: Element>(
    input: &WithGrad<Tensor<T>>,
) -> (Tensor<T>, impl Fn(&Tensor<T>) -> Tensor<T> + '_) {
    leaky_relu(input, T::zero())
}
