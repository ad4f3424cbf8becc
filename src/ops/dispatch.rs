//! Kernel Dispatch Layer
//!
//! Maps a [`Backend`] to its kernel and applies the backward `propagate_down` gate.
//!
//! - `Backend::Reference` → [`Reference`]
//! - `Backend::Cpu` → [`Parallel`]
//! - `Backend::Wgpu` → `Gpu` when the `wgpu` feature is enabled, otherwise [`Parallel`]
//!
//! The GPU kernel itself falls back to [`Parallel`] for non-`f32` buffers and on dispatch
//! failures, so every call here completes.
//!
//! # Example
//! ```rust
//! use relu_layer::backend::Backend;
//! use relu_layer::ops::dispatch::{relu_backward, relu_forward};
//!
//! let input = [-2.0f32, -1.0, 0.0, 1.0, 2.0];
//! let mut output = [0.0f32; 5];
//! relu_forward(Backend::Cpu, &input, &mut output, 0.1);
//!
//! let mut grad = [0.0f32; 5];
//! relu_backward(Backend::Cpu, &[1.0; 5], true, &input, &mut grad, 0.1);
//! assert_eq!(grad, [0.1, 0.1, 0.1, 1.0, 1.0]);
//! ```

use super::ReluKernel;
use super::cpu::Parallel;
use super::reference::Reference;
use crate::backend::Backend;
use crate::element::Element;

/// Resolves `backend` to the kernel that serves it.
pub fn kernel<T: Element>(backend: Backend) -> &'static dyn ReluKernel<T> {
    match backend {
        Backend::Reference => &Reference,
        Backend::Cpu => &Parallel,
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                &super::wgpu::Gpu
            }
            #[cfg(not(feature = "wgpu"))]
            {
                log::debug!("wgpu feature disabled, relu runs on the parallel CPU backend");
                &Parallel
            }
        }
    }
}

/// Forward pass: `output[i] = max(input[i], 0) + negative_slope * min(input[i], 0)`.
///
/// # Panics
/// Panics if the buffers differ in length.
pub fn relu_forward<T: Element>(backend: Backend, input: &[T], output: &mut [T], negative_slope: T) {
    kernel::<T>(backend).forward(input, output, negative_slope);
}

/// Forward pass with input and output sharing `data`.
pub fn relu_forward_in_place<T: Element>(backend: Backend, data: &mut [T], negative_slope: T) {
    kernel::<T>(backend).forward_in_place(data, negative_slope);
}

/// Backward pass into `bottom_diff`.
///
/// With `propagate_down == false` nothing is computed and `bottom_diff` is left untouched.
///
/// # Panics
/// Panics if the buffers differ in length and `propagate_down` is set.
pub fn relu_backward<T: Element>(
    backend: Backend,
    top_diff: &[T],
    propagate_down: bool,
    bottom_data: &[T],
    bottom_diff: &mut [T],
    negative_slope: T,
) {
    if !propagate_down {
        return;
    }
    kernel::<T>(backend).backward(top_diff, bottom_data, bottom_diff, negative_slope);
}

/// Backward pass with `diff` holding the upstream gradient on entry and the input gradient
/// on return.
///
/// With `propagate_down == false`, `diff` is left untouched.
pub fn relu_backward_in_place<T: Element>(
    backend: Backend,
    diff: &mut [T],
    propagate_down: bool,
    bottom_data: &[T],
    negative_slope: T,
) {
    if !propagate_down {
        return;
    }
    kernel::<T>(backend).backward_in_place(diff, bottom_data, negative_slope);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagate_down_false_leaves_gradient_untouched() {
        let input = [-2.0f64, -1.0, 0.0, 1.0, 2.0];
        for backend in [Backend::Reference, Backend::Cpu, Backend::Wgpu] {
            let mut grad = [-999.0; 5];
            relu_backward(backend, &[1.0; 5], false, &input, &mut grad, 0.1);
            assert_eq!(grad, [-999.0; 5]);

            let mut diff = [-999.0; 5];
            relu_backward_in_place(backend, &mut diff, false, &input, 0.1);
            assert_eq!(diff, [-999.0; 5]);
        }
    }

    #[test]
    fn every_backend_serves_f64() {
        let input = [-4.0f64, 0.0, 4.0];
        for backend in [Backend::Reference, Backend::Cpu, Backend::Wgpu] {
            let mut out = [0.0; 3];
            relu_forward(backend, &input, &mut out, 0.5);
            assert_eq!(out, [-2.0, 0.0, 4.0], "{backend:?}");
        }
    }
}
