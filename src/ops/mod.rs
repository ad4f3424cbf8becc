//! # Kernel Backends
//!
//! This module defines the activation kernel interface and its backends.
//!
//! ## Submodules
//!
//! - [`reference`] — Sequential scalar loops defining the exact semantics
//! - [`cpu`] — Multi-threaded CPU kernel with optional AVX2 bodies (default backend)
//! - [`wgpu`] *(opt-in)* — GPU compute shader kernel using `wgpu`
//! - [`dispatch`] — Backend selection and the `propagate_down` gate
//!
//! ## Backend Contract
//!
//! - CPU backends are bit-identical to [`reference`] for every input, NaN included.
//! - The GPU backend matches the comparison branches (`x > 0`, `x <= 0`) but may round the
//!   multiply-add differently, and only runs on `f32` buffers.
//! - Kernels never allocate on the CPU path and never resize the caller's buffers.
//!
//! ## Feature Flags
//!
//! - `simd` — Enables AVX2 chunk bodies in the CPU backend
//! - `wgpu` — Enables the `wgpu` (WebGPU) backend

use crate::element::Element;

pub mod cpu;
pub mod dispatch;
pub mod reference;
#[cfg(feature = "wgpu")]
pub mod wgpu;

/// One implementation of the activation's forward and backward passes.
///
/// `count` is the length of the slices. Implementations panic when the buffers of a call
/// differ in length.
pub trait ReluKernel<T: Element> {
    /// `output[i] = max(input[i], 0) + negative_slope * min(input[i], 0)`.
    fn forward(&self, input: &[T], output: &mut [T], negative_slope: T);

    /// Forward pass where input and output are the same buffer.
    fn forward_in_place(&self, data: &mut [T], negative_slope: T);

    /// `bottom_diff[i] = top_diff[i] * ([x > 0] + negative_slope * [x <= 0])` with
    /// `x = bottom_data[i]`.
    fn backward(&self, top_diff: &[T], bottom_data: &[T], bottom_diff: &mut [T], negative_slope: T);

    /// Backward pass where `diff` holds the upstream gradient and receives the input
    /// gradient.
    fn backward_in_place(&self, diff: &mut [T], bottom_data: &[T], negative_slope: T);
}
