//! relu_layer: the rectified-linear / leaky-ReLU activation layer.
//!
//! Applies `y = max(x, 0) + negative_slope * min(x, 0)` elementwise in the forward pass and
//! `dx = dy * ([x > 0] + negative_slope * [x <= 0])` in the backward pass, over flat buffers
//! of any precision implementing [`element::Element`] (`f32`, `f64`).
//!
//! # Features
//!
//! - A sequential reference kernel defining the exact semantics, including the zero-input
//!   convention of the backward pass.
//! - A parallel `rayon` kernel with optional AVX2 bodies, bit-identical to the reference.
//! - An optional `wgpu` compute-shader kernel for `f32` buffers.
//! - Backend selection per process or per layer.
//!
//! # Modules
//!
//! - [`layer`] — `ReluLayer` over blobs, with its configuration and errors.
//! - [`ops`] — Kernel trait, backends and dispatch over raw slices.
//! - [`backend`] — The process-wide default backend.
//! - [`backprop`] — Closure-style forward/backward helpers.
//! - [`tensors`] — `Tensor` and `WithGrad` containers.
//! - [`approx`] — Tolerance grading for comparing backends.
//!
//! # Example
//!
//! ```rust
//! use relu_layer::backend::Backend;
//! use relu_layer::ops::dispatch::relu_forward_in_place;
//!
//! let mut data = vec![-2.0f64, -1.0, 0.0, 1.0, 2.0];
//! relu_forward_in_place(Backend::Cpu, &mut data, 0.0);
//! assert_eq!(data, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
//! ```

pub mod approx;
pub mod backend;
pub mod backprop;
pub mod element;
pub mod layer;
pub mod ops;
pub mod tensors;

pub use element::Element;
pub use layer::{LayerError, ReluLayer, ReluParam};
