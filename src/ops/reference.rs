//! Sequential scalar kernels.
//!
//! These loops define the activation's semantics; every other backend is checked against
//! them. Forward evaluates
//!
//! `$$ y = \\max(x, 0) + s \\cdot \\min(x, 0) $$`
//!
//! and backward evaluates
//!
//! `$$ \\frac{\\partial L}{\\partial x} = \\frac{\\partial L}{\\partial y} \\cdot ([x > 0] + s \\cdot [x \\le 0]) $$`
//!
//! where `s` is the negative slope. An input of exactly zero takes the `s` branch in
//! backward.

use super::ReluKernel;
use crate::element::Element;

/// The sequential scalar backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reference;

impl<T: Element> ReluKernel<T> for Reference {
    fn forward(&self, input: &[T], output: &mut [T], negative_slope: T) {
        forward(input, output, negative_slope);
    }

    fn forward_in_place(&self, data: &mut [T], negative_slope: T) {
        forward_in_place(data, negative_slope);
    }

    fn backward(&self, top_diff: &[T], bottom_data: &[T], bottom_diff: &mut [T], negative_slope: T) {
        backward(top_diff, bottom_data, bottom_diff, negative_slope);
    }

    fn backward_in_place(&self, diff: &mut [T], bottom_data: &[T], negative_slope: T) {
        backward_in_place(diff, bottom_data, negative_slope);
    }
}

/// `max(x, 0)` selecting `x` unless `x < 0`, so NaN passes through.
#[inline(always)]
fn max_zero<T: Element>(x: T) -> T {
    if x < T::zero() { T::zero() } else { x }
}

/// `min(x, 0)` selecting `x` unless `x > 0`, so NaN passes through.
#[inline(always)]
fn min_zero<T: Element>(x: T) -> T {
    if x > T::zero() { T::zero() } else { x }
}

#[inline(always)]
fn indicator<T: Element>(b: bool) -> T {
    if b { T::one() } else { T::zero() }
}

/// Forward activation of a single value.
#[inline(always)]
pub fn forward_value<T: Element>(x: T, negative_slope: T) -> T {
    max_zero(x) + negative_slope * min_zero(x)
}

/// Input gradient of a single value given the upstream gradient `dy`.
#[inline(always)]
pub fn backward_value<T: Element>(dy: T, x: T, negative_slope: T) -> T {
    dy * (indicator::<T>(x > T::zero()) + negative_slope * indicator::<T>(x <= T::zero()))
}

/// Writes the activation of `input` into `output`.
///
/// # Panics
/// Panics if the buffers differ in length.
pub fn forward<T: Element>(input: &[T], output: &mut [T], negative_slope: T) {
    assert_eq!(input.len(), output.len(), "relu forward: buffer length mismatch");
    output
        .iter_mut()
        .zip(input.iter())
        .for_each(|(y, &x)| *y = forward_value(x, negative_slope));
}

/// Replaces every value of `data` with its activation.
pub fn forward_in_place<T: Element>(data: &mut [T], negative_slope: T) {
    data.iter_mut()
        .for_each(|x| *x = forward_value(*x, negative_slope));
}

/// Writes the input gradient into `bottom_diff`.
///
/// # Panics
/// Panics if the buffers differ in length.
pub fn backward<T: Element>(top_diff: &[T], bottom_data: &[T], bottom_diff: &mut [T], negative_slope: T) {
    assert_eq!(top_diff.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
    assert_eq!(bottom_data.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
    bottom_diff
        .iter_mut()
        .zip(bottom_data.iter())
        .zip(top_diff.iter())
        .for_each(|((g, &x), &dy)| *g = backward_value(dy, x, negative_slope));
}

/// Replaces the upstream gradient held in `diff` with the input gradient.
///
/// # Panics
/// Panics if the buffers differ in length.
pub fn backward_in_place<T: Element>(diff: &mut [T], bottom_data: &[T], negative_slope: T) {
    assert_eq!(bottom_data.len(), diff.len(), "relu backward: buffer length mismatch");
    diff.iter_mut()
        .zip(bottom_data.iter())
        .for_each(|(g, &x)| *g = backward_value(*g, x, negative_slope));
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: [f64; 5] = [-2.0, -1.0, 0.0, 1.0, 2.0];

    #[test]
    fn plain_relu_zeroes_non_positive_inputs() {
        let mut out = [0.0; 5];
        forward(&INPUT, &mut out, 0.0);
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn leaky_relu_scales_negative_inputs() {
        let mut out = [0.0; 5];
        forward(&INPUT, &mut out, 0.1);
        assert_eq!(out, [-0.2, -0.1, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn backward_takes_slope_branch_at_zero() {
        let mut grad = [0.0; 5];
        backward(&[1.0; 5], &INPUT, &mut grad, 0.1);
        assert_eq!(grad, [0.1, 0.1, 0.1, 1.0, 1.0]);

        // plain relu blocks the gradient at exactly zero
        backward(&[3.0; 5], &INPUT, &mut grad, 0.0);
        assert_eq!(grad, [0.0, 0.0, 0.0, 3.0, 3.0]);
    }

    #[test]
    fn in_place_matches_out_of_place() {
        let mut data = INPUT;
        forward_in_place(&mut data, 0.25);
        let mut out = [0.0; 5];
        forward(&INPUT, &mut out, 0.25);
        assert_eq!(data, out);

        let mut diff = [2.0, -1.0, 4.0, 0.5, -3.0];
        let mut expected = [0.0; 5];
        backward(&diff, &INPUT, &mut expected, 0.25);
        backward_in_place(&mut diff, &INPUT, 0.25);
        assert_eq!(diff, expected);
    }

    #[test]
    fn nan_and_infinities() {
        let input = [f32::NAN, f32::INFINITY, f32::NEG_INFINITY];
        let mut out = [0.0f32; 3];
        forward(&input, &mut out, 0.5);
        assert!(out[0].is_nan());
        assert_eq!(out[1], f32::INFINITY);
        assert_eq!(out[2], f32::NEG_INFINITY);

        forward(&input, &mut out, 0.0);
        assert!(out[0].is_nan());
        assert_eq!(out[1], f32::INFINITY);
        // 0 * -inf
        assert!(out[2].is_nan());

        // NaN is neither > 0 nor <= 0
        let mut grad = [7.0f32; 3];
        backward(&[1.0; 3], &input, &mut grad, 0.5);
        assert_eq!(grad, [0.0, 1.0, 0.5]);
    }

    #[test]
    fn negative_zero_is_preserved_and_takes_slope_branch() {
        let mut out = [1.0f64];
        forward(&[-0.0], &mut out, 0.0);
        assert_eq!(out[0], 0.0);
        assert!(out[0].is_sign_negative());

        let mut grad = [0.0f64];
        backward(&[2.0], &[-0.0], &mut grad, 0.5);
        assert_eq!(grad, [1.0]);
    }

    #[test]
    #[should_panic(expected = "relu forward: buffer length mismatch")]
    fn forward_panics_on_length_mismatch() {
        let mut out = [0.0f32; 2];
        forward(&[1.0f32; 3], &mut out, 0.0);
    }
}
