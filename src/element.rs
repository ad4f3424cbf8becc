//! Floating-point element types accepted by the kernels.
//!
//! Every kernel is generic over [`Element`], which is implemented for `f32` and `f64`.
//! The trait carries the chunk-level entry points used by the parallel backend so that a
//! precision can swap in a vectorised body (AVX2, behind the `simd` feature) without the
//! backend knowing about it. The default bodies are the scalar reference loops.
//!
//! Vectorised bodies compute the exact same expression tree as the scalar loop
//! (`max + slope * min`, `dy * (gt + slope * le)`), without fused multiply-add, so results
//! are bit-identical to [`crate::ops::reference`].

use core::fmt::Debug;
use num_traits::Float;

use crate::ops::reference;

/// A floating-point precision the activation kernels can run on.
pub trait Element: Float + Debug + Send + Sync + 'static {
    /// Forward pass over one chunk, `input` and `output` of equal length.
    #[inline]
    fn forward_chunk(input: &[Self], output: &mut [Self], negative_slope: Self) {
        reference::forward(input, output, negative_slope);
    }

    /// Forward pass over one chunk, overwriting `data`.
    #[inline]
    fn forward_chunk_in_place(data: &mut [Self], negative_slope: Self) {
        reference::forward_in_place(data, negative_slope);
    }

    /// Backward pass over one chunk.
    #[inline]
    fn backward_chunk(
        top_diff: &[Self],
        bottom_data: &[Self],
        bottom_diff: &mut [Self],
        negative_slope: Self,
    ) {
        reference::backward(top_diff, bottom_data, bottom_diff, negative_slope);
    }

    /// Backward pass over one chunk where `diff` holds the upstream gradient on entry and
    /// the input gradient on return.
    #[inline]
    fn backward_chunk_in_place(diff: &mut [Self], bottom_data: &[Self], negative_slope: Self) {
        reference::backward_in_place(diff, bottom_data, negative_slope);
    }

    /// Views the slice as `f32` when that is the native element type.
    ///
    /// The GPU backend only runs on `f32` buffers; other precisions return `None` and are
    /// served by the CPU.
    fn as_f32_slice(data: &[Self]) -> Option<&[f32]>;

    /// Mutable counterpart of [`Element::as_f32_slice`].
    fn as_f32_slice_mut(data: &mut [Self]) -> Option<&mut [f32]>;
}

impl Element for f32 {
    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    fn forward_chunk(input: &[Self], output: &mut [Self], negative_slope: Self) {
        assert_eq!(input.len(), output.len(), "relu forward: buffer length mismatch");
        // SAFETY: both pointers cover `output.len()` elements.
        unsafe {
            avx2::forward_ps(input.as_ptr(), output.as_mut_ptr(), output.len(), negative_slope)
        }
    }

    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    fn forward_chunk_in_place(data: &mut [Self], negative_slope: Self) {
        let ptr = data.as_mut_ptr();
        // SAFETY: each lane group is loaded before it is stored back.
        unsafe { avx2::forward_ps(ptr, ptr, data.len(), negative_slope) }
    }

    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    fn backward_chunk(
        top_diff: &[Self],
        bottom_data: &[Self],
        bottom_diff: &mut [Self],
        negative_slope: Self,
    ) {
        assert_eq!(top_diff.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
        assert_eq!(bottom_data.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
        // SAFETY: all three pointers cover `bottom_diff.len()` elements.
        unsafe {
            avx2::backward_ps(
                top_diff.as_ptr(),
                bottom_data.as_ptr(),
                bottom_diff.as_mut_ptr(),
                bottom_diff.len(),
                negative_slope,
            )
        }
    }

    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    fn backward_chunk_in_place(diff: &mut [Self], bottom_data: &[Self], negative_slope: Self) {
        assert_eq!(bottom_data.len(), diff.len(), "relu backward: buffer length mismatch");
        let ptr = diff.as_mut_ptr();
        // SAFETY: each lane group of `diff` is loaded before it is stored back.
        unsafe { avx2::backward_ps(ptr, bottom_data.as_ptr(), ptr, diff.len(), negative_slope) }
    }

    fn as_f32_slice(data: &[Self]) -> Option<&[f32]> {
        Some(data)
    }

    fn as_f32_slice_mut(data: &mut [Self]) -> Option<&mut [f32]> {
        Some(data)
    }
}

impl Element for f64 {
    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    fn forward_chunk(input: &[Self], output: &mut [Self], negative_slope: Self) {
        assert_eq!(input.len(), output.len(), "relu forward: buffer length mismatch");
        // SAFETY: both pointers cover `output.len()` elements.
        unsafe {
            avx2::forward_pd(input.as_ptr(), output.as_mut_ptr(), output.len(), negative_slope)
        }
    }

    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    fn forward_chunk_in_place(data: &mut [Self], negative_slope: Self) {
        let ptr = data.as_mut_ptr();
        // SAFETY: each lane group is loaded before it is stored back.
        unsafe { avx2::forward_pd(ptr, ptr, data.len(), negative_slope) }
    }

    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    fn backward_chunk(
        top_diff: &[Self],
        bottom_data: &[Self],
        bottom_diff: &mut [Self],
        negative_slope: Self,
    ) {
        assert_eq!(top_diff.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
        assert_eq!(bottom_data.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
        // SAFETY: all three pointers cover `bottom_diff.len()` elements.
        unsafe {
            avx2::backward_pd(
                top_diff.as_ptr(),
                bottom_data.as_ptr(),
                bottom_diff.as_mut_ptr(),
                bottom_diff.len(),
                negative_slope,
            )
        }
    }

    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    fn backward_chunk_in_place(diff: &mut [Self], bottom_data: &[Self], negative_slope: Self) {
        assert_eq!(bottom_data.len(), diff.len(), "relu backward: buffer length mismatch");
        let ptr = diff.as_mut_ptr();
        // SAFETY: each lane group of `diff` is loaded before it is stored back.
        unsafe { avx2::backward_pd(ptr, bottom_data.as_ptr(), ptr, diff.len(), negative_slope) }
    }

    fn as_f32_slice(_data: &[Self]) -> Option<&[f32]> {
        None
    }

    fn as_f32_slice_mut(_data: &mut [Self]) -> Option<&mut [f32]> {
        None
    }
}

/// AVX2 bodies. Pointers may alias between the read and write side: every lane group is
/// fully loaded before the corresponding store.
///
/// `_mm256_max_*(zero, x)` evaluates `zero > x ? zero : x` and `_mm256_min_*(zero, x)`
/// evaluates `zero < x ? zero : x`, the same selection (including NaN and `-0.0`) as the
/// scalar helpers in [`crate::ops::reference`].
#[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
mod avx2 {
    use crate::ops::reference::{backward_value, forward_value};
    use core::arch::x86_64::*;

    pub(super) unsafe fn forward_pd(input: *const f64, output: *mut f64, len: usize, slope: f64) {
        const LANES: usize = 4;
        let mut i = 0;
        unsafe {
            let zero = _mm256_setzero_pd();
            let s = _mm256_set1_pd(slope);
            while i + LANES <= len {
                let x = _mm256_loadu_pd(input.add(i));
                let pos = _mm256_max_pd(zero, x);
                let neg = _mm256_min_pd(zero, x);
                _mm256_storeu_pd(output.add(i), _mm256_add_pd(pos, _mm256_mul_pd(s, neg)));
                i += LANES;
            }
            while i < len {
                *output.add(i) = forward_value(*input.add(i), slope);
                i += 1;
            }
        }
    }

    pub(super) unsafe fn backward_pd(
        top_diff: *const f64,
        bottom_data: *const f64,
        bottom_diff: *mut f64,
        len: usize,
        slope: f64,
    ) {
        const LANES: usize = 4;
        let mut i = 0;
        unsafe {
            let zero = _mm256_setzero_pd();
            let one = _mm256_set1_pd(1.0);
            let s = _mm256_set1_pd(slope);
            while i + LANES <= len {
                let dy = _mm256_loadu_pd(top_diff.add(i));
                let x = _mm256_loadu_pd(bottom_data.add(i));
                let gt = _mm256_and_pd(_mm256_cmp_pd(x, zero, _CMP_GT_OQ), one);
                let le = _mm256_and_pd(_mm256_cmp_pd(x, zero, _CMP_LE_OQ), one);
                let factor = _mm256_add_pd(gt, _mm256_mul_pd(s, le));
                _mm256_storeu_pd(bottom_diff.add(i), _mm256_mul_pd(dy, factor));
                i += LANES;
            }
            while i < len {
                *bottom_diff.add(i) = backward_value(*top_diff.add(i), *bottom_data.add(i), slope);
                i += 1;
            }
        }
    }

    pub(super) unsafe fn forward_ps(input: *const f32, output: *mut f32, len: usize, slope: f32) {
        const LANES: usize = 8;
        let mut i = 0;
        unsafe {
            let zero = _mm256_setzero_ps();
            let s = _mm256_set1_ps(slope);
            while i + LANES <= len {
                let x = _mm256_loadu_ps(input.add(i));
                let pos = _mm256_max_ps(zero, x);
                let neg = _mm256_min_ps(zero, x);
                _mm256_storeu_ps(output.add(i), _mm256_add_ps(pos, _mm256_mul_ps(s, neg)));
                i += LANES;
            }
            while i < len {
                *output.add(i) = forward_value(*input.add(i), slope);
                i += 1;
            }
        }
    }

    pub(super) unsafe fn backward_ps(
        top_diff: *const f32,
        bottom_data: *const f32,
        bottom_diff: *mut f32,
        len: usize,
        slope: f32,
    ) {
        const LANES: usize = 8;
        let mut i = 0;
        unsafe {
            let zero = _mm256_setzero_ps();
            let one = _mm256_set1_ps(1.0);
            let s = _mm256_set1_ps(slope);
            while i + LANES <= len {
                let dy = _mm256_loadu_ps(top_diff.add(i));
                let x = _mm256_loadu_ps(bottom_data.add(i));
                let gt = _mm256_and_ps(_mm256_cmp_ps(x, zero, _CMP_GT_OQ), one);
                let le = _mm256_and_ps(_mm256_cmp_ps(x, zero, _CMP_LE_OQ), one);
                let factor = _mm256_add_ps(gt, _mm256_mul_ps(s, le));
                _mm256_storeu_ps(bottom_diff.add(i), _mm256_mul_ps(dy, factor));
                i += LANES;
            }
            while i < len {
                *bottom_diff.add(i) = backward_value(*top_diff.add(i), *bottom_data.add(i), slope);
                i += 1;
            }
        }
    }
}
