//! Parallel CPU backend
//!
//! Splits buffers into fixed-size chunks and runs them on the `rayon` pool. Each chunk is
//! handed to the element type's chunk body ([`Element::forward_chunk`] and friends), which is
//! the scalar reference loop or, with the `simd` feature on an AVX2 target, a vectorised
//! loop computing the same expression.
//!
//! ## Design Goals
//!
//! - Bit-identical results to [`super::reference`] regardless of scheduling
//! - No allocation; chunks are disjoint sub-slices of the caller's buffers
//! - Small buffers skip the pool entirely
//!
//! ## Safety
//!
//! - SIMD paths use `unsafe` blocks and require an AVX2-capable CPU at compile time

use rayon::prelude::*;

use super::ReluKernel;
use crate::element::Element;

/// Elements per parallel work item.
pub const CHUNK_LEN: usize = 4096;

/// Buffers at or below this length run on the calling thread.
pub const PARALLEL_THRESHOLD: usize = 4 * CHUNK_LEN;

/// The multi-threaded CPU backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parallel;

impl<T: Element> ReluKernel<T> for Parallel {
    fn forward(&self, input: &[T], output: &mut [T], negative_slope: T) {
        assert_eq!(input.len(), output.len(), "relu forward: buffer length mismatch");

        if output.len() <= PARALLEL_THRESHOLD {
            T::forward_chunk(input, output, negative_slope);
            return;
        }

        output
            .par_chunks_mut(CHUNK_LEN)
            .zip(input.par_chunks(CHUNK_LEN))
            .for_each(|(out_chunk, in_chunk)| T::forward_chunk(in_chunk, out_chunk, negative_slope));
    }

    fn forward_in_place(&self, data: &mut [T], negative_slope: T) {
        if data.len() <= PARALLEL_THRESHOLD {
            T::forward_chunk_in_place(data, negative_slope);
            return;
        }

        data.par_chunks_mut(CHUNK_LEN)
            .for_each(|chunk| T::forward_chunk_in_place(chunk, negative_slope));
    }

    fn backward(&self, top_diff: &[T], bottom_data: &[T], bottom_diff: &mut [T], negative_slope: T) {
        assert_eq!(top_diff.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
        assert_eq!(bottom_data.len(), bottom_diff.len(), "relu backward: buffer length mismatch");

        if bottom_diff.len() <= PARALLEL_THRESHOLD {
            T::backward_chunk(top_diff, bottom_data, bottom_diff, negative_slope);
            return;
        }

        bottom_diff
            .par_chunks_mut(CHUNK_LEN)
            .zip(bottom_data.par_chunks(CHUNK_LEN))
            .zip(top_diff.par_chunks(CHUNK_LEN))
            .for_each(|((g, x), dy)| T::backward_chunk(dy, x, g, negative_slope));
    }

    fn backward_in_place(&self, diff: &mut [T], bottom_data: &[T], negative_slope: T) {
        assert_eq!(bottom_data.len(), diff.len(), "relu backward: buffer length mismatch");

        if diff.len() <= PARALLEL_THRESHOLD {
            T::backward_chunk_in_place(diff, bottom_data, negative_slope);
            return;
        }

        diff.par_chunks_mut(CHUNK_LEN)
            .zip(bottom_data.par_chunks(CHUNK_LEN))
            .for_each(|(g, x)| T::backward_chunk_in_place(g, x, negative_slope));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::reference::Reference;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_buffer(rng: &mut StdRng, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| match i % 97 {
                // keep exact zeros and signed zeros in the mix
                0 => 0.0,
                1 => -0.0,
                _ => rng.random_range(-5.0..5.0),
            })
            .collect()
    }

    fn assert_bit_identical<T: Element>(a: &[T], b: &[T]) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            let same = (x.is_nan() && y.is_nan())
                || (x == y && x.is_sign_negative() == y.is_sign_negative());
            assert!(same, "mismatch at {i}: {x:?} vs {y:?}");
        }
    }

    #[test]
    fn parallel_forward_matches_reference_on_large_buffers() {
        let mut rng = StdRng::seed_from_u64(7);
        // not a multiple of the chunk or lane width
        let len = PARALLEL_THRESHOLD * 3 + 13;
        let input = random_buffer(&mut rng, len);

        for slope in [0.0, 0.01, -0.5, 3.0] {
            let mut expected = vec![0.0; len];
            let mut actual = vec![0.0; len];
            Reference.forward(&input, &mut expected, slope);
            Parallel.forward(&input, &mut actual, slope);
            assert_bit_identical(&expected, &actual);

            let mut in_place = input.clone();
            Parallel.forward_in_place(&mut in_place, slope);
            assert_bit_identical(&expected, &in_place);
        }
    }

    #[test]
    fn parallel_backward_matches_reference_on_large_buffers() {
        let mut rng = StdRng::seed_from_u64(11);
        let len = PARALLEL_THRESHOLD * 2 + 5;
        let input = random_buffer(&mut rng, len);
        let top_diff = random_buffer(&mut rng, len);

        for slope in [0.0, 0.2, -1.5] {
            let mut expected = vec![0.0; len];
            let mut actual = vec![0.0; len];
            Reference.backward(&top_diff, &input, &mut expected, slope);
            Parallel.backward(&top_diff, &input, &mut actual, slope);
            assert_bit_identical(&expected, &actual);

            let mut in_place = top_diff.clone();
            Parallel.backward_in_place(&mut in_place, &input, slope);
            assert_bit_identical(&expected, &in_place);
        }
    }

    #[test]
    fn small_f32_buffers_match_reference() {
        let input = [-3.5f32, -0.0, 0.0, 0.25, f32::NAN, 9.0, -1.0, 2.0, -7.0, 1.0e-40];
        let mut expected = [0.0f32; 10];
        let mut actual = [0.0f32; 10];
        Reference.forward(&input, &mut expected, 0.3);
        Parallel.forward(&input, &mut actual, 0.3);
        assert_bit_identical(&expected, &actual);

        let dy = [1.0f32; 10];
        Reference.backward(&dy, &input, &mut expected, 0.3);
        Parallel.backward(&dy, &input, &mut actual, 0.3);
        assert_bit_identical(&expected, &actual);
    }

    #[test]
    #[should_panic(expected = "relu backward: buffer length mismatch")]
    fn backward_panics_on_length_mismatch() {
        let mut grad = vec![0.0f64; 4];
        Parallel.backward(&[1.0; 4], &[1.0; 3], &mut grad, 0.0);
    }
}
