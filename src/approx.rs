//! Utilities to approximate equality of floating point buffers.
//!
//! The CPU backends are bit-identical to the reference kernel, but the GPU backend may round
//! the multiply-add differently. These helpers grade how close two buffers are.

use crate::element::Element;

/// The max epsilon accepted on `f32`s.
pub const F32_MAX_ERROR: f32 = 1e-3;

/// The best expected epsilon accepted on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// The max epsilon accepted on `f64`s.
pub const F64_MAX_ERROR: f64 = 1e-3;

/// The best expected epsilon accepted on `f64`s.
pub const F64_MIN_ERROR: f64 = 1e-13;

/// The approximated equality enumerated.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Bitwise equal, or both NaN.
    Exact = 0,

    /// Within the best expected epsilon.
    Precise = 1,

    /// Within the max epsilon.
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Per-precision tolerances.
pub trait Tolerance: Element {
    /// Differences below this grade as [`ApproxEquality::Precise`].
    const MIN_ERROR: Self;
    /// Differences below this grade as [`ApproxEquality::Relative`].
    const MAX_ERROR: Self;
}

impl Tolerance for f32 {
    const MIN_ERROR: Self = F32_MIN_ERROR;
    const MAX_ERROR: Self = F32_MAX_ERROR;
}

impl Tolerance for f64 {
    const MIN_ERROR: Self = F64_MIN_ERROR;
    const MAX_ERROR: Self = F64_MAX_ERROR;
}

/// Grades a single pair of values, scaling the epsilon by the larger magnitude above 1.
pub fn grade<T: Tolerance>(a: T, b: T) -> ApproxEquality {
    if a == b || (a.is_nan() && b.is_nan()) {
        return ApproxEquality::Exact;
    }
    let scale = T::one().max(a.abs()).max(b.abs());
    let dif = (a - b).abs() / scale;

    if dif < T::MIN_ERROR {
        ApproxEquality::Precise
    } else if dif < T::MAX_ERROR {
        ApproxEquality::Relative
    } else {
        ApproxEquality::Scarce
    }
}

/// Grades two buffers by their worst element. Buffers of different length are
/// [`ApproxEquality::Scarce`].
pub fn grade_slices<T: Tolerance>(a: &[T], b: &[T]) -> ApproxEquality {
    if a.len() != b.len() {
        return ApproxEquality::Scarce;
    }
    a.iter()
        .zip(b)
        .map(|(&x, &y)| grade(x, y))
        .max()
        .unwrap_or(ApproxEquality::Exact)
}

/// Returns `true` when every element pair is at worst [`ApproxEquality::Precise`].
pub fn approx_eq<T: Tolerance>(a: &[T], b: &[T]) -> bool {
    grade_slices(a, b) <= ApproxEquality::Precise
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_are_ordered_by_distance() {
        assert_eq!(grade(1.0f32, 1.0), ApproxEquality::Exact);
        assert_eq!(grade(f64::NAN, f64::NAN), ApproxEquality::Exact);
        assert_eq!(grade(1.0f32, 1.0 + 1e-7), ApproxEquality::Precise);
        assert_eq!(grade(1.0f64, 1.0001), ApproxEquality::Relative);
        assert_eq!(grade(1.0f64, 2.0), ApproxEquality::Scarce);
    }

    #[test]
    fn slices_take_the_worst_grade() {
        assert!(approx_eq(&[0.1f32, 0.2][..], &[0.1, 0.2][..]));
        assert!(!approx_eq(&[0.1f32, 0.2][..], &[0.1, 0.3][..]));
        assert!(!approx_eq(&[0.1f32][..], &[0.1, 0.1][..]));
        assert_eq!(grade_slices::<f64>(&[], &[]), ApproxEquality::Exact);
    }
}
