//! Backend selection module.
//!
//! This module defines the available kernel backends and provides functions to set and get
//! the process-wide default.
//!
//! # Supported Backends
//!
//! - `Reference` — Sequential scalar loop; the semantics every other backend follows.
//! - `Cpu` — Multi-threaded `rayon` kernel with optional AVX2 bodies (default).
//! - `Wgpu` — GPU compute shader (requires the `wgpu` feature; `f32` only).
//!
//! The default is stored globally using an `AtomicU8`, enabling fast switching at runtime.
//! A layer may pin its own backend through [`crate::layer::ReluParam::engine`], which takes
//! precedence over the global value.

use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of supported kernel backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Backend {
    /// Sequential scalar reference kernel.
    Reference = 0,
    /// Parallel CPU kernel (default).
    #[default]
    Cpu,
    /// GPU-accelerated kernel using `wgpu`.
    Wgpu,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Reference),
            1 => Ok(Self::Cpu),
            2 => Ok(Self::Wgpu),
            _ => Err(()),
        }
    }
}

/// Internal global state for the default backend.
///
/// The backend is only expected to change rarely, between passes rather than during one.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the default backend for layers without an explicit engine.
///
/// # Example
///
/// ```
/// use relu_layer::backend::{set_backend, Backend};
/// set_backend(Backend::Reference);
/// ```
pub fn set_backend(b: Backend) {
    log::debug!("default relu backend set to {b:?}");
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the current default backend.
///
/// If the stored value is invalid, defaults to [`Backend::Cpu`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips_and_rejects_unknown_values() {
        for b in [Backend::Reference, Backend::Cpu, Backend::Wgpu] {
            assert_eq!(Backend::try_from(b as u8), Ok(b));
        }
        assert_eq!(Backend::try_from(3), Err(()));
        assert_eq!(Backend::default(), Backend::Cpu);
    }
}
