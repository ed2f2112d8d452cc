//! CPU-feature-dispatched DSP kernel registry.
//!
//! Each primitive is a small free function (`boxcar`, `preamble`,
//! `mean_power`) backed by a [`dispatch::Dispatcher`] that selects among
//! registered implementations the first time it is called, then caches the
//! choice. A wisdom file can re-rank a primitive's registry before first
//! use; see [`wisdom`].

pub mod dispatch;
pub mod kernels;
pub mod scalar;
pub mod simd;
pub mod wisdom;

pub use kernels::{boxcar, mean_power, preamble};
