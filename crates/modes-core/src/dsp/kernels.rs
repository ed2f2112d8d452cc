//! Concrete dispatchers for the three primitives the demodulator drives
//! directly: `boxcar_u16`, `preamble_u16`, `mean_power_u16`. Converter
//! magnitude primitives live in [`crate::convert`] rather than here, since
//! they are selected once per stream by format rather than re-dispatched
//! per call; folding them into this registry too would only duplicate the
//! same one-shot-cache machinery for no behavioral difference.

use std::sync::OnceLock;

use super::dispatch::{AnyDispatcher, Dispatcher, KernelEntry};
use super::scalar;

pub type BoxcarFn = fn(&[u16], usize, &mut [u16]);
pub type PreambleFn = fn(&[u16], usize, &mut [u16]);
pub type MeanPowerFn = fn(&[u16]) -> (f64, f64);

fn boxcar_dispatcher() -> &'static Dispatcher<BoxcarFn> {
    static D: OnceLock<Dispatcher<BoxcarFn>> = OnceLock::new();
    D.get_or_init(|| {
        let mut entries = vec![KernelEntry { rank: 0, impl_name: "scalar", flavor: "scalar", probe: None, f: scalar::boxcar_u16 as BoxcarFn }];
        #[cfg(target_arch = "x86_64")]
        entries.push(KernelEntry {
            rank: 0,
            impl_name: "x86_64_avx2",
            flavor: "avx2",
            probe: Some(super::simd::x86::avx2_available),
            f: super::simd::x86::boxcar_u16_avx2 as BoxcarFn,
        });
        #[cfg(target_arch = "aarch64")]
        entries.push(KernelEntry {
            rank: 0,
            impl_name: "aarch64_neon",
            flavor: "neon",
            probe: Some(super::simd::neon::neon_available),
            f: super::simd::neon::boxcar_u16_neon as BoxcarFn,
        });
        Dispatcher::new("boxcar_u16", entries)
    })
}

fn preamble_dispatcher() -> &'static Dispatcher<PreambleFn> {
    static D: OnceLock<Dispatcher<PreambleFn>> = OnceLock::new();
    D.get_or_init(|| {
        let mut entries =
            vec![KernelEntry { rank: 0, impl_name: "scalar", flavor: "scalar", probe: None, f: scalar::preamble_u16 as PreambleFn }];
        #[cfg(target_arch = "x86_64")]
        entries.push(KernelEntry {
            rank: 0,
            impl_name: "x86_64_avx2",
            flavor: "avx2",
            probe: Some(super::simd::x86::avx2_available),
            f: super::simd::x86::preamble_u16_avx2 as PreambleFn,
        });
        #[cfg(target_arch = "aarch64")]
        entries.push(KernelEntry {
            rank: 0,
            impl_name: "aarch64_neon",
            flavor: "neon",
            probe: Some(super::simd::neon::neon_available),
            f: super::simd::neon::preamble_u16_neon as PreambleFn,
        });
        Dispatcher::new("preamble_u16", entries)
    })
}

fn mean_power_dispatcher() -> &'static Dispatcher<MeanPowerFn> {
    static D: OnceLock<Dispatcher<MeanPowerFn>> = OnceLock::new();
    D.get_or_init(|| {
        let mut entries =
            vec![KernelEntry { rank: 0, impl_name: "scalar", flavor: "scalar", probe: None, f: scalar::mean_power_u16 as MeanPowerFn }];
        #[cfg(target_arch = "x86_64")]
        entries.push(KernelEntry {
            rank: 0,
            impl_name: "x86_64_avx2",
            flavor: "avx2",
            probe: Some(super::simd::x86::avx2_available),
            f: super::simd::x86::mean_power_u16_avx2 as MeanPowerFn,
        });
        #[cfg(target_arch = "aarch64")]
        entries.push(KernelEntry {
            rank: 0,
            impl_name: "aarch64_neon",
            flavor: "neon",
            probe: Some(super::simd::neon::neon_available),
            f: super::simd::neon::mean_power_u16_neon as MeanPowerFn,
        });
        Dispatcher::new("mean_power_u16", entries)
    })
}

/// All primitive dispatchers, for `wisdom`/`bench` subcommands that need to
/// iterate every primitive generically.
pub fn all_dispatchers() -> Vec<&'static dyn AnyDispatcher> {
    vec![boxcar_dispatcher(), preamble_dispatcher(), mean_power_dispatcher()]
}

pub fn boxcar(input: &[u16], window: usize, out: &mut [u16]) {
    (boxcar_dispatcher().get())(input, window, out)
}

pub fn preamble(input: &[u16], samples_per_symbol: usize, out: &mut [u16]) {
    (preamble_dispatcher().get())(input, samples_per_symbol, out)
}

pub fn mean_power(input: &[u16]) -> (f64, f64) {
    (mean_power_dispatcher().get())(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxcar_dispatch_matches_scalar_reference() {
        let input: Vec<u16> = (0..40).map(|i| (i * 123) as u16).collect();
        let window = 5;
        let mut via_dispatch = vec![0u16; input.len()];
        let mut via_scalar = vec![0u16; input.len()];
        boxcar(&input, window, &mut via_dispatch);
        scalar::boxcar_u16(&input, window, &mut via_scalar);
        assert_eq!(via_dispatch, via_scalar);
    }

    #[test]
    fn mean_power_dispatch_matches_scalar_reference() {
        let input: Vec<u16> = (0..1000).map(|i| (i * 17 % 65536) as u16).collect();
        assert_eq!(mean_power(&input), scalar::mean_power_u16(&input));
    }
}
