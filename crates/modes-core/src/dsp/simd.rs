//! CPU-feature-gated flavors of the DSP primitives. Each flavor must agree
//! with [`super::scalar`] sample-for-sample (mean/power reductions agree to
//! within ordinary floating-point summation error). Feature probes are
//! cached the same way the scalar dispatch does: the `is_*_feature_detected!`
//! check itself is cheap and side-effect free, so no extra caching layer is
//! needed beyond the dispatcher's own one-shot selection.

#[cfg(target_arch = "x86_64")]
pub mod x86 {
    use std::arch::x86_64::*;

    pub fn avx2_available() -> bool {
        is_x86_feature_detected!("avx2")
    }

    /// AVX2 mean level / mean power reduction. Widens four `u16` lanes to
    /// `u64` at a time to avoid overflow in the power accumulator
    /// (`65535^2` already exceeds `i32::MAX`).
    pub fn mean_power_u16_avx2(input: &[u16]) -> (f64, f64) {
        unsafe { mean_power_u16_avx2_impl(input) }
    }

    #[target_feature(enable = "avx2")]
    unsafe fn mean_power_u16_avx2_impl(input: &[u16]) -> (f64, f64) {
        let n = input.len();
        if n == 0 {
            return (0.0, 0.0);
        }
        let lanes = 4;
        let simd_len = n - (n % lanes);
        let mut level_acc = _mm256_setzero_si256();
        let mut power_acc = _mm256_setzero_si256();
        let mut i = 0;
        while i < simd_len {
            let raw = _mm_loadl_epi64(input.as_ptr().add(i) as *const __m128i);
            let widened32 = _mm_cvtepu16_epi32(raw);
            let widened64 = _mm256_cvtepu32_epi64(widened32);
            level_acc = _mm256_add_epi64(level_acc, widened64);
            let squared32 = _mm_mullo_epi32(widened32, widened32);
            let squared64 = _mm256_cvtepu32_epi64(squared32);
            power_acc = _mm256_add_epi64(power_acc, squared64);
            i += lanes;
        }
        let mut level_buf = [0i64; 4];
        let mut power_buf = [0i64; 4];
        _mm256_storeu_si256(level_buf.as_mut_ptr() as *mut __m256i, level_acc);
        _mm256_storeu_si256(power_buf.as_mut_ptr() as *mut __m256i, power_acc);
        let mut sum_level: i64 = level_buf.iter().sum();
        let mut sum_power: i64 = power_buf.iter().sum();
        for &v in &input[simd_len..] {
            sum_level += v as i64;
            sum_power += (v as i64) * (v as i64);
        }
        let n_f = n as f64;
        (sum_level as f64 / 65535.0 / n_f, sum_power as f64 / (65535.0 * 65535.0) / n_f)
    }

    /// Boxcar smoothing compiled under AVX2 target features so the sliding
    /// sum autovectorizes; the algorithm is identical to the scalar one.
    pub fn boxcar_u16_avx2(input: &[u16], window: usize, out: &mut [u16]) {
        unsafe { boxcar_u16_avx2_impl(input, window, out) }
    }

    #[target_feature(enable = "avx2")]
    unsafe fn boxcar_u16_avx2_impl(input: &[u16], window: usize, out: &mut [u16]) {
        super::super::scalar::boxcar_u16(input, window, out)
    }

    /// Preamble correlator compiled under AVX2 target features; algorithm
    /// identical to the scalar one (the gather pattern over `P_k`/`Q_k`
    /// offsets does not vectorize cleanly, so this flavor's value is solely
    /// in being compiled against the wider AVX2 calling convention/ISA
    /// baseline, matching how the registry elsewhere ships architecture
    /// specific builds of otherwise-identical algorithms).
    pub fn preamble_u16_avx2(input: &[u16], samples_per_symbol: usize, out: &mut [u16]) {
        unsafe { preamble_u16_avx2_impl(input, samples_per_symbol, out) }
    }

    #[target_feature(enable = "avx2")]
    unsafe fn preamble_u16_avx2_impl(input: &[u16], samples_per_symbol: usize, out: &mut [u16]) {
        super::super::scalar::preamble_u16(input, samples_per_symbol, out)
    }
}

#[cfg(target_arch = "aarch64")]
pub mod neon {
    use std::arch::aarch64::*;

    pub fn neon_available() -> bool {
        std::arch::is_aarch64_feature_detected!("neon")
    }

    pub fn mean_power_u16_neon(input: &[u16]) -> (f64, f64) {
        unsafe { mean_power_u16_neon_impl(input) }
    }

    #[target_feature(enable = "neon")]
    unsafe fn mean_power_u16_neon_impl(input: &[u16]) -> (f64, f64) {
        let n = input.len();
        if n == 0 {
            return (0.0, 0.0);
        }
        let lanes = 4;
        let simd_len = n - (n % lanes);
        let mut level_vec = vdupq_n_u64(0);
        let mut power_vec = vdupq_n_u64(0);
        let mut i = 0;
        while i < simd_len {
            let raw = vld1_u16(input.as_ptr().add(i));
            let widened32 = vmovl_u16(raw);
            let widened64_lo = vmovl_u32(vget_low_u32(widened32));
            let widened64_hi = vmovl_u32(vget_high_u32(widened32));
            level_vec = vaddq_u64(level_vec, vaddq_u64(widened64_lo, widened64_hi));
            let squared32 = vmulq_u32(widened32, widened32);
            let squared64_lo = vmovl_u32(vget_low_u32(squared32));
            let squared64_hi = vmovl_u32(vget_high_u32(squared32));
            power_vec = vaddq_u64(power_vec, vaddq_u64(squared64_lo, squared64_hi));
            i += lanes;
        }
        let mut level_buf = [0u64; 2];
        let mut power_buf = [0u64; 2];
        vst1q_u64(level_buf.as_mut_ptr(), level_vec);
        vst1q_u64(power_buf.as_mut_ptr(), power_vec);
        let mut sum_level: u64 = level_buf.iter().sum();
        let mut sum_power: u64 = power_buf.iter().sum();
        for &v in &input[simd_len..] {
            sum_level += v as u64;
            sum_power += (v as u64) * (v as u64);
        }
        let n_f = n as f64;
        (sum_level as f64 / 65535.0 / n_f, sum_power as f64 / (65535.0 * 65535.0) / n_f)
    }

    pub fn boxcar_u16_neon(input: &[u16], window: usize, out: &mut [u16]) {
        unsafe { boxcar_u16_neon_impl(input, window, out) }
    }

    #[target_feature(enable = "neon")]
    unsafe fn boxcar_u16_neon_impl(input: &[u16], window: usize, out: &mut [u16]) {
        super::super::scalar::boxcar_u16(input, window, out)
    }

    pub fn preamble_u16_neon(input: &[u16], samples_per_symbol: usize, out: &mut [u16]) {
        unsafe { preamble_u16_neon_impl(input, samples_per_symbol, out) }
    }

    #[target_feature(enable = "neon")]
    unsafe fn preamble_u16_neon_impl(input: &[u16], samples_per_symbol: usize, out: &mut [u16]) {
        super::super::scalar::preamble_u16(input, samples_per_symbol, out)
    }
}

#[cfg(test)]
mod tests {
    #[cfg(target_arch = "x86_64")]
    #[test]
    fn avx2_mean_power_matches_scalar_when_available() {
        if !super::x86::avx2_available() {
            return;
        }
        let input: Vec<u16> = (0..257).map(|i| (i * 251 % 65536) as u16).collect();
        let scalar = crate::dsp::scalar::mean_power_u16(&input);
        let simd = super::x86::mean_power_u16_avx2(&input);
        assert!((scalar.0 - simd.0).abs() < 1e-9);
        assert!((scalar.1 - simd.1).abs() < 1e-9);
    }
}
