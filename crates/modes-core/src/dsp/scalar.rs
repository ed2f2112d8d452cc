//! Scalar (always-available) reference implementations of the DSP
//! primitives. Every SIMD flavor must agree with these sample-for-sample,
//! modulo the rounding tolerance in invariant 1.

/// `out[i] = round(sum(in[i..i+window]) / window)` for `i in 0..in.len()-window+1`,
/// computed with an O(n) sliding-window accumulator.
pub fn boxcar_u16(input: &[u16], window: usize, out: &mut [u16]) {
    assert!(window > 0, "boxcar window must be nonzero");
    let out_len = input.len().saturating_sub(window - 1);
    assert!(out.len() >= out_len, "boxcar output buffer too small");
    if out_len == 0 {
        return;
    }
    let mut sum: u64 = input[..window].iter().map(|&v| v as u64).sum();
    out[0] = (sum / window as u64) as u16;
    for i in 1..out_len {
        sum += input[i + window - 1] as u64;
        sum -= input[i - 1] as u64;
        out[i] = (sum / window as u64) as u16;
    }
}

/// Mode S preamble pulse-center symbol offsets and quiet-slot offsets, in
/// symbol units (not samples -- multiply by `samples_per_symbol`).
pub const PULSE_OFFSETS: [usize; 4] = [1, 3, 8, 10];
pub const QUIET_OFFSETS: [usize; 8] = [0, 2, 4, 5, 6, 7, 9, 11];

/// `corr(i) = sum(in[i+P_k]) - sum(in[i+Q_k])`, clamped to `u16`. Output
/// length is `in.len() - 11*samples_per_symbol`: the furthest offset any
/// `P_k`/`Q_k` reads is symbol 11 (`q4b`), so `i + 11*samples_per_symbol`
/// must stay within bounds for every `i` in the output range.
pub fn preamble_u16(input: &[u16], samples_per_symbol: usize, out: &mut [u16]) {
    assert!(samples_per_symbol > 0);
    let span = 11 * samples_per_symbol;
    let out_len = input.len().saturating_sub(span);
    assert!(out.len() >= out_len, "preamble correlator output buffer too small");
    for i in 0..out_len {
        let mut pulses: i64 = 0;
        for &p in &PULSE_OFFSETS {
            pulses += input[i + p * samples_per_symbol] as i64;
        }
        let mut quiet: i64 = 0;
        for &q in &QUIET_OFFSETS {
            quiet += input[i + q * samples_per_symbol] as i64;
        }
        out[i] = (pulses - quiet).clamp(0, u16::MAX as i64) as u16;
    }
}

/// Mean magnitude level and mean power, both scaled to `[0,1]`.
pub fn mean_power_u16(input: &[u16]) -> (f64, f64) {
    if input.is_empty() {
        return (0.0, 0.0);
    }
    let mut sum_level = 0.0f64;
    let mut sum_power = 0.0f64;
    for &v in input {
        let f = v as f64 / 65535.0;
        sum_level += f;
        sum_power += f * f;
    }
    let n = input.len() as f64;
    (sum_level / n, sum_power / n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxcar_golden_alternating() {
        let mut input = Vec::new();
        for i in 0..32 {
            input.push(if i % 2 == 0 { 0u16 } else { 65535u16 });
        }
        let mut out = vec![0u16; input.len()];
        boxcar_u16(&input, 4, &mut out);
        for &v in &out[..29] {
            assert!(v == 32767 || v == 32768, "got {v}");
        }
    }

    #[test]
    fn boxcar_matches_naive_sum() {
        let input: Vec<u16> = (0..50).map(|i| (i * 37 % 1000) as u16).collect();
        let window = 5;
        let mut out = vec![0u16; input.len()];
        boxcar_u16(&input, window, &mut out);
        for i in 0..input.len() - window + 1 {
            let naive: u64 = input[i..i + window].iter().map(|&v| v as u64).sum();
            assert_eq!(out[i] as u64, naive / window as u64);
        }
    }

    #[test]
    fn preamble_strong_at_ideal_pattern() {
        let sps = 4usize;
        let len = 16 * sps;
        let mut input = vec![0u16; len];
        for &p in &PULSE_OFFSETS {
            input[p * sps] = 60000;
        }
        let mut out = vec![0u16; len.saturating_sub(11 * sps)];
        preamble_u16(&input, sps, &mut out);
        let expected = (4i64 * 60000).clamp(0, u16::MAX as i64) as u16;
        assert_eq!(out[0], expected);
    }

    #[test]
    fn mean_power_of_full_scale_is_one() {
        let input = vec![65535u16; 100];
        let (level, power) = mean_power_u16(&input);
        assert!((level - 1.0).abs() < 1e-3);
        assert!((power - 1.0).abs() < 1e-3);
    }

    #[test]
    fn mean_power_of_empty_is_zero() {
        assert_eq!(mean_power_u16(&[]), (0.0, 0.0));
    }
}
