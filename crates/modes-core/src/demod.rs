//! Preamble detection and PPM bit-slicing demodulator.
//!
//! The demodulator has no durable state beyond its [`DemodContext`]; each
//! buffer is processed independently except through the FIFO's overlap
//! region (`buf.overlap` leading samples carried over from the previous
//! buffer). The demodulator never returns an error: every non-fatal
//! condition (unknown DF, bad CRC, duplicate) is folded into `stats`.

use crate::collaborator::{decode_result, Message, MessageCollaborator};
use crate::dsp;
use crate::error::{CoreError, Result};
use crate::fifo::MagBuffer;
use crate::stats::Stats;

/// Bits of `preamble_strictness`.
pub mod strictness {
    pub const NONE: u8 = 0;
    pub const HALFBIT: u8 = 1;
    pub const STRONG: u8 = 2;
    pub const MAX: u8 = STRONG | HALFBIT;
}

/// Named symbol-offset accessors over a precomputed offset table, replacing
/// the `P1..Q5D` pointer-arithmetic macros of the source this is grounded
/// on. All offsets are in *samples*, already scaled by `samples_per_symbol`.
#[derive(Debug, Clone, Copy)]
pub struct Offsets {
    table: [usize; 16],
}

impl Offsets {
    fn new(samples_per_symbol: usize) -> Self {
        let mut table = [0usize; 16];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i * samples_per_symbol;
        }
        Offsets { table }
    }

    #[inline]
    fn at(&self, symbol: usize) -> usize {
        if cfg!(debug_assertions) {
            self.table[symbol]
        } else {
            // SAFETY: `symbol` is always one of the fixed compile-time
            // constants below, all < 16.
            unsafe { *self.table.get_unchecked(symbol) }
        }
    }

    pub fn p1(&self) -> usize {
        self.at(1)
    }
    pub fn p2(&self) -> usize {
        self.at(3)
    }
    pub fn p3(&self) -> usize {
        self.at(8)
    }
    pub fn p4(&self) -> usize {
        self.at(10)
    }
    pub fn q1a(&self) -> usize {
        self.at(0)
    }
    pub fn q1b(&self) -> usize {
        self.at(2)
    }
    pub fn q2a(&self) -> usize {
        self.at(2)
    }
    pub fn q2b(&self) -> usize {
        self.at(4)
    }
    pub fn q3a(&self) -> usize {
        self.at(7)
    }
    pub fn q3b(&self) -> usize {
        self.at(9)
    }
    pub fn q4a(&self) -> usize {
        self.at(9)
    }
    pub fn q4b(&self) -> usize {
        self.at(11)
    }
    /// The four between-pulse quiet slots used for the noise-floor average,
    /// distinct from the pulse-adjacent Q1..Q4 pairs used for the pulse
    /// shape check.
    pub fn q5(&self) -> [usize; 4] {
        [self.at(4), self.at(5), self.at(6), self.at(12)]
    }
}

/// Search-window extents, in samples relative to their respective anchors.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub low: i64,
    pub high: i64,
}

/// User-tunable knobs, one-to-one with the CLI's `--demod-*` options.
#[derive(Debug, Clone, Copy)]
pub struct DemodConfig {
    pub smoother_window: Option<usize>,
    pub preamble_threshold_db: f64,
    pub preamble_strictness: u8,
    pub preamble_window: Window,
    pub demod_window: Window,
    pub mark_limits: bool,
}

impl Default for DemodConfig {
    fn default() -> Self {
        DemodConfig {
            smoother_window: None,
            preamble_threshold_db: 3.0,
            preamble_strictness: strictness::MAX,
            preamble_window: Window { low: -1, high: 1 },
            demod_window: Window { low: -1, high: 1 },
            mark_limits: true,
        }
    }
}

/// Everything derived from the sample rate plus the tunable knobs above.
#[derive(Debug, Clone, Copy)]
pub struct DemodContext {
    pub samples_per_symbol: usize,
    pub samples_per_bit: usize,
    pub samples_per_byte: usize,
    pub samples_per_preamble: usize,
    pub max_samples_per_frame: usize,
    pub smoother_window: usize,
    pub preamble_threshold_db: f64,
    pub preamble_window: Window,
    pub demod_window: Window,
    pub preamble_strictness: u8,
    pub mark_limits: bool,
    pub offsets: Offsets,
}

const ADSB_SYMBOL_RATE: f64 = 2_000_000.0;

impl DemodContext {
    pub fn new(sample_rate: f64, cfg: DemodConfig) -> Result<Self> {
        let ratio = sample_rate / ADSB_SYMBOL_RATE;
        if ratio < 1.0 || ratio.fract() != 0.0 {
            return Err(CoreError::UnsupportedCombination(format!(
                "sample rate {sample_rate} is not an integer multiple of {ADSB_SYMBOL_RATE}"
            )));
        }
        let samples_per_symbol = ratio as usize;
        let samples_per_bit = 2 * samples_per_symbol;
        let samples_per_byte = 8 * samples_per_bit;
        let samples_per_preamble = 8 * samples_per_bit;
        let max_samples_per_frame = 14 * samples_per_byte + samples_per_preamble;
        if cfg.preamble_window.low < -(samples_per_symbol as i64) {
            return Err(CoreError::UnsupportedCombination("preamble window low bound too negative".into()));
        }
        Ok(DemodContext {
            samples_per_symbol,
            samples_per_bit,
            samples_per_byte,
            samples_per_preamble,
            max_samples_per_frame,
            smoother_window: cfg.smoother_window.unwrap_or(samples_per_symbol),
            preamble_threshold_db: cfg.preamble_threshold_db,
            preamble_window: cfg.preamble_window,
            demod_window: cfg.demod_window,
            preamble_strictness: cfg.preamble_strictness,
            mark_limits: cfg.mark_limits,
            offsets: Offsets::new(samples_per_symbol),
        })
    }
}

/// Reusable scratch space so the demodulator never allocates on the hot
/// path.
pub struct DemodScratch {
    smoothed: Vec<u16>,
    correlated: Vec<u16>,
}

impl DemodScratch {
    pub fn new(max_total_length: usize) -> Self {
        DemodScratch { smoothed: vec![0u16; max_total_length], correlated: vec![0u16; max_total_length] }
    }
}

/// Milliseconds elapsed between two 12 MHz receive-clock readings,
/// handling the counter's documented modular rollover via a wrapping
/// subtraction rather than assuming `to >= from`.
#[inline]
fn elapsed_12mhz_ms(from: u64, to: u64) -> u64 {
    to.wrapping_sub(from) / 12_000
}

fn msg_len_bytes(df: u8) -> Option<usize> {
    match df {
        0 | 4 | 5 | 11 => Some(7),
        16 | 17 | 18 | 20 | 21 | 24 => Some(14),
        _ => None,
    }
}

#[inline]
fn read_bit(sa: &[u16], origin: i64, bit_index: usize, ctx: &DemodContext, mark: f64) -> Option<bool> {
    let sps = ctx.samples_per_symbol as i64;
    let a_idx = origin + (bit_index * ctx.samples_per_bit) as i64;
    let b_idx = a_idx + sps;
    if a_idx < 0 || b_idx < 0 || b_idx as usize >= sa.len() {
        return None;
    }
    let a = sa[a_idx as usize] as f64;
    let b = sa[b_idx as usize] as f64;
    if ctx.mark_limits && mark > 0.0 {
        let lo = 0.707 * mark;
        let hi = 1.414 * mark;
        let a_in = a >= lo && a <= hi;
        let b_in = b >= lo && b <= hi;
        if a_in && !b_in {
            return Some(true);
        }
        if b_in && !a_in {
            return Some(false);
        }
    }
    Some(a > b)
}

fn read_byte(sa: &[u16], origin: i64, byte_index: usize, ctx: &DemodContext, mark: f64) -> Option<u8> {
    let mut byte = 0u8;
    for b in 0..8 {
        let bit = read_bit(sa, origin, byte_index * 8 + b, ctx, mark)?;
        byte = (byte << 1) | (bit as u8);
    }
    Some(byte)
}

/// Outcome of the per-buffer sweep, for tests and CLI reporting.
#[derive(Debug, Default)]
pub struct DemodResult {
    pub accepted: Vec<Message>,
}

/// Runs the full per-buffer algorithm, calling into `collaborator` for
/// every candidate message and updating `stats` for every rejection.
pub fn demodulate_buffer<C: MessageCollaborator>(
    ctx: &DemodContext,
    buf: &MagBuffer,
    collaborator: &mut C,
    stats: &Stats,
    scratch: &mut DemodScratch,
) -> DemodResult {
    let mut result = DemodResult::default();
    stats.buffers_processed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    stats.samples_processed.fetch_add((buf.valid_length - buf.overlap) as u64, std::sync::atomic::Ordering::Relaxed);
    stats.samples_dropped.fetch_add(buf.dropped, std::sync::atomic::Ordering::Relaxed);

    if buf.valid_length <= buf.overlap {
        return result;
    }

    let live = &buf.data[..buf.valid_length];
    let sa_len = live.len().saturating_sub(ctx.smoother_window.saturating_sub(1));
    if sa_len == 0 {
        return result;
    }
    let sa = &mut scratch.smoothed[..sa_len];
    dsp::boxcar(live, ctx.smoother_window, sa);

    let sc_span = 11 * ctx.samples_per_symbol;
    let sc_len = sa.len().saturating_sub(sc_span);
    if sc_len == 0 {
        stats.add_noise_power(crate::dsp::mean_power(sa).1);
        return result;
    }
    let sc = &mut scratch.correlated[..sc_len];
    dsp::preamble(sa, ctx.samples_per_symbol, sc);

    let (mean_level, _) = dsp::mean_power(sa);
    let threshold = 65536.0 * mean_level * 10f64.powf(ctx.preamble_threshold_db / 20.0);

    let search_len = buf.valid_length - buf.overlap;
    let mut j: usize = 0;
    let mut found_any = false;

    while j < search_len {
        let o = &ctx.offsets;
        if j + o.p1() >= sc.len() || (sc[j + o.p1()] as f64) < threshold {
            j += 1;
            continue;
        }

        // Pulse-shape check.
        let idx_ok = j + o.q4b() < sa.len();
        if !idx_ok {
            j += 1;
            continue;
        }
        let p1 = sa[j + o.p1()];
        let p2 = sa[j + o.p2()];
        let p3 = sa[j + o.p3()];
        let p4 = sa[j + o.p4()];
        let shape_ok = p1 > sa[j + o.q1a()]
            && p1 > sa[j + o.q1b()]
            && p2 > sa[j + o.q2a()]
            && p2 > sa[j + o.q2b()]
            && p3 > sa[j + o.q3a()]
            && p3 > sa[j + o.q3b()]
            && p4 > sa[j + o.q4a()]
            && p4 > sa[j + o.q4b()];
        if !shape_ok {
            j += 1;
            continue;
        }

        // Peak search.
        let center = (j + o.p1()) as i64;
        let lo = (center + ctx.preamble_window.low).max(0) as usize;
        let hi = ((center + ctx.preamble_window.high).max(0) as usize).min(sc.len() - 1);
        let mut best = lo;
        for k in lo..=hi {
            if sc[k] > sc[best] {
                best = k;
            }
        }
        let offset = best as i64 - ctx.samples_per_symbol as i64;
        if offset < 0 {
            j += 1;
            continue;
        }
        let offset = offset as usize;

        // Strictness checks.
        let sps = ctx.samples_per_symbol;
        if ctx.preamble_strictness & strictness::HALFBIT != 0 {
            if best + sps < sc.len() && 2 * sc[best + sps] as i64 > sc[best] as i64 {
                j += 1;
                continue;
            }
            if best + 7 * sps < sc.len() && sc[best + 7 * sps] as i64 > 2 * sc[best] as i64 {
                j += 1;
                continue;
            }
        }

        if offset + o.q5()[3] >= sa.len() {
            j += 1;
            continue;
        }
        let preamble_avg_mark = (sa[offset + o.p1()] as f64
            + sa[offset + o.p2()] as f64
            + sa[offset + o.p3()] as f64
            + sa[offset + o.p4()] as f64)
            / 4.0;
        let q5 = o.q5();
        let preamble_avg_space =
            (sa[offset + q5[0]] as f64 + sa[offset + q5[1]] as f64 + sa[offset + q5[2]] as f64 + sa[offset + q5[3]] as f64) / 4.0;

        // Bit-slicing search.
        let mut accepted: Option<(usize, usize, Vec<u8>, i32)> = None;
        let mut worst_score = i32::MAX;
        let mut any_df_matched = false;
        let dwin = ctx.demod_window;
        let mut i = dwin.low;
        while i <= dwin.high {
            let read_origin = offset as i64 + ctx.samples_per_preamble as i64 + i;
            if let Some(byte0) = read_byte(sa, read_origin, 0, ctx, preamble_avg_mark) {
                let df = byte0 >> 3;
                if let Some(msg_len) = msg_len_bytes(df) {
                    any_df_matched = true;
                    let mut bytes = vec![byte0];
                    let mut complete = true;
                    for b in 1..msg_len {
                        match read_byte(sa, read_origin, b, ctx, preamble_avg_mark) {
                            Some(byte) => bytes.push(byte),
                            None => {
                                complete = false;
                                break;
                            }
                        }
                    }
                    if complete {
                        let score = collaborator.score_message(&bytes);
                        if score < worst_score {
                            worst_score = score;
                        }
                        if score >= collaborator.accept_threshold() {
                            accepted = Some((i as usize, msg_len, bytes, score));
                            break;
                        }
                    }
                }
            }
            i += 1;
        }

        match accepted {
            Some((msg_sample_offset, msg_len, bytes, _score)) => {
                let msg_sample_len = msg_len * ctx.samples_per_byte;
                let end_of_message_sample =
                    j as i64 + best as i64 + ctx.samples_per_preamble as i64 + msg_sample_offset as i64 + 56 * ctx.samples_per_bit as i64;
                let timestamp_msg = buf
                    .sample_timestamp
                    .wrapping_add((end_of_message_sample * 12 / ctx.samples_per_bit as i64).max(0) as u64);
                let mut msg = Message {
                    timestamp_msg,
                    sys_timestamp_msg: buf
                        .sys_timestamp_ms
                        .wrapping_add(elapsed_12mhz_ms(buf.sample_timestamp, timestamp_msg)),
                    signal_level: (preamble_avg_mark / 65535.0).powi(2),
                    noise_level: (preamble_avg_space / 65535.0).powi(2),
                    score: 0,
                    corrected_bits: 0,
                };
                let decode_rc = collaborator.decode_message(&mut msg, &bytes);
                if decode_rc < 0 {
                    match decode_rc {
                        decode_result::UNKNOWN_ICAO => {
                            stats.messages_unknown_icao.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                        }
                        decode_result::DUPLICATE => stats.messages_duplicate.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
                        _ => stats.messages_bad.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
                    };
                } else {
                    collaborator.use_message(&msg);
                    stats.messages_accepted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    result.accepted.push(msg);
                }
                found_any = true;
                let delta = best as i64 + ctx.samples_per_preamble as i64 + msg_sample_len as i64 - 8 * sps as i64;
                let advanced = j as i64 + delta;
                j = advanced.max(j as i64 + 1) as usize;
            }
            None => {
                if !any_df_matched {
                    stats.messages_unknown_df.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                } else if worst_score >= collaborator.unknown_threshold() {
                    stats.messages_unknown_icao.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                } else {
                    stats.messages_bad.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                j += 1;
            }
        }
    }

    if !found_any {
        let (_, mean_power) = dsp::mean_power(sa);
        stats.add_noise_power(mean_power);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc24::{crc24, Crc24Collaborator};

    fn synth_context(sps: usize) -> DemodContext {
        DemodContext::new(sps as f64 * ADSB_SYMBOL_RATE, DemodConfig::default()).unwrap()
    }

    /// Writes an ideal preamble plus a canonical DF17 body into `mag` at
    /// sample index `start`, returning the total message length in bits.
    fn write_preamble_and_message(mag: &mut [u16], start: usize, sps: usize, payload: &[u8]) {
        let o = Offsets::new(sps);
        for &p in &[o.p1(), o.p2(), o.p3(), o.p4()] {
            mag[start + p] = 60000;
        }
        let samples_per_bit = 2 * sps;
        let preamble_len = 8 * samples_per_bit;
        let mut origin = start + preamble_len;
        for &byte in payload {
            for bit in (0..8).rev() {
                let one = (byte >> bit) & 1 == 1;
                if one {
                    mag[origin] = 60000;
                } else {
                    mag[origin + sps] = 60000;
                }
                origin += samples_per_bit;
            }
        }
    }

    #[test]
    fn elapsed_12mhz_converts_ticks_to_millis() {
        assert_eq!(elapsed_12mhz_ms(0, 12_000), 1);
        assert_eq!(elapsed_12mhz_ms(1_000, 1_000 + 120_000), 10);
    }

    #[test]
    fn elapsed_12mhz_handles_counter_rollover() {
        let from = u64::MAX - 5_999;
        let to = 6_000; // wraps past u64::MAX by 6000 ticks
        assert_eq!(elapsed_12mhz_ms(from, to), 1);
    }

    #[test]
    fn context_rejects_non_integer_sample_rate() {
        let err = DemodContext::new(2_500_000.0, DemodConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedCombination(_)));
    }

    #[test]
    fn samples_per_symbol_one_has_expected_offsets() {
        let ctx = synth_context(1);
        assert_eq!(ctx.offsets.p1(), 1);
        assert_eq!(ctx.offsets.p2(), 3);
        assert_eq!(ctx.offsets.p3(), 8);
        assert_eq!(ctx.offsets.p4(), 10);
    }

    #[test]
    fn empty_buffer_emits_nothing() {
        let ctx = synth_context(2);
        let buf = MagBuffer { data: vec![0u16; 64], overlap: 10, valid_length: 10, sample_timestamp: 0, sys_timestamp_ms: 0, dropped: 0, flags: 0, mean_level: 0.0, mean_power: 0.0 };
        let mut scratch = DemodScratch::new(64);
        let stats = Stats::new();
        let mut collab = Crc24Collaborator::new();
        let result = demodulate_buffer(&ctx, &buf, &mut collab, &stats, &mut scratch);
        assert!(result.accepted.is_empty());
    }

    #[test]
    fn synthetic_df17_preamble_is_accepted() {
        let sps = 2usize;
        let ctx = synth_context(sps);
        let total = 2000usize;
        let mut data = vec![0u16; total];
        let payload = [0x8D, 0x48, 0x40, 0xD6, 0x20, 0x2C, 0xC3, 0x71, 0xC3, 0x2C, 0xE0];
        let crc = crc24(&payload);
        let mut full_payload = payload.to_vec();
        full_payload.push((crc >> 16) as u8);
        full_payload.push((crc >> 8) as u8);
        full_payload.push(crc as u8);
        write_preamble_and_message(&mut data, 100, sps, &full_payload);
        let buf = MagBuffer {
            data,
            overlap: 0,
            valid_length: total,
            sample_timestamp: 0,
            sys_timestamp_ms: 0,
            dropped: 0,
            flags: 0,
            mean_level: 0.0,
            mean_power: 0.0,
        };
        let mut scratch = DemodScratch::new(total);
        let stats = Stats::new();
        let mut collab = Crc24Collaborator::new();
        let result = demodulate_buffer(&ctx, &buf, &mut collab, &stats, &mut scratch);
        assert_eq!(result.accepted.len(), 1);
        assert!(result.accepted[0].signal_level > 0.5);
    }

    #[test]
    fn unknown_df_is_counted_and_rejected() {
        let sps = 2usize;
        let ctx = synth_context(sps);
        let total = 2000usize;
        let mut data = vec![0u16; total];
        // DF=1 (0b00001), not in the accepted set.
        let payload = [0x08u8, 0, 0, 0, 0, 0, 0];
        write_preamble_and_message(&mut data, 100, sps, &payload);
        let buf = MagBuffer {
            data,
            overlap: 0,
            valid_length: total,
            sample_timestamp: 0,
            sys_timestamp_ms: 0,
            dropped: 0,
            flags: 0,
            mean_level: 0.0,
            mean_power: 0.0,
        };
        let mut scratch = DemodScratch::new(total);
        let stats = Stats::new();
        let mut collab = Crc24Collaborator::new();
        let result = demodulate_buffer(&ctx, &buf, &mut collab, &stats, &mut scratch);
        assert!(result.accepted.is_empty());
        assert_eq!(stats.snapshot().messages_unknown_df, 1);
    }
}
