//! The collaborator boundary: the core asks an external component to score,
//! decode, and consume a candidate message without depending on payload
//! semantics itself (decoding ADS-B fields into aircraft state is out of
//! scope for this crate; see `crc24` for the minimal reference
//! implementation that makes the demodulator testable end-to-end).

/// Fields the demodulator itself writes. Everything else about a decoded
/// message is the collaborator's business.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// 12 MHz receive-clock timestamp at the end of bit 56.
    pub timestamp_msg: u64,
    /// Wall-clock milliseconds corresponding to `timestamp_msg`.
    pub sys_timestamp_msg: u64,
    /// Linear power in `[0,1]`, derived from the preamble mark average.
    pub signal_level: f64,
    /// Linear power in `[0,1]`, derived from the preamble space average.
    pub noise_level: f64,
    pub score: i32,
    pub corrected_bits: u32,
}

/// Return codes from [`MessageCollaborator::decode_message`].
pub mod decode_result {
    pub const UNKNOWN_ICAO: i32 = -1;
    pub const DUPLICATE: i32 = -3;
}

/// The contract `demod` needs from whatever consumes candidate messages.
/// Implementations decide what "a message" means; the core only needs the
/// three operations below and two threshold accessors.
pub trait MessageCollaborator {
    /// Score at or above this means accept.
    fn accept_threshold(&self) -> i32;
    /// Score at or above this (but below `accept_threshold`) means "unknown
    /// ICAO" rather than "bad message".
    fn unknown_threshold(&self) -> i32;

    /// Pure, deterministic scoring of a candidate message's raw bytes.
    fn score_message(&self, bytes: &[u8]) -> i32;

    /// Attempt to fully decode `bytes` into `msg`. Returns `>=0` on
    /// success, [`decode_result::UNKNOWN_ICAO`], [`decode_result::DUPLICATE`],
    /// or another negative value for a bad message.
    fn decode_message(&mut self, msg: &mut Message, bytes: &[u8]) -> i32;

    /// Consume a successfully decoded message.
    fn use_message(&mut self, msg: &Message);
}
