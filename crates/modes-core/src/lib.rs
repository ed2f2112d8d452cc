//! # Mode S / ADS-B Signal-Processing Core
//!
//! This crate provides the signal-processing core of a Mode S / 1090 MHz
//! extended squitter (ADS-B) receiver: turning raw IQ samples into decoded
//! Mode S frames, without any knowledge of what those frames mean.
//!
//! ## Signal Flow
//!
//! ```text
//! RX: raw IQ bytes → convert (DC-block + magnitude) → FIFO → demod
//!                                                               │
//!                                          preamble search, bit-slicing
//!                                                               │
//!                                            MessageCollaborator (caller)
//! ```
//!
//! - **`format`** / **`convert`**: turn raw sample bytes in one of several
//!   wire layouts into a stream of 16-bit magnitudes.
//! - **`dsp`**: a small CPU-feature-dispatched kernel registry (`boxcar`,
//!   `preamble`, `mean_power`) backing the hot loops in `demod`.
//! - **`fifo`**: the bounded, overlap-aware buffer queue connecting sample
//!   acquisition to demodulation.
//! - **`demod`**: preamble detection and PPM bit-slicing.
//! - **`collaborator`**: the trait the caller implements to score, decode,
//!   and consume candidate messages; `crc24` is a minimal reference
//!   implementation used by this crate's own tests.
//! - **`stats`**: process-wide counters for observability.
//!
//! ## Example
//!
//! ```rust,no_run
//! use modes_core::prelude::*;
//!
//! let ctx = DemodContext::new(2_400_000.0, DemodConfig::default())?;
//! let (convert, mut conv_state) = init_converter(InputFormat::Uc8, 2_400_000.0, true)?;
//! let fifo = Fifo::new(8, ctx.max_samples_per_frame * 4, ctx.samples_per_preamble);
//! let mut scratch = DemodScratch::new(ctx.max_samples_per_frame * 4);
//! let stats = Stats::new();
//! let mut collaborator = Crc24Collaborator::new();
//!
//! if let Some(mut buf) = fifo.acquire(0) {
//!     let iq = vec![127u8; (buf.total_length() - buf.overlap) * 2];
//!     let s = convert(&iq, &mut buf.data[buf.overlap..], &mut conv_state);
//!     buf.valid_length = buf.total_length();
//!     buf.mean_level = s.mean_level;
//!     buf.mean_power = s.mean_power;
//!     fifo.enqueue(buf);
//! }
//! if let Some(buf) = fifo.dequeue(0) {
//!     let _result = demodulate_buffer(&ctx, &buf, &mut collaborator, &stats, &mut scratch);
//!     fifo.release(buf);
//! }
//! # Ok::<(), modes_core::CoreError>(())
//! ```

pub mod collaborator;
pub mod convert;
pub mod crc24;
pub mod demod;
pub mod dsp;
pub mod error;
pub mod fifo;
pub mod format;
pub mod stats;

pub use collaborator::{Message, MessageCollaborator};
pub use convert::{init_converter, ConverterState, ConvertStats};
pub use crc24::{crc24, validate_crc, Crc24Collaborator};
pub use demod::{demodulate_buffer, DemodConfig, DemodContext, DemodResult, DemodScratch};
pub use error::{CoreError, Result};
pub use fifo::{Fifo, MagBuffer, DISCONTINUOUS};
pub use format::InputFormat;
pub use stats::{Stats, StatsSnapshot};

/// Convenient single-import bundle for binaries wiring the core together.
pub mod prelude {
    pub use crate::collaborator::{Message, MessageCollaborator};
    pub use crate::convert::{init_converter, ConverterState, ConvertStats};
    pub use crate::crc24::Crc24Collaborator;
    pub use crate::demod::{demodulate_buffer, DemodConfig, DemodContext, DemodScratch};
    pub use crate::error::CoreError;
    pub use crate::fifo::{Fifo, MagBuffer};
    pub use crate::format::InputFormat;
    pub use crate::stats::Stats;
}
