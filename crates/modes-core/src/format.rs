//! Input sample format descriptors.

/// Closed set of raw sample layouts the converter registry understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    /// Unsigned 8-bit I/Q interleaved, offset-binary around 127.5.
    Uc8,
    /// Signed 16-bit I/Q interleaved, full-scale +/-32767.
    Sc16,
    /// Signed 16-bit I/Q interleaved, full-scale +/-2047 (12-bit ADC).
    Sc16Q11,
    /// Signed 16-bit real-only, full-scale +/-32767.
    S16,
    /// Unsigned 16-bit real-only, zero at 2048, valid range 0..=4095.
    U16Offset12,
}

impl InputFormat {
    /// Bytes consumed from the input stream per output sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            InputFormat::Uc8 => 2,
            InputFormat::Sc16 | InputFormat::Sc16Q11 => 4,
            InputFormat::S16 | InputFormat::U16Offset12 => 2,
        }
    }

    /// Whether this format carries an independent I and Q channel.
    pub fn is_complex(self) -> bool {
        matches!(self, InputFormat::Uc8 | InputFormat::Sc16 | InputFormat::Sc16Q11)
    }

    pub fn name(self) -> &'static str {
        match self {
            InputFormat::Uc8 => "uc8",
            InputFormat::Sc16 => "sc16",
            InputFormat::Sc16Q11 => "sc16q11",
            InputFormat::S16 => "s16",
            InputFormat::U16Offset12 => "u16o12",
        }
    }

    pub fn by_name(name: &str) -> Option<InputFormat> {
        match name.to_ascii_lowercase().as_str() {
            "uc8" => Some(InputFormat::Uc8),
            "sc16" => Some(InputFormat::Sc16),
            "sc16q11" => Some(InputFormat::Sc16Q11),
            "s16" => Some(InputFormat::S16),
            "u16o12" | "u16_offset12" => Some(InputFormat::U16Offset12),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_name() {
        for f in [
            InputFormat::Uc8,
            InputFormat::Sc16,
            InputFormat::Sc16Q11,
            InputFormat::S16,
            InputFormat::U16Offset12,
        ] {
            assert_eq!(InputFormat::by_name(f.name()), Some(f));
        }
    }

    #[test]
    fn bytes_per_sample_matches_layout() {
        assert_eq!(InputFormat::Uc8.bytes_per_sample(), 2);
        assert_eq!(InputFormat::Sc16.bytes_per_sample(), 4);
        assert_eq!(InputFormat::U16Offset12.bytes_per_sample(), 2);
    }
}
