//! PCM sample format description and decoding
//!
//! Describes the fixed capture format (rate, channels, width, signedness,
//! byte order), derives the full-scale amplitude used for level metering,
//! and decodes raw byte buffers into sign-centered `i32` sample values for
//! the detectors.

use thiserror::Error;

/// Errors for formats or raw buffers the analysis path cannot accept
#[derive(Debug, Error)]
pub enum FormatError {
    /// Click detection needs a mono signal
    #[error("click detection requires a mono signal, got {channels} channels")]
    UnsupportedChannels {
        /// Channel count of the offending format
        channels: u16,
    },
    /// Sample width outside 8/16/32 bit, or a non-32-bit float
    #[error("unsupported sample format: {bits} bit {kind}")]
    UnsupportedWidth {
        /// Bits per sample of the offending format
        bits: u16,
        /// Sample kind name for the log line
        kind: &'static str,
    },
    /// Raw buffer length does not divide into whole samples
    #[error("raw buffer of {len} bytes is not a multiple of {sample_bytes} bytes per sample")]
    TruncatedData {
        /// Buffer length in bytes
        len: usize,
        /// Bytes per single sample
        sample_bytes: usize,
    },
    /// Matched-filter reference pattern has no samples
    #[error("reference pattern is empty")]
    EmptyPattern,
}

/// Numeric interpretation of a stored sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    /// Offset-binary unsigned integer
    UnsignedInt,
    /// Two's-complement signed integer
    SignedInt,
    /// IEEE 754 float, nominal range [-1.0, 1.0]
    Float,
}

/// Byte order of multi-byte samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

/// Fixed PCM stream format, agreed with the capture side before analysis starts
///
/// # Example
/// ```
/// use clickrng::audio::format::AudioFormat;
///
/// let format = AudioFormat::s16_mono(192_000);
/// assert_eq!(format.max_amplitude(), 32767);
/// assert_eq!(format.bytes_per_sample(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample (8, 16 or 32)
    pub bits_per_sample: u16,
    /// Numeric interpretation of each sample
    pub sample_type: SampleType,
    /// Byte order of multi-byte samples
    pub byte_order: ByteOrder,
}

impl AudioFormat {
    /// Create a format descriptor
    pub fn new(
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        sample_type: SampleType,
        byte_order: ByteOrder,
    ) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            sample_type,
            byte_order,
        }
    }

    /// The canonical capture format: mono 16-bit signed little-endian
    pub fn s16_mono(sample_rate: u32) -> Self {
        Self::new(
            sample_rate,
            1,
            16,
            SampleType::SignedInt,
            ByteOrder::Little,
        )
    }

    /// Full-scale magnitude for this format, 0 if the format is unknown
    ///
    /// Level metering divides the observed peak by this value; a format that
    /// derives 0 cannot be metered and is reported as degenerate.
    pub fn max_amplitude(&self) -> u32 {
        match (self.bits_per_sample, self.sample_type) {
            (8, SampleType::UnsignedInt) => 255,
            (8, SampleType::SignedInt) => 127,
            (16, SampleType::UnsignedInt) => 65535,
            (16, SampleType::SignedInt) => 32767,
            (32, SampleType::UnsignedInt) => 0xffff_ffff,
            (32, SampleType::SignedInt) => 0x7fff_ffff,
            // Floats are normalized to [-1.0, 1.0]; map to the signed 32-bit scale
            (32, SampleType::Float) => 0x7fff_ffff,
            _ => 0,
        }
    }

    /// Bytes occupied by a single sample
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes occupied by one frame (one sample per channel)
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Check that this format is usable by the click detectors
    ///
    /// The detectors scan a single channel in raw signed units, so the format
    /// must be mono and one of the supported widths. Run this before wiring a
    /// capture source to the pipeline; it is the "reject up front" half of
    /// format handling, while [`max_amplitude`](Self::max_amplitude) returning
    /// 0 at ingest time is the degenerate half.
    pub fn validate_for_detection(&self) -> Result<(), FormatError> {
        if self.channels != 1 {
            return Err(FormatError::UnsupportedChannels {
                channels: self.channels,
            });
        }
        if self.max_amplitude() == 0 {
            return Err(FormatError::UnsupportedWidth {
                bits: self.bits_per_sample,
                kind: match self.sample_type {
                    SampleType::UnsignedInt => "unsigned",
                    SampleType::SignedInt => "signed",
                    SampleType::Float => "float",
                },
            });
        }
        Ok(())
    }

    /// Decode a raw byte buffer into sign-centered `i32` samples
    ///
    /// Unsigned formats are shifted to be zero-centered so the signed click
    /// threshold applies uniformly; floats are scaled to the signed 32-bit
    /// range. Channels stay interleaved.
    ///
    /// # Errors
    /// [`FormatError::TruncatedData`] if the buffer does not divide into
    /// whole samples, [`FormatError::UnsupportedWidth`] for unknown formats.
    pub fn decode_samples(&self, bytes: &[u8]) -> Result<Vec<i32>, FormatError> {
        let sample_bytes = self.bytes_per_sample();
        if sample_bytes == 0 || self.max_amplitude() == 0 {
            return Err(FormatError::UnsupportedWidth {
                bits: self.bits_per_sample,
                kind: match self.sample_type {
                    SampleType::UnsignedInt => "unsigned",
                    SampleType::SignedInt => "signed",
                    SampleType::Float => "float",
                },
            });
        }
        if bytes.len() % sample_bytes != 0 {
            return Err(FormatError::TruncatedData {
                len: bytes.len(),
                sample_bytes,
            });
        }

        let mut samples = Vec::with_capacity(bytes.len() / sample_bytes);
        for raw in bytes.chunks_exact(sample_bytes) {
            samples.push(self.decode_one(raw));
        }
        Ok(samples)
    }

    fn decode_one(&self, raw: &[u8]) -> i32 {
        match (self.bits_per_sample, self.sample_type) {
            (8, SampleType::UnsignedInt) => raw[0] as i32 - 128,
            (8, SampleType::SignedInt) => raw[0] as i8 as i32,
            (16, SampleType::UnsignedInt) => self.read_u16(raw) as i32 - 32768,
            (16, SampleType::SignedInt) => self.read_u16(raw) as i16 as i32,
            (32, SampleType::UnsignedInt) => (self.read_u32(raw) as i64 - 0x8000_0000) as i32,
            (32, SampleType::SignedInt) => self.read_u32(raw) as i32,
            (32, SampleType::Float) => {
                let v = f32::from_bits(self.read_u32(raw)).clamp(-1.0, 1.0);
                (v * 0x7fff_ffff as f32) as i32
            }
            // Unreachable after the width check in decode_samples
            _ => 0,
        }
    }

    fn read_u16(&self, raw: &[u8]) -> u16 {
        let pair = [raw[0], raw[1]];
        match self.byte_order {
            ByteOrder::Little => u16::from_le_bytes(pair),
            ByteOrder::Big => u16::from_be_bytes(pair),
        }
    }

    fn read_u32(&self, raw: &[u8]) -> u32 {
        let quad = [raw[0], raw[1], raw[2], raw[3]];
        match self.byte_order {
            ByteOrder::Little => u32::from_le_bytes(quad),
            ByteOrder::Big => u32::from_be_bytes(quad),
        }
    }

    /// Magnitude of a decoded sample for level metering
    ///
    /// Signed and float samples use the absolute value; unsigned samples use
    /// the raw (offset-binary) value, so full-scale unsigned input meters at
    /// 1.0 against [`max_amplitude`](Self::max_amplitude).
    pub fn magnitude_of(&self, sample: i32) -> u32 {
        match self.sample_type {
            SampleType::SignedInt | SampleType::Float => sample.unsigned_abs(),
            SampleType::UnsignedInt => {
                let midpoint = (self.max_amplitude() as i64 + 1) / 2;
                (sample as i64 + midpoint).max(0) as u32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_amplitude_table() {
        let cases = [
            (8, SampleType::UnsignedInt, 255u32),
            (8, SampleType::SignedInt, 127),
            (16, SampleType::UnsignedInt, 65535),
            (16, SampleType::SignedInt, 32767),
            (32, SampleType::UnsignedInt, 0xffff_ffff),
            (32, SampleType::SignedInt, 0x7fff_ffff),
            (32, SampleType::Float, 0x7fff_ffff),
        ];
        for (bits, kind, expected) in cases {
            let format = AudioFormat::new(192_000, 1, bits, kind, ByteOrder::Little);
            assert_eq!(
                format.max_amplitude(),
                expected,
                "{} bit {:?} should derive {}",
                bits,
                kind,
                expected
            );
        }
    }

    #[test]
    fn test_unknown_width_derives_zero() {
        let format = AudioFormat::new(192_000, 1, 24, SampleType::SignedInt, ByteOrder::Little);
        assert_eq!(format.max_amplitude(), 0);
        assert!(format.validate_for_detection().is_err());
    }

    #[test]
    fn test_float_width_must_be_32() {
        let format = AudioFormat::new(48_000, 1, 16, SampleType::Float, ByteOrder::Little);
        assert_eq!(format.max_amplitude(), 0);
    }

    #[test]
    fn test_stereo_rejected_for_detection() {
        let mut format = AudioFormat::s16_mono(192_000);
        format.channels = 2;
        let err = format.validate_for_detection().unwrap_err();
        assert!(matches!(
            err,
            FormatError::UnsupportedChannels { channels: 2 }
        ));
    }

    #[test]
    fn test_decode_s16_little_endian() {
        let format = AudioFormat::s16_mono(192_000);
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x00, 0x80];
        let samples = format.decode_samples(&bytes).unwrap();
        assert_eq!(samples, vec![0, 32767, -32768]);
    }

    #[test]
    fn test_decode_s16_big_endian() {
        let mut format = AudioFormat::s16_mono(192_000);
        format.byte_order = ByteOrder::Big;
        let bytes = [0x7f, 0xff, 0x80, 0x00];
        let samples = format.decode_samples(&bytes).unwrap();
        assert_eq!(samples, vec![32767, -32768]);
    }

    #[test]
    fn test_decode_u8_is_centered() {
        let format = AudioFormat::new(48_000, 1, 8, SampleType::UnsignedInt, ByteOrder::Little);
        let samples = format.decode_samples(&[0, 128, 255]).unwrap();
        assert_eq!(samples, vec![-128, 0, 127]);
    }

    #[test]
    fn test_decode_float_scales_to_full_range() {
        let format = AudioFormat::new(48_000, 1, 32, SampleType::Float, ByteOrder::Little);
        let mut bytes = Vec::new();
        for v in [0.0f32, 1.0, -1.0, 0.5] {
            bytes.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        let samples = format.decode_samples(&bytes).unwrap();
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], 0x7fff_ffff);
        assert!(samples[2] <= -0x7fff_fff0);
        assert!((samples[3] - 0x3fff_ffff).abs() < 0x200);
    }

    #[test]
    fn test_decode_truncated_buffer_rejected() {
        let format = AudioFormat::s16_mono(192_000);
        let err = format.decode_samples(&[0x00, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, FormatError::TruncatedData { len: 3, .. }));
    }

    #[test]
    fn test_magnitude_conventions() {
        let signed = AudioFormat::s16_mono(192_000);
        assert_eq!(signed.magnitude_of(-32768), 32768);
        assert_eq!(signed.magnitude_of(32767), 32767);

        let unsigned = AudioFormat::new(48_000, 1, 8, SampleType::UnsignedInt, ByteOrder::Little);
        // Raw value 255 decodes to 127 centered; magnitude is the raw value
        assert_eq!(unsigned.magnitude_of(127), 255);
        assert_eq!(unsigned.magnitude_of(-128), 0);
    }
}
