//! Matched-filter click detection
//!
//! Correlates each block against a captured exemplar of the click waveform
//! and accepts the offset of maximum correlation when it clears a calibrated
//! magnitude threshold. Useful when the click shape is known and the signal
//! is too noisy for a plain amplitude threshold.

use crate::audio::detector::{ClickDetector, ClickEvent, Detection, DetectorConfig};
use crate::audio::format::{AudioFormat, FormatError};
use crate::audio::ingest::SampleBlock;

/// Default correlation acceptance threshold
///
/// Sized for 16-bit patterns of a few hundred samples; any real deployment
/// recalibrates this against the actual pattern energy.
pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 1.0e9;

/// A mono reference click waveform
///
/// Must share the sample width of the live signal; its energy anchors the
/// calibration of the correlation threshold.
#[derive(Debug, Clone)]
pub struct ReferencePattern {
    samples: Vec<i32>,
    energy: f64,
}

impl ReferencePattern {
    /// Build a pattern from decoded samples
    ///
    /// # Errors
    /// [`FormatError::EmptyPattern`] if `samples` is empty.
    pub fn new(samples: Vec<i32>) -> Result<Self, FormatError> {
        if samples.is_empty() {
            return Err(FormatError::EmptyPattern);
        }
        let energy = samples.iter().map(|&s| s as f64 * s as f64).sum();
        Ok(Self { samples, energy })
    }

    /// Decode a pattern from raw bytes in the given mono format
    ///
    /// # Errors
    /// Rejects non-mono formats and propagates decoding errors.
    pub fn from_bytes(format: &AudioFormat, bytes: &[u8]) -> Result<Self, FormatError> {
        if format.channels != 1 {
            return Err(FormatError::UnsupportedChannels {
                channels: format.channels,
            });
        }
        Self::new(format.decode_samples(bytes)?)
    }

    /// Pattern length in samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the pattern has no samples (never, after construction)
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sum of squared sample values
    ///
    /// A perfectly aligned correlation of the pattern against itself equals
    /// this value, which makes it the natural unit for threshold calibration.
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// The pattern samples
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }
}

/// Sliding-dot-product peak search
///
/// Computes `corr[i] = Σ_j signal[i+j] * pattern[j]` for every offset in the
/// signal, treating samples past the end as zero, and returns the offset with
/// the maximum correlation (first one on ties) together with that maximum.
///
/// This is the hot path of the matched-filter strategy: O(signal × pattern)
/// multiply-accumulates per block, which bounds the block size usable in real
/// time (see `benches/correlation.rs`). Accumulation is in f64 so 32-bit
/// sample widths cannot overflow.
pub fn correlate_peak(signal: &[i32], pattern: &[i32]) -> (usize, f64) {
    if signal.is_empty() || pattern.is_empty() {
        return (0, 0.0);
    }

    let mut best_offset = 0;
    let mut best = f64::NEG_INFINITY;
    for i in 0..signal.len() {
        let span = pattern.len().min(signal.len() - i);
        let mut acc = 0.0f64;
        for j in 0..span {
            acc += signal[i + j] as f64 * pattern[j] as f64;
        }
        if acc > best {
            best = acc;
            best_offset = i;
        }
    }
    (best_offset, best)
}

/// Matched-filter click detector
///
/// Produces at most one click per block: the single best-correlating offset,
/// accepted only above the configured correlation threshold and outside the
/// lockout window. Timestamping mirrors the threshold strategy with the
/// accepted offset in place of the crossing index.
///
/// # Example
/// ```
/// use clickrng::audio::detector::{ClickDetector, DetectorConfig};
/// use clickrng::audio::format::AudioFormat;
/// use clickrng::audio::ingest::SampleBlock;
/// use clickrng::audio::matched::{MatchedFilterDetector, ReferencePattern};
///
/// let pattern = ReferencePattern::new(vec![8000, -6000, 4000]).unwrap();
/// let mut samples = vec![0i32; 1000];
/// samples[200..203].copy_from_slice(&[8000, -6000, 4000]);
/// let block = SampleBlock::from_samples(AudioFormat::s16_mono(192_000), samples, 0);
///
/// let mut detector = MatchedFilterDetector::new(pattern);
/// let config = DetectorConfig {
///     correlation_threshold: 1.0e7,
///     ..DetectorConfig::default()
/// };
/// let detection = detector.process_block(&block, &config);
/// assert_eq!(detection.peak_indices, vec![200]);
/// ```
#[derive(Debug)]
pub struct MatchedFilterDetector {
    pattern: ReferencePattern,
    elapsed_ns: u64,
    last_click_ns: Option<u64>,
}

impl MatchedFilterDetector {
    /// Create a detector around a reference pattern
    pub fn new(pattern: ReferencePattern) -> Self {
        Self {
            pattern,
            elapsed_ns: 0,
            last_click_ns: None,
        }
    }

    /// The reference pattern in use
    pub fn pattern(&self) -> &ReferencePattern {
        &self.pattern
    }

    fn lockout_clear(&self, timestamp_ns: u64, lock_time_ns: u64) -> bool {
        match self.last_click_ns {
            None => true,
            Some(last) => timestamp_ns.saturating_sub(last) > lock_time_ns,
        }
    }
}

impl ClickDetector for MatchedFilterDetector {
    fn process_block(&mut self, block: &SampleBlock, config: &DetectorConfig) -> Detection {
        let mut detection = Detection::default();
        let frames = block.frames();
        if frames == 0 {
            return detection;
        }

        let start_ns = self.elapsed_ns;
        let duration_ns = block.duration_ns();

        let (offset, correlation) = correlate_peak(&block.samples, self.pattern.samples());
        if correlation > config.correlation_threshold {
            let timestamp_ns = start_ns + offset as u64 * duration_ns / frames as u64;
            if self.lockout_clear(timestamp_ns, config.lock_time_ns) {
                self.last_click_ns = Some(timestamp_ns);
                detection.events.push(ClickEvent {
                    timestamp_ns,
                    correlation: Some(correlation),
                });
                detection.peak_indices.push(offset);
                tracing::trace!(offset, correlation, timestamp_ns, "correlation peak accepted");
            }
        }

        self.elapsed_ns = start_ns + duration_ns;
        detection
    }

    fn reset(&mut self) {
        self.elapsed_ns = 0;
        self.last_click_ns = None;
    }

    fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;

    const PATTERN: [i32; 4] = [5000, -9000, 7000, -3000];

    fn pattern() -> ReferencePattern {
        ReferencePattern::new(PATTERN.to_vec()).unwrap()
    }

    fn block_with_pattern_at(len: usize, offset: usize) -> SampleBlock {
        let mut samples = vec![0i32; len];
        samples[offset..offset + PATTERN.len()].copy_from_slice(&PATTERN);
        SampleBlock::from_samples(AudioFormat::s16_mono(192_000), samples, 0)
    }

    fn config(correlation_threshold: f64, lock_time_ns: u64) -> DetectorConfig {
        DetectorConfig {
            threshold: i32::MAX,
            lock_time_ns,
            correlation_threshold,
        }
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(matches!(
            ReferencePattern::new(vec![]),
            Err(FormatError::EmptyPattern)
        ));
    }

    #[test]
    fn test_stereo_pattern_rejected() {
        let mut format = AudioFormat::s16_mono(48_000);
        format.channels = 2;
        assert!(matches!(
            ReferencePattern::from_bytes(&format, &[0, 0, 0, 0]),
            Err(FormatError::UnsupportedChannels { channels: 2 })
        ));
    }

    #[test]
    fn test_pattern_energy() {
        let energy = PATTERN.iter().map(|&s| s as f64 * s as f64).sum::<f64>();
        assert_eq!(pattern().energy(), energy);
    }

    #[test]
    fn test_correlate_peak_finds_embedded_pattern() {
        let block = block_with_pattern_at(1000, 300);
        let (offset, corr) = correlate_peak(&block.samples, &PATTERN);

        assert_eq!(offset, 300, "peak must land on the exact alignment");
        assert_eq!(corr, pattern().energy(), "aligned correlation equals energy");
    }

    #[test]
    fn test_correlate_peak_near_block_end_zero_padded() {
        // Pattern truncated by the block edge still correlates partially
        let mut samples = vec![0i32; 100];
        samples[98] = PATTERN[0];
        samples[99] = PATTERN[1];
        let (offset, corr) = correlate_peak(&samples, &PATTERN);

        assert_eq!(offset, 98);
        let expected = (PATTERN[0] as f64).powi(2) + (PATTERN[1] as f64).powi(2);
        assert_eq!(corr, expected);
    }

    #[test]
    fn test_detection_timestamp_at_offset() {
        let block = block_with_pattern_at(1000, 640);
        let mut detector = MatchedFilterDetector::new(pattern());

        let detection = detector.process_block(&block, &config(1.0e7, 0));

        assert_eq!(detection.events.len(), 1);
        assert_eq!(detection.peak_indices, vec![640]);
        let expected = 640 * block.duration_ns() / 1000;
        assert_eq!(detection.events[0].timestamp_ns, expected);
        assert_eq!(detection.events[0].correlation, Some(pattern().energy()));
    }

    #[test]
    fn test_below_threshold_rejected() {
        let block = block_with_pattern_at(1000, 300);
        let mut detector = MatchedFilterDetector::new(pattern());

        let detection = detector.process_block(&block, &config(pattern().energy() * 2.0, 0));
        assert!(detection.events.is_empty());
    }

    #[test]
    fn test_silent_block_produces_nothing() {
        let silent = SampleBlock::from_samples(AudioFormat::s16_mono(192_000), vec![0; 512], 0);
        let mut detector = MatchedFilterDetector::new(pattern());

        let detection = detector.process_block(&silent, &DetectorConfig::default());
        assert!(detection.events.is_empty());
    }

    #[test]
    fn test_empty_blocks_tolerated() {
        let empty = SampleBlock::from_samples(AudioFormat::s16_mono(192_000), vec![], 0);
        let mut detector = MatchedFilterDetector::new(pattern());

        for _ in 0..3 {
            assert!(detector.process_block(&empty, &DetectorConfig::default()).events.is_empty());
        }
        assert_eq!(detector.elapsed_ns(), 0);
    }

    #[test]
    fn test_lockout_suppresses_adjacent_block_repeat() {
        // Lockout longer than one block: the echo in the second block is ignored
        let lock_ns = 2 * 1000 * 1_000_000_000 / 192_000;
        let mut detector = MatchedFilterDetector::new(pattern());
        let cfg = config(1.0e7, lock_ns);

        let first = block_with_pattern_at(1000, 900);
        assert_eq!(detector.process_block(&first, &cfg).events.len(), 1);

        let second = block_with_pattern_at(1000, 50);
        assert!(
            detector.process_block(&second, &cfg).events.is_empty(),
            "repeat inside the lockout must not fire"
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let mut detector = MatchedFilterDetector::new(pattern());
        let block = block_with_pattern_at(1000, 300);
        detector.process_block(&block, &config(1.0e7, u64::MAX));

        detector.reset();
        assert_eq!(detector.elapsed_ns(), 0);
        assert_eq!(
            detector.process_block(&block, &config(1.0e7, u64::MAX)).events.len(),
            1,
            "reset lifts the lockout"
        );
    }

    #[test]
    fn test_pattern_survives_noise_floor() {
        let mut samples: Vec<i32> = (0..1000).map(|i| if i % 2 == 0 { 150 } else { -150 }).collect();
        for (j, &p) in PATTERN.iter().enumerate() {
            samples[400 + j] += p;
        }
        let block = SampleBlock::from_samples(AudioFormat::s16_mono(192_000), samples, 0);
        let mut detector = MatchedFilterDetector::new(pattern());

        let detection = detector.process_block(&block, &config(pattern().energy() * 0.5, 0));
        assert_eq!(detection.peak_indices, vec![400]);
    }
}
