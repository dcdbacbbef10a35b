//! Click detection in streaming PCM blocks
//!
//! Turns sample blocks into timestamped click events. Two strategies share
//! the [`ClickDetector`] trait: the threshold-with-lockout scanner in this
//! module and the matched-filter correlator in [`super::matched`]. Both keep
//! a persistent elapsed-time cursor across blocks so click timestamps are
//! monotonic and deterministic for a given block sequence.

use crate::audio::ingest::SampleBlock;
use crate::audio::matched::DEFAULT_CORRELATION_THRESHOLD;
use crate::{DEFAULT_LOCK_TIME_NS, DEFAULT_THRESHOLD};

/// One detected click
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickEvent {
    /// Monotonic timestamp in nanoseconds since the detector started
    pub timestamp_ns: u64,
    /// Correlation magnitude at the accepted offset (matched filter only)
    pub correlation: Option<f64>,
}

/// Result of scanning one block
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Accepted clicks, in block order
    pub events: Vec<ClickEvent>,
    /// Intra-block sample indices of the accepted clicks, for display markers
    pub peak_indices: Vec<usize>,
}

/// Detector tuning, passed by value into every processing call
///
/// The pipeline hands each block a snapshot of the current settings, so a
/// runtime settings change can never race an in-flight block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Click threshold in raw signed sample units
    pub threshold: i32,
    /// Minimum spacing between accepted clicks in nanoseconds
    pub lock_time_ns: u64,
    /// Acceptance threshold for the matched-filter correlation magnitude;
    /// a calibration parameter tied to sample width and pattern energy
    pub correlation_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            lock_time_ns: DEFAULT_LOCK_TIME_NS,
            correlation_threshold: DEFAULT_CORRELATION_THRESHOLD,
        }
    }
}

/// A click detection strategy
///
/// Implementations consume blocks in delivery order, advance their internal
/// elapsed-time cursor by each block's duration, and report zero or more
/// clicks per block. "No click in this block" is an empty result, never an
/// error, and empty blocks must leave state untouched.
pub trait ClickDetector: Send {
    /// Scan one block and return the clicks accepted in it
    fn process_block(&mut self, block: &SampleBlock, config: &DetectorConfig) -> Detection;

    /// Clear the elapsed-time cursor and the lockout state
    fn reset(&mut self);

    /// Nanoseconds of signal consumed since creation or the last reset
    fn elapsed_ns(&self) -> u64;
}

/// Threshold-with-lockout click detector
///
/// Scans the mono block sample-by-sample. A sample strictly above the
/// configured threshold is accepted as a click if the elapsed time since the
/// last accepted click strictly exceeds the lockout. After acceptance the
/// scan jumps ahead by the lockout's worth of samples, so the multi-sample
/// transient of one physical click registers exactly once. The first sample
/// crossing the threshold wins; there is no look-ahead for a larger peak.
///
/// # Example
/// ```
/// use clickrng::audio::detector::{ClickDetector, DetectorConfig, ThresholdDetector};
/// use clickrng::audio::format::AudioFormat;
/// use clickrng::audio::ingest::SampleBlock;
///
/// let mut samples = vec![0i32; 1000];
/// samples[500] = 20_000;
/// let block = SampleBlock::from_samples(AudioFormat::s16_mono(192_000), samples, 0);
///
/// let mut detector = ThresholdDetector::new();
/// let detection = detector.process_block(&block, &DetectorConfig::default());
/// assert_eq!(detection.events.len(), 1);
/// assert_eq!(detection.peak_indices, vec![500]);
/// ```
#[derive(Debug, Default)]
pub struct ThresholdDetector {
    /// Signal time consumed so far
    elapsed_ns: u64,
    /// Timestamp of the last accepted click
    last_click_ns: Option<u64>,
}

impl ThresholdDetector {
    /// Create a detector with a zeroed time cursor
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the most recently accepted click, if any
    pub fn last_click_ns(&self) -> Option<u64> {
        self.last_click_ns
    }

    fn lockout_clear(&self, timestamp_ns: u64, lock_time_ns: u64) -> bool {
        match self.last_click_ns {
            None => true,
            Some(last) => timestamp_ns.saturating_sub(last) > lock_time_ns,
        }
    }
}

/// Samples covered by `lock_time_ns` at the given rate, at least 1
pub(crate) fn lockout_samples(lock_time_ns: u64, sample_rate: u32) -> usize {
    let samples = lock_time_ns as u128 * sample_rate as u128 / 1_000_000_000;
    (samples as usize).max(1)
}

impl ClickDetector for ThresholdDetector {
    fn process_block(&mut self, block: &SampleBlock, config: &DetectorConfig) -> Detection {
        let mut detection = Detection::default();
        let frames = block.frames();
        if frames == 0 {
            return detection;
        }

        let start_ns = self.elapsed_ns;
        let duration_ns = block.duration_ns();
        let skip = lockout_samples(config.lock_time_ns, block.format.sample_rate);

        let mut i = 0;
        while i < frames {
            if block.samples[i] > config.threshold {
                let timestamp_ns = start_ns + i as u64 * duration_ns / frames as u64;
                if self.lockout_clear(timestamp_ns, config.lock_time_ns) {
                    self.last_click_ns = Some(timestamp_ns);
                    detection.events.push(ClickEvent {
                        timestamp_ns,
                        correlation: None,
                    });
                    detection.peak_indices.push(i);
                    tracing::trace!(index = i, timestamp_ns, "click accepted");
                    i += skip;
                    continue;
                }
            }
            i += 1;
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

    fn block_with_spikes(len: usize, spikes: &[(usize, i32)]) -> SampleBlock {
        let mut samples = vec![0i32; len];
        for &(index, value) in spikes {
            samples[index] = value;
        }
        SampleBlock::from_samples(AudioFormat::s16_mono(192_000), samples, 0)
    }

    fn config(threshold: i32, lock_time_ns: u64) -> DetectorConfig {
        DetectorConfig {
            threshold,
            lock_time_ns,
            ..DetectorConfig::default()
        }
    }

    // Lockout duration equivalent to `samples` at 192kHz
    fn lock_ns_for_samples(samples: u64) -> u64 {
        samples * 1_000_000_000 / 192_000
    }

    #[test]
    fn test_single_spike_timestamp_proportional() {
        let block = block_with_spikes(1000, &[(500, 10_001)]);
        let mut detector = ThresholdDetector::new();

        let detection = detector.process_block(&block, &config(10_000, lock_ns_for_samples(2000)));

        assert_eq!(detection.events.len(), 1, "exactly one click expected");
        let expected = 500 * block.duration_ns() / 1000;
        assert_eq!(detection.events[0].timestamp_ns, expected);
        assert_eq!(detection.peak_indices, vec![500]);
        assert!(detection.events[0].correlation.is_none());
    }

    #[test]
    fn test_second_crossing_inside_lockout_suppressed() {
        let block = block_with_spikes(1000, &[(500, 20_000), (520, 20_000)]);
        let mut detector = ThresholdDetector::new();

        let detection = detector.process_block(&block, &config(10_000, lock_ns_for_samples(100)));

        assert_eq!(
            detection.events.len(),
            1,
            "crossing at 520 lies inside the 100-sample lockout"
        );
        assert_eq!(detection.peak_indices, vec![500]);
    }

    #[test]
    fn test_two_crossings_outside_lockout_both_fire() {
        let block = block_with_spikes(1000, &[(100, 20_000), (600, 20_000)]);
        let mut detector = ThresholdDetector::new();

        let detection = detector.process_block(&block, &config(10_000, lock_ns_for_samples(100)));

        assert_eq!(detection.events.len(), 2);
        assert_eq!(detection.peak_indices, vec![100, 600]);
        assert!(detection.events[0].timestamp_ns < detection.events[1].timestamp_ns);
    }

    #[test]
    fn test_first_crossing_wins_no_lookahead() {
        // A larger peak right after the first crossing must not steal the event
        let block = block_with_spikes(1000, &[(300, 10_001), (301, 30_000)]);
        let mut detector = ThresholdDetector::new();

        let detection = detector.process_block(&block, &config(10_000, lock_ns_for_samples(500)));

        assert_eq!(detection.peak_indices, vec![300]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let block = block_with_spikes(1000, &[(500, 10_000)]);
        let mut detector = ThresholdDetector::new();

        let detection = detector.process_block(&block, &config(10_000, 0));

        assert!(
            detection.events.is_empty(),
            "a sample equal to the threshold does not trigger"
        );
    }

    #[test]
    fn test_negative_spike_does_not_trigger() {
        let block = block_with_spikes(1000, &[(500, -30_000)]);
        let mut detector = ThresholdDetector::new();

        let detection = detector.process_block(&block, &config(10_000, 0));
        assert!(detection.events.is_empty());
    }

    #[test]
    fn test_empty_blocks_leave_state_untouched() {
        let mut detector = ThresholdDetector::new();
        let empty = SampleBlock::from_samples(AudioFormat::s16_mono(192_000), vec![], 0);
        let cfg = config(10_000, 0);

        for _ in 0..3 {
            let detection = detector.process_block(&empty, &cfg);
            assert!(detection.events.is_empty());
        }
        assert_eq!(detector.elapsed_ns(), 0);

        // Detection still works afterwards
        let block = block_with_spikes(1000, &[(10, 20_000)]);
        assert_eq!(detector.process_block(&block, &cfg).events.len(), 1);
    }

    #[test]
    fn test_lockout_spans_blocks() {
        let lock = lock_ns_for_samples(2000);
        let mut detector = ThresholdDetector::new();
        let cfg = config(10_000, lock);

        // Click at the end of the first block
        let first = block_with_spikes(1000, &[(990, 20_000)]);
        assert_eq!(detector.process_block(&first, &cfg).events.len(), 1);

        // Click early in the second block, still inside the lockout
        let second = block_with_spikes(1000, &[(100, 20_000)]);
        assert!(
            detector.process_block(&second, &cfg).events.is_empty(),
            "lockout must carry across block boundaries"
        );

        // 2009 samples after the first click the lockout has expired
        let third = block_with_spikes(1000, &[(999, 20_000)]);
        assert_eq!(detector.process_block(&third, &cfg).events.len(), 1);
    }

    #[test]
    fn test_elapsed_cursor_advances_per_block() {
        let mut detector = ThresholdDetector::new();
        let block = block_with_spikes(1920, &[]);
        let cfg = config(10_000, 0);

        detector.process_block(&block, &cfg);
        detector.process_block(&block, &cfg);

        assert_eq!(detector.elapsed_ns(), 2 * block.duration_ns());
    }

    #[test]
    fn test_reset_clears_cursor_and_lockout() {
        let mut detector = ThresholdDetector::new();
        let cfg = config(10_000, lock_ns_for_samples(100_000));
        let block = block_with_spikes(1000, &[(10, 20_000)]);

        assert_eq!(detector.process_block(&block, &cfg).events.len(), 1);
        detector.reset();

        assert_eq!(detector.elapsed_ns(), 0);
        assert!(detector.last_click_ns().is_none());
        assert_eq!(
            detector.process_block(&block, &cfg).events.len(),
            1,
            "first click after reset is accepted regardless of old lockout"
        );
    }
}
