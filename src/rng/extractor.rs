//! Bit extraction from click timing
//!
//! Each pair of consecutive inter-click intervals is compared to produce one
//! raw bit: 1 if the newer interval is longer. The optional bias
//! compensation XORs an alternating toggle into the bit stream, spreading a
//! directional drift of the click source (a steadily speeding-up or
//! slowing-down process) evenly over both bit values. That is an
//! approximation: unlike von Neumann debiasing it discards nothing, and
//! residual correlation survives it. The monobit gate downstream is the
//! backstop.

/// One extracted bit with the intervals that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBit {
    /// The bit value after bias compensation
    pub value: bool,
    /// Newest inter-click interval in nanoseconds
    pub interval_ns: u64,
    /// Previous inter-click interval in nanoseconds
    pub previous_interval_ns: u64,
}

/// Interval-comparator bit extractor
///
/// Needs three clicks before the first bit: two to form the first interval,
/// a third to form the second. From then on every click yields one bit.
///
/// # Example
/// ```
/// use clickrng::rng::extractor::BitExtractor;
///
/// let mut extractor = BitExtractor::new(false);
/// assert!(extractor.push_click(0).is_none());
/// assert!(extractor.push_click(10).is_none());
/// // dt = 20 > previous dt = 10, so the bit is 1
/// assert!(extractor.push_click(30).unwrap().value);
/// // dt = 5 < previous dt = 20, so the bit is 0
/// assert!(!extractor.push_click(35).unwrap().value);
/// ```
#[derive(Debug)]
pub struct BitExtractor {
    /// Timestamp of the previous click
    last_timestamp_ns: Option<u64>,
    /// Previous inter-click interval
    last_interval_ns: Option<u64>,
    /// Whether the compensation toggle is XORed into emitted bits
    bias_compensation: bool,
    /// Compensation toggle, flipped after every emitted bit
    inverter: bool,
}

impl BitExtractor {
    /// Create an extractor, with or without bias compensation
    pub fn new(bias_compensation: bool) -> Self {
        Self {
            last_timestamp_ns: None,
            last_interval_ns: None,
            bias_compensation,
            inverter: false,
        }
    }

    /// Feed the next click timestamp; returns a bit once two intervals exist
    ///
    /// Timestamps must be monotonic; they come from the detector's elapsed
    /// cursor, which guarantees it.
    pub fn push_click(&mut self, timestamp_ns: u64) -> Option<RawBit> {
        let previous_timestamp = match self.last_timestamp_ns.replace(timestamp_ns) {
            None => return None,
            Some(t) => t,
        };
        let interval_ns = timestamp_ns.saturating_sub(previous_timestamp);

        let previous_interval_ns = match self.last_interval_ns.replace(interval_ns) {
            None => return None,
            Some(dt) => dt,
        };

        let mut value = interval_ns > previous_interval_ns;
        if self.bias_compensation {
            value ^= self.inverter;
        }
        self.inverter = !self.inverter;

        Some(RawBit {
            value,
            interval_ns,
            previous_interval_ns,
        })
    }

    /// Enable or disable bias compensation
    ///
    /// Takes effect from the next bit; interval history is untouched, so
    /// toggling never needs a detector reset.
    pub fn set_bias_compensation(&mut self, enabled: bool) {
        self.bias_compensation = enabled;
    }

    /// Whether bias compensation is active
    pub fn bias_compensation(&self) -> bool {
        self.bias_compensation
    }

    /// Clear interval history and the compensation toggle
    ///
    /// Called on resume so an interval spanning a pause is never read as a
    /// bit. The bias compensation setting itself survives.
    pub fn reset(&mut self) {
        self.last_timestamp_ns = None;
        self.last_interval_ns = None;
        self.inverter = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_from(timestamps: &[u64], bias: bool) -> Vec<bool> {
        let mut extractor = BitExtractor::new(bias);
        timestamps
            .iter()
            .filter_map(|&t| extractor.push_click(t))
            .map(|b| b.value)
            .collect()
    }

    #[test]
    fn test_canonical_interval_sequence() {
        // dt sequence 10, 20, 5: 20 > 10 gives 1, 5 < 20 gives 0
        assert_eq!(bits_from(&[0, 10, 30, 35], false), vec![true, false]);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let timestamps = [0, 10, 30, 35, 100, 120, 121];
        assert_eq!(bits_from(&timestamps, false), bits_from(&timestamps, false));
    }

    #[test]
    fn test_first_two_clicks_yield_nothing() {
        let mut extractor = BitExtractor::new(false);
        assert!(extractor.push_click(100).is_none());
        assert!(extractor.push_click(200).is_none());
        assert!(extractor.push_click(350).is_some());
    }

    #[test]
    fn test_equal_intervals_compare_as_zero() {
        // dt sequence 10, 10: not strictly greater, so the bit is 0
        assert_eq!(bits_from(&[0, 10, 20], false), vec![false]);
    }

    #[test]
    fn test_bias_compensation_alternates_constant_stream() {
        // Strictly growing intervals produce all-1 raw bits; compensation
        // turns them into an alternating pattern
        let timestamps = [0, 1, 3, 7, 15, 31, 63];
        assert_eq!(
            bits_from(&timestamps, false),
            vec![true; 5],
            "raw stream is all ones"
        );
        assert_eq!(
            bits_from(&timestamps, true),
            vec![true, false, true, false, true],
            "toggle spreads the bias across both values"
        );
    }

    #[test]
    fn test_toggle_mid_stream_without_reset() {
        let mut extractor = BitExtractor::new(false);
        extractor.push_click(0);
        extractor.push_click(10);
        let raw = extractor.push_click(30).unwrap();
        assert!(raw.value);

        extractor.set_bias_compensation(true);
        // Interval history survived the toggle: dt 5 vs 20 gives raw 0,
        // XORed with the toggle state (flipped once already) gives 1
        let next = extractor.push_click(35).unwrap();
        assert!(next.value);
        assert_eq!(next.interval_ns, 5);
        assert_eq!(next.previous_interval_ns, 20);
    }

    #[test]
    fn test_reset_clears_interval_history() {
        let mut extractor = BitExtractor::new(false);
        extractor.push_click(0);
        extractor.push_click(10);
        extractor.push_click(30);

        extractor.reset();

        assert!(extractor.push_click(1000).is_none(), "history gone");
        assert!(extractor.push_click(1010).is_none());
        assert!(extractor.push_click(1030).is_some());
    }

    #[test]
    fn test_reset_keeps_bias_setting() {
        let mut extractor = BitExtractor::new(true);
        extractor.reset();
        assert!(extractor.bias_compensation());
    }

    #[test]
    fn test_raw_bit_carries_interval_pair() {
        let mut extractor = BitExtractor::new(false);
        extractor.push_click(0);
        extractor.push_click(40);
        let raw = extractor.push_click(100).unwrap();

        assert_eq!(raw.previous_interval_ns, 40);
        assert_eq!(raw.interval_ns, 60);
        assert!(raw.value);
    }
}
