//! Block hand-off from capture to analysis
//!
//! The capture side and the analysis side meet at a single-slot exchange:
//! the producer swaps a freshly captured block in under a short lock, the
//! consumer swaps it out. If analysis lags, the newest block replaces the
//! undelivered one; there is never more than one block in flight. Level
//! metering and the rendering feed are produced here on the producer side so
//! the analysis path never owes the renderer anything.

use crate::audio::format::{AudioFormat, FormatError};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// One captured block of PCM audio, decoded to sign-centered samples
///
/// Ownership moves from capture to analysis on delivery; the block is never
/// shared or mutated after construction.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    /// Format the block was captured in
    pub format: AudioFormat,
    /// Decoded samples, channels interleaved
    pub samples: Vec<i32>,
    /// Monotonic capture timestamp in nanoseconds since stream start
    pub timestamp_ns: u64,
    /// Peak sample magnitude, in the format's metering convention
    pub peak_magnitude: u32,
}

impl SampleBlock {
    /// Decode a raw byte buffer into a block
    ///
    /// # Errors
    /// Propagates [`FormatError`] from decoding.
    pub fn from_bytes(
        format: AudioFormat,
        bytes: &[u8],
        timestamp_ns: u64,
    ) -> Result<Self, FormatError> {
        let samples = format.decode_samples(bytes)?;
        Ok(Self::from_samples(format, samples, timestamp_ns))
    }

    /// Build a block from already-decoded samples
    pub fn from_samples(format: AudioFormat, samples: Vec<i32>, timestamp_ns: u64) -> Self {
        let peak_magnitude = samples
            .iter()
            .map(|&s| format.magnitude_of(s))
            .max()
            .unwrap_or(0);
        Self {
            format,
            samples,
            timestamp_ns,
            peak_magnitude,
        }
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    /// True if the block holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration covered by this block in nanoseconds
    pub fn duration_ns(&self) -> u64 {
        if self.format.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1_000_000_000 / self.format.sample_rate as u64
    }
}

/// Events published to the rendering collaborator
///
/// Delivery is best-effort over a bounded channel; events are dropped
/// silently when the renderer lags and nothing in the pipeline waits on it.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Instantaneous peak level, 0.0 to 1.0
    Level(f32),
    /// Decoded samples of the latest block, for the waveform trace
    Waveform(Vec<i32>),
    /// Intra-block sample indices of detected clicks, for peak markers
    Peaks(Vec<usize>),
}

/// Producer/consumer hand-off point for sample blocks
///
/// Shared as `Arc<SampleIngest>` between the capture thread (calling
/// [`deliver`](Self::deliver)) and the analysis thread (calling
/// [`take_timeout`](Self::take_timeout)). The lock guards only the slot swap;
/// detection work always runs on the consumer's own copy after the lock is
/// released.
pub struct SampleIngest {
    slot: Mutex<Option<SampleBlock>>,
    available: Condvar,
    monitor: Option<Sender<MonitorEvent>>,
    last_level: AtomicU32,
    blocks_delivered: AtomicU64,
    blocks_replaced: AtomicU64,
    degenerate_warned: AtomicBool,
}

impl SampleIngest {
    /// Create an ingest point with no rendering feed
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an ingest point publishing monitor events to `tx`
    pub fn with_monitor(tx: Sender<MonitorEvent>) -> Self {
        Self::build(Some(tx))
    }

    fn build(monitor: Option<Sender<MonitorEvent>>) -> Self {
        Self {
            slot: Mutex::new(None),
            available: Condvar::new(),
            monitor,
            last_level: AtomicU32::new(0.0f32.to_bits()),
            blocks_delivered: AtomicU64::new(0),
            blocks_replaced: AtomicU64::new(0),
            degenerate_warned: AtomicBool::new(false),
        }
    }

    /// Hand a block to the analysis side
    ///
    /// Computes and publishes the level metric, forwards the waveform to the
    /// rendering feed, then swaps the block into the slot. Never blocks on
    /// the consumer; if the previous block was not collected yet it is
    /// replaced and counted in [`blocks_replaced`](Self::blocks_replaced).
    pub fn deliver(&self, block: SampleBlock) {
        let max_amplitude = block.format.max_amplitude();
        let level = if max_amplitude == 0 {
            if !self.degenerate_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    bits = block.format.bits_per_sample,
                    "format derives zero full-scale amplitude, level metering disabled"
                );
            }
            0.0
        } else {
            block.peak_magnitude.min(max_amplitude) as f32 / max_amplitude as f32
        };
        self.last_level.store(level.to_bits(), Ordering::Relaxed);

        if let Some(tx) = &self.monitor {
            let _ = tx.try_send(MonitorEvent::Level(level));
            let _ = tx.try_send(MonitorEvent::Waveform(block.samples.clone()));
        }

        let replaced = {
            let mut slot = self.slot.lock().unwrap();
            let replaced = slot.replace(block).is_some();
            self.available.notify_one();
            replaced
        };

        self.blocks_delivered.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.blocks_replaced.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("analysis lagging, newest block replaced an undelivered one");
        }
    }

    /// Take the pending block without waiting
    pub fn try_take(&self) -> Option<SampleBlock> {
        self.slot.lock().unwrap().take()
    }

    /// Take the pending block, waiting up to `timeout` for one to arrive
    pub fn take_timeout(&self, timeout: Duration) -> Option<SampleBlock> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap();
        loop {
            if let Some(block) = slot.take() {
                return Some(block);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self.available.wait_timeout(slot, deadline - now).unwrap();
            slot = guard;
            if result.timed_out() {
                return slot.take();
            }
        }
    }

    /// Most recent level metric, 0.0 to 1.0
    pub fn level(&self) -> f32 {
        f32::from_bits(self.last_level.load(Ordering::Relaxed))
    }

    /// Total blocks delivered by the producer
    pub fn blocks_delivered(&self) -> u64 {
        self.blocks_delivered.load(Ordering::Relaxed)
    }

    /// Blocks that were replaced in the slot before the consumer collected them
    pub fn blocks_replaced(&self) -> u64 {
        self.blocks_replaced.load(Ordering::Relaxed)
    }
}

impl Default for SampleIngest {
    fn default() -> Self {
        Self::new()
    }
}
