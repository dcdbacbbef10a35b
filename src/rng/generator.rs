//! Pipeline assembly and lifecycle
//!
//! [`Generator`] wires detector, extractor, accumulator, health gate and
//! output sink into one state machine. Blocks go in, authorized batches
//! come out of the sink; everything in between is deterministic given the
//! click timestamps.

use crate::audio::detector::{ClickDetector, DetectorConfig};
use crate::audio::ingest::{MonitorEvent, SampleBlock};
use crate::rng::accumulator::ByteAccumulator;
use crate::rng::extractor::BitExtractor;
use crate::rng::health;
use crate::rng::settings::GeneratorSettings;
use crate::rng::sink::OutputGate;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle states of the pipeline
///
/// A pause request never takes effect mid-byte: it parks in `PausePending`
/// until the accumulator completes its current byte, then lands in `Paused`.
/// Audio may keep flowing in every state; only `Running` and `PausePending`
/// produce bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// No generation; all derivation state cleared
    Stopped,
    /// Clicks are being turned into bits
    Running,
    /// Pause requested, waiting for the current byte to complete
    PausePending,
    /// Generation suspended at a byte boundary
    Paused,
}

/// Shared run counters, updated by the pipeline and readable from any thread
#[derive(Debug, Default)]
pub struct GeneratorCounters {
    blocks: AtomicU64,
    clicks: AtomicU64,
    bits: AtomicU64,
    batches_emitted: AtomicU64,
    batches_rejected: AtomicU64,
}

impl GeneratorCounters {
    /// Blocks handed to the pipeline, including while stopped or paused
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Clicks accepted by the detector
    pub fn clicks(&self) -> u64 {
        self.clicks.load(Ordering::Relaxed)
    }

    /// Bits produced by the extractor
    pub fn bits(&self) -> u64 {
        self.bits.load(Ordering::Relaxed)
    }

    /// Batches that passed the health gate and reached the sink
    pub fn batches_emitted(&self) -> u64 {
        self.batches_emitted.load(Ordering::Relaxed)
    }

    /// Batches dropped by the health gate
    pub fn batches_rejected(&self) -> u64 {
        self.batches_rejected.load(Ordering::Relaxed)
    }
}

/// Tunable pipeline parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    /// Detector tuning, snapshotted per block
    pub detector: DetectorConfig,
    /// Apply the alternating-inversion bias compensation to extracted bits
    pub bias_compensation: bool,
    /// Batch size handed to the health gate, in bytes
    pub batch_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            bias_compensation: true,
            batch_bytes: crate::DEFAULT_BATCH_BYTES,
        }
    }
}

/// The click-to-random-bytes pipeline
///
/// # Example
/// ```
/// use clickrng::audio::detector::ThresholdDetector;
/// use clickrng::rng::generator::{Generator, GeneratorConfig, GeneratorState};
/// use clickrng::rng::sink::MemoryGate;
///
/// let gate = MemoryGate::new();
/// let mut generator = Generator::new(
///     GeneratorConfig::default(),
///     ThresholdDetector::new(),
///     gate.clone(),
/// );
/// assert_eq!(generator.state(), GeneratorState::Stopped);
/// generator.start();
/// assert_eq!(generator.state(), GeneratorState::Running);
/// ```
pub struct Generator {
    state: GeneratorState,
    config: GeneratorConfig,
    detector: Box<dyn ClickDetector>,
    extractor: BitExtractor,
    accumulator: ByteAccumulator,
    gate: Box<dyn OutputGate>,
    monitor: Option<Sender<MonitorEvent>>,
    counters: Arc<GeneratorCounters>,
}

impl Generator {
    /// Assemble a stopped pipeline around a detector and an output sink
    pub fn new(
        config: GeneratorConfig,
        detector: impl ClickDetector + 'static,
        gate: impl OutputGate + 'static,
    ) -> Self {
        Self {
            state: GeneratorState::Stopped,
            extractor: BitExtractor::new(config.bias_compensation),
            accumulator: ByteAccumulator::new(config.batch_bytes),
            config,
            detector: Box::new(detector),
            gate: Box::new(gate),
            monitor: None,
            counters: Arc::new(GeneratorCounters::default()),
        }
    }

    /// Attach a monitor channel; detector peak positions are sent to it
    pub fn with_monitor(mut self, monitor: Sender<MonitorEvent>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Current tunables
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Handle to the shared run counters
    pub fn counters(&self) -> Arc<GeneratorCounters> {
        Arc::clone(&self.counters)
    }

    /// Nanoseconds of signal the detector has consumed since start or resume
    pub fn elapsed_ns(&self) -> u64 {
        self.detector.elapsed_ns()
    }

    /// Begin generation
    ///
    /// # Panics
    /// If the pipeline is not stopped; starting twice is a caller bug.
    pub fn start(&mut self) {
        assert!(
            self.state == GeneratorState::Stopped,
            "start called in state {:?}",
            self.state
        );
        self.state = GeneratorState::Running;
        tracing::info!(
            threshold = self.config.detector.threshold,
            lock_time_ns = self.config.detector.lock_time_ns,
            batch_bytes = self.config.batch_bytes,
            bias_compensation = self.config.bias_compensation,
            "generation started"
        );
    }

    /// Request a pause, honored at the next byte boundary
    ///
    /// While stopped or already pausing this does nothing.
    pub fn request_pause(&mut self) {
        match self.state {
            GeneratorState::Running => {
                self.state = GeneratorState::PausePending;
                tracing::info!("pause requested, resolving at next byte boundary");
            }
            GeneratorState::PausePending | GeneratorState::Paused => {}
            GeneratorState::Stopped => {
                tracing::warn!("pause requested while stopped, ignoring");
            }
        }
    }

    /// Resume from a resolved pause
    ///
    /// The detector and the extractor restart from clean timing state, so
    /// the silent gap spent paused can never masquerade as an interval.
    ///
    /// # Panics
    /// If a pause request is still pending; the caller must wait for the
    /// pause to resolve before resuming.
    pub fn resume(&mut self) {
        assert!(
            self.state != GeneratorState::PausePending,
            "resume called while a pause is still pending"
        );
        match self.state {
            GeneratorState::Paused => {
                self.detector.reset();
                self.extractor.reset();
                self.state = GeneratorState::Running;
                tracing::info!("generation resumed");
            }
            GeneratorState::Running => {}
            GeneratorState::Stopped => {
                tracing::warn!("resume requested while stopped, ignoring");
            }
            GeneratorState::PausePending => unreachable!(),
        }
    }

    /// Stop generation and clear all derivation state
    ///
    /// A partially filled batch is discarded; only batches that completed
    /// and passed the health gate ever leave the pipeline.
    pub fn stop(&mut self) {
        self.detector.reset();
        self.extractor.reset();
        self.accumulator.reset();
        self.state = GeneratorState::Stopped;
        tracing::info!(
            clicks = self.counters.clicks(),
            bits = self.counters.bits(),
            batches_emitted = self.counters.batches_emitted(),
            batches_rejected = self.counters.batches_rejected(),
            "generation stopped"
        );
    }

    /// Set the click threshold in raw sample units
    pub fn set_threshold(&mut self, threshold: i32) {
        self.config.detector.threshold = threshold;
    }

    /// Set the click lockout in nanoseconds
    pub fn set_lock_time_ns(&mut self, lock_time_ns: u64) {
        self.config.detector.lock_time_ns = lock_time_ns;
    }

    /// Set the matched-filter acceptance threshold
    pub fn set_correlation_threshold(&mut self, correlation_threshold: f64) {
        self.config.detector.correlation_threshold = correlation_threshold;
    }

    /// Toggle bias compensation; affects the next extracted bit
    pub fn set_bias_compensation(&mut self, enabled: bool) {
        self.config.bias_compensation = enabled;
        self.extractor.set_bias_compensation(enabled);
    }

    /// Change the batch size; takes effect per the accumulator's rules
    pub fn set_batch_bytes(&mut self, batch_bytes: usize) {
        self.config.batch_bytes = batch_bytes;
        self.accumulator.set_batch_bytes(batch_bytes);
    }

    /// Apply persisted settings to the running pipeline
    ///
    /// The tunables take effect immediately; a persisted `paused` flag is
    /// translated into a pause request.
    pub fn apply_settings(&mut self, settings: &GeneratorSettings) {
        self.set_threshold(settings.threshold);
        self.set_lock_time_ns(settings.lock_time_ns);
        self.set_bias_compensation(settings.bias_compensation);
        if settings.paused && self.state == GeneratorState::Running {
            self.request_pause();
        }
    }

    /// Run one block through the pipeline
    ///
    /// While stopped or paused the block is counted and otherwise ignored.
    /// Detector tuning is snapshotted once per call, so a settings change
    /// can never straddle a block.
    pub fn process_block(&mut self, block: &SampleBlock) {
        self.counters.blocks.fetch_add(1, Ordering::Relaxed);
        match self.state {
            GeneratorState::Stopped | GeneratorState::Paused => return,
            GeneratorState::Running | GeneratorState::PausePending => {}
        }

        let config = self.config.detector;
        let detection = self.detector.process_block(block, &config);

        if let Some(monitor) = &self.monitor {
            if !detection.peak_indices.is_empty() {
                let _ = monitor.try_send(MonitorEvent::Peaks(detection.peak_indices.clone()));
            }
        }

        for event in &detection.events {
            self.counters.clicks.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                timestamp_ns = event.timestamp_ns,
                correlation = event.correlation,
                "click accepted"
            );

            let Some(raw) = self.extractor.push_click(event.timestamp_ns) else {
                continue;
            };
            self.counters.bits.fetch_add(1, Ordering::Relaxed);

            let result = self.accumulator.push_bit(raw.value);
            if let Some(batch) = result.completed_batch {
                self.finish_batch(batch);
            }
            if result.byte_boundary && self.state == GeneratorState::PausePending {
                debug_assert!(self.accumulator.at_byte_boundary());
                self.state = GeneratorState::Paused;
                tracing::info!("pause resolved at byte boundary");
                break;
            }
        }
    }

    /// Gate one completed batch and hand it onward exactly once
    fn finish_batch(&mut self, batch: Vec<u8>) {
        let report = health::evaluate(&batch);
        self.gate.publish_report(&report);
        if report.passed {
            self.counters.batches_emitted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                bytes = batch.len(),
                entropy = report.entropy,
                "batch authorized"
            );
            self.gate.emit_batch(&batch);
        } else {
            self.counters.batches_rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                bit_count = report.bit_count,
                windows_failed = report.windows_failed,
                "monobit check failed, batch dropped"
            );
        }
    }
}
