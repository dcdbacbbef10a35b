//! Clickrng - Random bytes from the timing jitter of acoustic clicks
//!
//! This library turns a stream of PCM sample blocks into a gated stream of
//! random bytes. Clicks (Geiger counter ticks, relay snaps, any sharp
//! transient) are located in the signal, their inter-arrival jitter is
//! compared pairwise to produce raw bits, bits are packed into fixed-size
//! byte batches, and every batch must pass a monobit self-test before it is
//! released to the output sink.

pub mod audio;
pub mod rng;

pub use audio::detector::{ClickDetector, DetectorConfig, ThresholdDetector};
pub use audio::format::AudioFormat;
pub use audio::ingest::{SampleBlock, SampleIngest};
pub use rng::generator::{Generator, GeneratorConfig, GeneratorState};
pub use rng::health::HealthReport;
pub use rng::sink::OutputGate;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default sample rate for click capture
pub const DEFAULT_SAMPLE_RATE: u32 = 192_000;

/// Default click threshold in raw 16-bit sample units
pub const DEFAULT_THRESHOLD: i32 = 10_000;

/// Default lockout after an accepted click (10 ms)
pub const DEFAULT_LOCK_TIME_NS: u64 = 10_000_000;

/// Default byte batch size, matching the monobit test window
pub const DEFAULT_BATCH_BYTES: usize = rng::health::MONOBIT_WINDOW_BYTES;
