//! Audio-side processing
//!
//! This module contains everything that touches PCM data:
//! - Sample format description and decoding ([`format`])
//! - Block hand-off from capture to analysis, with level metering ([`ingest`])
//! - Threshold-with-lockout click detection ([`detector`])
//! - Matched-filter click detection against a reference waveform ([`matched`])
//! - Live microphone capture, behind the `capture` feature ([`capture`])

#[cfg(feature = "capture")]
pub mod capture;
pub mod detector;
pub mod format;
pub mod ingest;
pub mod matched;
