//! Random byte production
//!
//! This module turns click timestamps into gated random bytes:
//! - Interval comparison and bias compensation ([`extractor`])
//! - LSB-first byte packing and batch assembly ([`accumulator`])
//! - Monobit self-test and entropy estimate ([`health`])
//! - The pipeline state machine tying it together ([`generator`])
//! - Output sinks for authorized batches ([`sink`])
//! - Persisted tuning settings ([`settings`])

pub mod accumulator;
pub mod extractor;
pub mod generator;
pub mod health;
pub mod settings;
pub mod sink;
