//! Statistical self-test for completed byte batches
//!
//! Two measures run over every frozen batch: the FIPS-140-2-style monobit
//! test, which alone decides whether the batch may be emitted, and a Shannon
//! entropy estimate, which is informational. A monobit failure is an
//! expected operating condition (a stuck click source, a too-hot threshold),
//! not an error: the batch is dropped and collection continues.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Monobit window size in bytes
pub const MONOBIT_WINDOW_BYTES: usize = 2500;

/// Monobit window size in bits
pub const MONOBIT_WINDOW_BITS: u32 = MONOBIT_WINDOW_BYTES as u32 * 8;

/// Exclusive lower bound on set bits per window
pub const MONOBIT_MIN_ONES: u32 = 9654;

/// Exclusive upper bound on set bits per window
pub const MONOBIT_MAX_ONES: u32 = 10346;

/// The entropy estimate needs more symbols than the alphabet size
pub const ENTROPY_MIN_SYMBOLS: usize = 256;

/// Result of the monobit test over one batch
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MonobitOutcome {
    /// True iff at least one window was evaluated and none failed
    pub passed: bool,
    /// Total set bits across the evaluated windows
    pub bit_count: u64,
    /// Complete 20000-bit windows evaluated
    pub windows_tested: usize,
    /// Windows whose set-bit count fell outside the accepted range
    pub windows_failed: usize,
}

/// Count set bits per 20000-bit window and check each against the bounds
///
/// The canonical batch is exactly one window (2500 bytes). Larger batches
/// are scanned window by window; a trailing remainder shorter than a window
/// is not evaluated. A batch below one window cannot be evaluated and fails.
///
/// # Example
/// ```
/// use clickrng::rng::health::monobit_test;
///
/// // 1250 full bytes gives exactly 10000 of 20000 set bits
/// let mut bytes = vec![0xffu8; 1250];
/// bytes.resize(2500, 0x00);
/// assert!(monobit_test(&bytes).passed);
///
/// assert!(!monobit_test(&vec![0u8; 2500]).passed);
/// ```
pub fn monobit_test(bytes: &[u8]) -> MonobitOutcome {
    let mut bit_count = 0u64;
    let mut windows_tested = 0;
    let mut windows_failed = 0;

    for window in bytes.chunks_exact(MONOBIT_WINDOW_BYTES) {
        let ones: u32 = window.iter().map(|b| b.count_ones()).sum();
        windows_tested += 1;
        bit_count += ones as u64;
        if ones <= MONOBIT_MIN_ONES || ones >= MONOBIT_MAX_ONES {
            windows_failed += 1;
        }
    }

    MonobitOutcome {
        passed: windows_tested > 0 && windows_failed == 0,
        bit_count,
        windows_tested,
        windows_failed,
    }
}

/// Shannon entropy of the byte-value distribution, in bits per symbol
///
/// Builds a 256-bin histogram and sums `-p·log2(p)` over the occupied bins.
/// Ranges from 0.0 (all bytes identical) to 8.0 (uniform distribution).
pub fn shannon_entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }

    let mut histogram = [0u64; 256];
    for &b in bytes {
        histogram[b as usize] += 1;
    }

    let n = bytes.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// Health verdict for one batch
///
/// `passed` mirrors the monobit outcome and is the sole gate condition; the
/// entropy figure rides along for telemetry. `entropy_reliable` is false for
/// batches too small to estimate a 256-symbol distribution.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Gate decision: true iff the monobit test passed
    pub passed: bool,
    /// Set bits across the evaluated monobit windows
    pub bit_count: u64,
    /// Monobit windows evaluated
    pub windows_tested: usize,
    /// Monobit windows that failed
    pub windows_failed: usize,
    /// Shannon entropy estimate in bits per symbol
    pub entropy: f64,
    /// False when the batch is too small for the estimate to mean anything
    pub entropy_reliable: bool,
    /// Batch size in bytes
    pub batch_bytes: usize,
    /// Wall-clock time of the evaluation
    pub timestamp: DateTime<Utc>,
}

/// Run both tests over a frozen batch
pub fn evaluate(bytes: &[u8]) -> HealthReport {
    let monobit = monobit_test(bytes);
    HealthReport {
        passed: monobit.passed,
        bit_count: monobit.bit_count,
        windows_tested: monobit.windows_tested,
        windows_failed: monobit.windows_failed,
        entropy: shannon_entropy(bytes),
        entropy_reliable: bytes.len() > ENTROPY_MIN_SYMBOLS,
        batch_bytes: bytes.len(),
        timestamp: Utc::now(),
    }
}
