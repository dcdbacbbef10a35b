//! Byte packing and batch assembly
//!
//! Bits are packed LSB-first: the first bit of a byte lands in bit 0, the
//! eighth in bit 7. Completed bytes collect into a batch of the configured
//! size; a full batch is frozen and handed out by value while a fresh batch
//! starts immediately, so no bit is ever lost or duplicated across the
//! boundary. The bit order is a fixed convention of the output format, not
//! a tunable.

/// Outcome of pushing one bit
#[derive(Debug, Default)]
pub struct PushResult {
    /// True when this bit completed a byte; pause requests resolve here
    pub byte_boundary: bool,
    /// The frozen batch, when this bit completed one
    pub completed_batch: Option<Vec<u8>>,
}

/// LSB-first bit-to-byte accumulator with fixed-size batching
///
/// # Example
/// ```
/// use clickrng::rng::accumulator::ByteAccumulator;
///
/// let mut acc = ByteAccumulator::new(1);
/// let bits = [true, false, true, true, false, false, false, false];
/// let mut completed = None;
/// for bit in bits {
///     let result = acc.push_bit(bit);
///     if let Some(batch) = result.completed_batch {
///         completed = Some(batch);
///     }
/// }
/// assert_eq!(completed.unwrap(), vec![0b0000_1101]);
/// ```
#[derive(Debug)]
pub struct ByteAccumulator {
    batch: Vec<u8>,
    current_byte: u8,
    bit_index: u8,
    batch_bytes: usize,
}

impl ByteAccumulator {
    /// Create an accumulator producing batches of `batch_bytes` bytes
    ///
    /// # Panics
    /// If `batch_bytes` is 0.
    pub fn new(batch_bytes: usize) -> Self {
        assert!(batch_bytes > 0, "batch size must be at least one byte");
        Self {
            batch: Vec::with_capacity(batch_bytes),
            current_byte: 0,
            bit_index: 0,
            batch_bytes,
        }
    }

    /// Pack one bit; reports byte and batch completion
    pub fn push_bit(&mut self, bit: bool) -> PushResult {
        if bit {
            self.current_byte |= 1 << self.bit_index;
        }
        self.bit_index += 1;

        let mut result = PushResult::default();
        if self.bit_index == 8 {
            self.batch.push(self.current_byte);
            self.current_byte = 0;
            self.bit_index = 0;
            result.byte_boundary = true;

            if self.batch.len() >= self.batch_bytes {
                let frozen = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_bytes));
                result.completed_batch = Some(frozen);
            }
        }
        result
    }

    /// Change the batch size
    ///
    /// Takes effect when the current batch next completes a byte; a shrink
    /// below the current fill level freezes the batch at that point.
    ///
    /// # Panics
    /// If `batch_bytes` is 0.
    pub fn set_batch_bytes(&mut self, batch_bytes: usize) {
        assert!(batch_bytes > 0, "batch size must be at least one byte");
        self.batch_bytes = batch_bytes;
    }

    /// Configured batch size in bytes
    pub fn batch_bytes(&self) -> usize {
        self.batch_bytes
    }

    /// Bits collected into the partial byte, 0 to 7
    pub fn pending_bits(&self) -> u8 {
        self.bit_index
    }

    /// Complete bytes collected into the active batch
    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    /// True when no byte is half-assembled
    pub fn at_byte_boundary(&self) -> bool {
        self.bit_index == 0
    }

    /// Discard the partial byte and the active batch
    pub fn reset(&mut self) {
        self.batch.clear();
        self.current_byte = 0;
        self.bit_index = 0;
    }
}
