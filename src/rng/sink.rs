//! Output sinks for authorized batches
//!
//! The pipeline talks to its sink through [`OutputGate`]: authorized bytes
//! go in, health reports ride along for telemetry, nothing comes back. The
//! file gate appends to a binary file and survives write errors by logging
//! them; the memory gate collects everything for tests and short captures.

use crate::rng::health::HealthReport;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors constructing a sink
#[derive(Debug, Error)]
pub enum GateError {
    /// Output file could not be opened for appending
    #[error("failed to open output file {path}: {source}")]
    Open {
        /// The offending path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Receiver of authorized batches
///
/// Calls are fire-and-forget: the pipeline never waits for, retries on, or
/// even learns about sink-side failures. Implementations log their own
/// trouble.
pub trait OutputGate: Send {
    /// Persist an authorized batch, append-only
    fn emit_batch(&mut self, bytes: &[u8]);

    /// Record the health report of a completed batch, authorized or not
    fn publish_report(&mut self, report: &HealthReport);
}

/// Append-only binary file sink
///
/// Batches are written back-to-back and flushed per batch, so a crash loses
/// at most the batch being written. Reports are logged, not persisted.
pub struct FileGate {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl FileGate {
    /// Open (or create) the output file for appending
    ///
    /// # Errors
    /// [`GateError::Open`] when the file cannot be opened.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, GateError> {
        let path = path.into();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| GateError::Open {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "output file opened");
        Ok(Self {
            path,
            writer: BufWriter::with_capacity(8192, file),
            bytes_written: 0,
        })
    }

    /// Bytes successfully handed to the writer since creation
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the output file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputGate for FileGate {
    fn emit_batch(&mut self, bytes: &[u8]) {
        if let Err(e) = self.writer.write_all(bytes) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to write batch");
            return;
        }
        if let Err(e) = self.writer.flush() {
            tracing::error!(path = %self.path.display(), error = %e, "failed to flush batch");
            return;
        }
        self.bytes_written += bytes.len() as u64;
        tracing::debug!(
            bytes = bytes.len(),
            total = self.bytes_written,
            "batch appended"
        );
    }

    fn publish_report(&mut self, report: &HealthReport) {
        tracing::debug!(
            passed = report.passed,
            bit_count = report.bit_count,
            entropy = report.entropy,
            entropy_reliable = report.entropy_reliable,
            "batch health report"
        );
    }
}

impl Drop for FileGate {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::error!(path = %self.path.display(), error = %e, "failed to flush on close");
        }
    }
}

/// In-memory sink collecting batches and reports
///
/// Clones share storage, so a copy kept by the caller observes everything
/// the pipeline emitted into the gate.
#[derive(Debug, Clone, Default)]
pub struct MemoryGate {
    inner: Arc<Mutex<MemoryGateInner>>,
}

#[derive(Debug, Default)]
struct MemoryGateInner {
    batches: Vec<Vec<u8>>,
    reports: Vec<HealthReport>,
}

impl MemoryGate {
    /// Create an empty gate
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches emitted so far
    pub fn batches(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().batches.clone()
    }

    /// All reports published so far
    pub fn reports(&self) -> Vec<HealthReport> {
        self.inner.lock().unwrap().reports.clone()
    }

    /// Total authorized bytes received
    pub fn total_bytes(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .batches
            .iter()
            .map(Vec::len)
            .sum()
    }
}

impl OutputGate for MemoryGate {
    fn emit_batch(&mut self, bytes: &[u8]) {
        self.inner.lock().unwrap().batches.push(bytes.to_vec());
    }

    fn publish_report(&mut self, report: &HealthReport) {
        self.inner.lock().unwrap().reports.push(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::health;

    #[test]
    fn test_file_gate_appends_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("random.bin");

        let mut gate = FileGate::create(&path).unwrap();
        gate.emit_batch(&[1, 2, 3]);
        gate.emit_batch(&[4, 5]);

        assert_eq!(gate.bytes_written(), 5);
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_file_gate_append_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("random.bin");

        {
            let mut gate = FileGate::create(&path).unwrap();
            gate.emit_batch(&[0xaa; 4]);
        }
        {
            let mut gate = FileGate::create(&path).unwrap();
            gate.emit_batch(&[0xbb; 2]);
        }

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), 6, "second open must append, not truncate");
        assert_eq!(&contents[..4], &[0xaa; 4]);
        assert_eq!(&contents[4..], &[0xbb; 2]);
    }

    #[test]
    fn test_file_gate_rejects_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("random.bin");
        assert!(matches!(FileGate::create(path), Err(GateError::Open { .. })));
    }

    #[test]
    fn test_memory_gate_shares_storage_across_clones() {
        let gate = MemoryGate::new();
        let mut handle: Box<dyn OutputGate> = Box::new(gate.clone());

        handle.emit_batch(&[9, 9]);
        handle.publish_report(&health::evaluate(&[0x55; 2500]));

        assert_eq!(gate.batches(), vec![vec![9, 9]]);
        assert_eq!(gate.total_bytes(), 2);
        assert_eq!(gate.reports().len(), 1);
        assert!(gate.reports()[0].passed);
    }
}
