//! Live microphone capture with cpal
//!
//! The audio callback stays minimal: convert the hardware's samples to the
//! pipeline's signed 16-bit domain and push them into a lock-free ring
//! buffer. A collector thread assembles fixed-size blocks from the ring and
//! delivers them to [`SampleIngest`], so detection work never runs inside
//! the driver callback.

use crate::audio::format::AudioFormat;
use crate::audio::ingest::{SampleBlock, SampleIngest};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from capture setup
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No input device is available on the default host
    #[error("no input device available")]
    NoDevice,

    /// The requested device name matched nothing
    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    /// Device enumeration failed
    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    /// The device would not report a default input config
    #[error("failed to query device config: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),

    /// The device's sample format has no conversion path
    #[error("unsupported stream sample format: {0:?}")]
    UnsupportedSampleFormat(cpal::SampleFormat),

    /// Stream construction failed
    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// Stream start failed
    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// Capture parameters
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Input device name (None = system default)
    pub device: Option<String>,
    /// Requested sample rate in Hz
    pub sample_rate: u32,
    /// Frames per delivered block
    pub block_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            block_frames: 4096,
        }
    }
}

/// Names of all input devices on the default host
pub fn list_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.input_devices()? {
        names.push(
            device
                .name()
                .unwrap_or_else(|_| "Unknown Device".to_string()),
        );
    }
    Ok(names)
}

/// Running capture session
///
/// Owns the cpal stream, so the handle must stay on the thread that created
/// it. Dropping the handle stops the stream and joins the collector.
pub struct CaptureHandle {
    stream: cpal::Stream,
    stop_flag: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
    collector: Option<std::thread::JoinHandle<()>>,
}

impl CaptureHandle {
    /// Samples dropped because the ring buffer was full
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Stop the stream and join the collector thread
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Err(e) = self.stream.pause() {
            tracing::warn!(error = %e, "failed to pause input stream");
        }
        if let Some(handle) = self.collector.take() {
            if handle.join().is_err() {
                tracing::error!("capture collector thread panicked");
            }
        }
        let overruns = self.overruns();
        if overruns > 0 {
            tracing::warn!(overruns, "capture dropped samples on a full ring buffer");
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if self.collector.is_some() {
            self.stop();
        }
    }
}

/// Map one hardware sample to the signed 16-bit pipeline domain
fn centered_from_f32(v: f32) -> i32 {
    (v.clamp(-1.0, 1.0) * 32767.0) as i32
}

fn centered_from_i16(v: i16) -> i32 {
    i32::from(v)
}

fn centered_from_u16(v: u16) -> i32 {
    i32::from(v) - 32768
}

/// Start capturing into `ingest`
///
/// The stream is opened mono-or-wider at the requested rate; only the first
/// channel of each frame is kept. Blocks carry cumulative-frame timestamps,
/// so click timing is derived from the sample clock, not the wall clock.
pub fn start(
    config: &CaptureConfig,
    ingest: Arc<SampleIngest>,
) -> Result<CaptureHandle, CaptureError> {
    let host = cpal::default_host();
    let device = match &config.device {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(name.clone()))?,
        None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
    };
    let device_name = device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string());

    let supported = device.default_input_config()?;
    let source_channels = supported.channels();
    let sample_format = supported.sample_format();
    let stream_config = StreamConfig {
        channels: source_channels,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: BufferSize::Default,
    };

    tracing::info!(
        device = %device_name,
        sample_rate = config.sample_rate,
        channels = source_channels,
        format = ?sample_format,
        block_frames = config.block_frames,
        "starting capture"
    );

    let ring = HeapRb::<i32>::new(config.block_frames * 8);
    let (mut producer, mut consumer) = ring.split();

    let overruns = Arc::new(AtomicU64::new(0));
    let stop_flag = Arc::new(AtomicBool::new(false));

    let channels = source_channels as usize;
    let callback_overruns = Arc::clone(&overruns);
    let error_callback = |err: cpal::StreamError| {
        tracing::error!(error = %err, "input stream error");
    };

    // One callback body per hardware sample type; each keeps channel 0 of
    // every frame and pushes the converted slice into the ring.
    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono: Vec<i32> = data
                    .chunks(channels)
                    .map(|frame| centered_from_f32(frame[0]))
                    .collect();
                let pushed = producer.push_slice(&mono);
                if pushed < mono.len() {
                    callback_overruns.fetch_add((mono.len() - pushed) as u64, Ordering::Relaxed);
                }
            },
            error_callback,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mono: Vec<i32> = data
                    .chunks(channels)
                    .map(|frame| centered_from_i16(frame[0]))
                    .collect();
                let pushed = producer.push_slice(&mono);
                if pushed < mono.len() {
                    callback_overruns.fetch_add((mono.len() - pushed) as u64, Ordering::Relaxed);
                }
            },
            error_callback,
            None,
        )?,
        cpal::SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let mono: Vec<i32> = data
                    .chunks(channels)
                    .map(|frame| centered_from_u16(frame[0]))
                    .collect();
                let pushed = producer.push_slice(&mono);
                if pushed < mono.len() {
                    callback_overruns.fetch_add((mono.len() - pushed) as u64, Ordering::Relaxed);
                }
            },
            error_callback,
            None,
        )?,
        other => return Err(CaptureError::UnsupportedSampleFormat(other)),
    };

    let format = AudioFormat::s16_mono(config.sample_rate);
    let block_frames = config.block_frames;
    let sample_rate = config.sample_rate;
    let collector_stop = Arc::clone(&stop_flag);

    let collector = std::thread::Builder::new()
        .name("capture-collector".into())
        .spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut scratch = vec![0i32; 1024];
                let mut pending: Vec<i32> = Vec::with_capacity(block_frames * 2);
                let mut delivered_frames: u64 = 0;

                loop {
                    let n = consumer.pop_slice(&mut scratch);
                    if n == 0 {
                        if collector_stop.load(Ordering::Acquire) {
                            break;
                        }
                        std::thread::sleep(Duration::from_millis(2));
                        continue;
                    }
                    pending.extend_from_slice(&scratch[..n]);

                    while pending.len() >= block_frames {
                        let samples: Vec<i32> = pending.drain(..block_frames).collect();
                        let timestamp_ns = (delivered_frames as u128 * 1_000_000_000
                            / sample_rate as u128) as u64;
                        delivered_frames += block_frames as u64;
                        ingest.deliver(SampleBlock::from_samples(
                            format,
                            samples,
                            timestamp_ns,
                        ));
                    }
                }
                tracing::debug!(frames = delivered_frames, "capture collector finished");
            }));
            if result.is_err() {
                tracing::error!("capture collector thread panicked");
            }
        })
        .expect("Failed to spawn capture collector thread");

    stream.play()?;

    Ok(CaptureHandle {
        stream,
        stop_flag,
        overruns,
        collector: Some(collector),
    })
}
