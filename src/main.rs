//! clickrng - random bytes from the timing jitter of acoustic clicks
//!
//! Command-line front end: replays a raw capture file (or records live with
//! the `capture` feature) through the click-to-bits pipeline and appends
//! authorized batches to a binary output file.

use anyhow::Result;
use clickrng::audio::detector::ThresholdDetector;
use clickrng::audio::format::AudioFormat;
use clickrng::audio::ingest::{SampleBlock, SampleIngest};
use clickrng::audio::matched::{MatchedFilterDetector, ReferencePattern};
use clickrng::rng::generator::{Generator, GeneratorConfig};
use clickrng::rng::settings::GeneratorSettings;
use clickrng::rng::sink::FileGate;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Frames per block when replaying from a file
const REPLAY_BLOCK_FRAMES: usize = 4096;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clickrng=info".parse().unwrap()),
        )
        .init();

    println!(
        "clickrng v{} - random bytes from acoustic clicks",
        clickrng::VERSION
    );
    println!();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let mut input: Option<PathBuf> = None;
    let mut out: Option<PathBuf> = None;
    let mut pattern_file: Option<PathBuf> = None;
    let mut settings_path: Option<PathBuf> = None;
    let mut device: Option<String> = None;
    let mut sample_rate: Option<u32> = None;
    let mut threshold: Option<i32> = None;
    let mut lock_time_ms: Option<u64> = None;
    let mut batch_bytes: Option<usize> = None;
    let mut corr_threshold: Option<f64> = None;
    let mut no_bias = false;
    #[cfg(feature = "capture")]
    let mut capture_mode = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("clickrng {} (built {})", clickrng::VERSION, clickrng::BUILD_DATE);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            #[cfg(feature = "capture")]
            "--list" | "-l" => {
                list_devices();
                return Ok(());
            }
            #[cfg(feature = "capture")]
            "--capture" | "-c" => {
                capture_mode = true;
            }
            "--input" | "-i" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --input requires a file path");
                    return Ok(());
                }
                input = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--out" | "-o" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --out requires a file path");
                    return Ok(());
                }
                out = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--pattern" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --pattern requires a file path");
                    return Ok(());
                }
                pattern_file = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--settings" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --settings requires a file path");
                    return Ok(());
                }
                settings_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--device" | "-d" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --device requires a device name");
                    return Ok(());
                }
                device = Some(args[i + 1].clone());
                i += 2;
                continue;
            }
            "--rate" | "-r" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --rate requires a value");
                    return Ok(());
                }
                sample_rate = args[i + 1].parse().ok();
                if sample_rate.is_none() {
                    eprintln!("Error: Invalid sample rate: {}", args[i + 1]);
                    return Ok(());
                }
                i += 2;
                continue;
            }
            "--threshold" | "-t" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --threshold requires a value");
                    return Ok(());
                }
                threshold = args[i + 1].parse().ok();
                if threshold.is_none() {
                    eprintln!("Error: Invalid threshold: {}", args[i + 1]);
                    return Ok(());
                }
                i += 2;
                continue;
            }
            "--lock-time-ms" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --lock-time-ms requires a value");
                    return Ok(());
                }
                lock_time_ms = args[i + 1].parse().ok();
                if lock_time_ms.is_none() {
                    eprintln!("Error: Invalid lock time: {}", args[i + 1]);
                    return Ok(());
                }
                i += 2;
                continue;
            }
            "--batch-bytes" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --batch-bytes requires a value");
                    return Ok(());
                }
                batch_bytes = args[i + 1].parse().ok();
                if batch_bytes.is_none() || batch_bytes == Some(0) {
                    eprintln!("Error: Invalid batch size: {}", args[i + 1]);
                    return Ok(());
                }
                i += 2;
                continue;
            }
            "--corr-threshold" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --corr-threshold requires a value");
                    return Ok(());
                }
                corr_threshold = args[i + 1].parse().ok();
                if corr_threshold.is_none() {
                    eprintln!("Error: Invalid correlation threshold: {}", args[i + 1]);
                    return Ok(());
                }
                i += 2;
                continue;
            }
            "--no-bias-compensation" => {
                no_bias = true;
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    // Settings file, then command line on top
    let settings_file = settings_path
        .clone()
        .unwrap_or_else(GeneratorSettings::path);
    let mut settings = GeneratorSettings::load(&settings_file);
    if let Some(name) = device {
        settings.device = Some(name);
    }
    if let Some(rate) = sample_rate {
        settings.sample_rate = rate;
    }
    if let Some(t) = threshold {
        settings.threshold = t;
    }
    if let Some(ms) = lock_time_ms {
        settings.lock_time_ns = ms * 1_000_000;
    }
    if no_bias {
        settings.bias_compensation = false;
    }
    if settings_path.is_some() {
        if let Err(e) = settings.save(&settings_file) {
            error!("Failed to save settings: {}", e);
        }
    }

    let out_path = out.unwrap_or_else(|| {
        PathBuf::from(format!(
            "random_{}.bin",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    });

    let config = GeneratorConfig {
        detector: clickrng::audio::detector::DetectorConfig {
            threshold: settings.threshold,
            lock_time_ns: settings.lock_time_ns,
            correlation_threshold: corr_threshold
                .unwrap_or(clickrng::audio::matched::DEFAULT_CORRELATION_THRESHOLD),
        },
        bias_compensation: settings.bias_compensation,
        batch_bytes: batch_bytes.unwrap_or(clickrng::DEFAULT_BATCH_BYTES),
    };

    println!("Output: {}", out_path.display());
    let gate = match FileGate::create(&out_path) {
        Ok(gate) => gate,
        Err(e) => {
            error!("Failed to open output: {}", e);
            println!("Error: {}", e);
            return Ok(());
        }
    };

    let generator = match &pattern_file {
        Some(path) => {
            let raw = std::fs::read(path)?;
            let format = AudioFormat::s16_mono(settings.sample_rate);
            let pattern = ReferencePattern::from_bytes(&format, &raw)?;
            info!(
                samples = pattern.len(),
                energy = pattern.energy(),
                "matched filter pattern loaded"
            );
            Generator::new(config, MatchedFilterDetector::new(pattern), gate)
        }
        None => Generator::new(config, ThresholdDetector::new(), gate),
    };

    #[cfg(feature = "capture")]
    if capture_mode {
        if input.is_some() {
            eprintln!("Error: choose one of --input or --capture");
            return Ok(());
        }
        return run_capture(generator, &settings);
    }

    match input {
        Some(path) => run_replay(generator, &path, &settings),
        None => {
            eprintln!("Error: no input source given");
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Usage: clickrng [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -i, --input FILE          Replay a raw mono 16-bit LE capture file");
    #[cfg(feature = "capture")]
    println!("  -c, --capture             Capture live from an input device");
    #[cfg(feature = "capture")]
    println!("  -l, --list                List available input devices");
    println!("  -d, --device NAME         Input device for capture mode");
    println!("  -r, --rate RATE           Sample rate in Hz (default: 192000)");
    println!("  -t, --threshold VALUE     Click threshold in raw sample units (default: 10000)");
    println!("      --lock-time-ms MS     Click lockout in milliseconds (default: 10)");
    println!("      --batch-bytes N       Batch size in bytes (default: 2500)");
    println!("      --no-bias-compensation  Disable the alternating-inversion whitener");
    println!("      --pattern FILE        Reference click waveform; enables the matched filter");
    println!("      --corr-threshold VALUE  Matched filter acceptance threshold");
    println!("  -o, --out FILE            Output file (default: random_<timestamp>.bin)");
    println!("      --settings FILE       Load and persist settings at FILE");
    println!("  -v, --version             Show version");
    println!("  -h, --help                Show this help");
    println!();
    println!("Examples:");
    println!("  clickrng -i clicks.raw -o random.bin");
    println!("  clickrng -i clicks.raw --pattern click.raw --corr-threshold 2e9");
    println!();
    println!("Every completed batch must pass the monobit health check before it");
    println!("is written; failed batches are dropped.");
}

#[cfg(feature = "capture")]
fn list_devices() {
    println!("Scanning for input devices...");
    println!();

    match clickrng::audio::capture::list_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No input devices found.");
            } else {
                println!("Found {} device(s):", devices.len());
                println!();
                for (i, name) in devices.iter().enumerate() {
                    println!("  {}. {}", i + 1, name);
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("Error: {}", e);
        }
    }
}

/// Replay a raw capture file through the pipeline, block by block
fn run_replay(mut generator: Generator, path: &Path, settings: &GeneratorSettings) -> Result<()> {
    let raw = std::fs::read(path)?;
    let format = AudioFormat::s16_mono(settings.sample_rate);
    let frame_bytes = format.frame_bytes();

    let usable_len = raw.len() - raw.len() % frame_bytes;
    if usable_len < raw.len() {
        tracing::warn!(
            dropped = raw.len() - usable_len,
            "input does not divide into whole frames, trailing bytes ignored"
        );
    }
    if settings.paused {
        info!("ignoring persisted paused flag for file replay");
    }

    println!(
        "Replaying {} ({} frames at {} Hz)",
        path.display(),
        usable_len / frame_bytes,
        settings.sample_rate
    );
    println!();

    let ingest = SampleIngest::new();
    generator.start();

    let chunk_bytes = REPLAY_BLOCK_FRAMES * frame_bytes;
    let mut offset = 0usize;
    let mut timestamp_ns = 0u64;
    while offset < usable_len {
        let end = (offset + chunk_bytes).min(usable_len);
        let block = SampleBlock::from_bytes(format, &raw[offset..end], timestamp_ns)?;
        timestamp_ns += block.duration_ns();
        ingest.deliver(block);
        if let Some(block) = ingest.try_take() {
            generator.process_block(&block);
        }
        offset = end;
    }

    generator.stop();
    print_summary(&generator);
    Ok(())
}

/// Capture live audio until Ctrl+C, feeding the pipeline as blocks arrive
#[cfg(feature = "capture")]
fn run_capture(mut generator: Generator, settings: &GeneratorSettings) -> Result<()> {
    use clickrng::audio::capture::{self, CaptureConfig};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    let ingest = Arc::new(SampleIngest::new());
    let capture_config = CaptureConfig {
        device: settings.device.clone(),
        sample_rate: settings.sample_rate,
        block_frames: REPLAY_BLOCK_FRAMES,
    };
    let mut handle = capture::start(&capture_config, Arc::clone(&ingest))?;

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    generator.start();
    if settings.paused {
        generator.request_pause();
        println!("Starting paused; generation resumes via settings.");
    }

    println!("Capturing. Press Ctrl+C to stop.");
    println!();

    let mut last_status = String::new();
    let mut iteration = 0u32;
    while running.load(Ordering::SeqCst) {
        if let Some(block) = ingest.take_timeout(Duration::from_millis(100)) {
            generator.process_block(&block);
        }

        iteration += 1;
        if iteration % 10 == 0 {
            let counters = generator.counters();
            let status_line = format!(
                "Level: {:>5.1}% | Clicks: {:>8} | Bits: {:>8} | Batches: {} ok, {} dropped",
                ingest.level() * 100.0,
                counters.clicks(),
                counters.bits(),
                counters.batches_emitted(),
                counters.batches_rejected()
            );

            // Only print if changed (reduce spam)
            if status_line != last_status {
                println!("{}", status_line);
                last_status = status_line;
            }
        }
    }

    println!();
    println!("Stopping...");
    handle.stop();

    // Drain whatever the collector delivered before it stopped
    while let Some(block) = ingest.try_take() {
        generator.process_block(&block);
    }
    generator.stop();
    print_summary(&generator);
    Ok(())
}

fn print_summary(generator: &Generator) {
    let counters = generator.counters();
    println!();
    println!(
        "Blocks: {} | Clicks: {} | Bits: {} | Batches: {} emitted, {} rejected",
        counters.blocks(),
        counters.clicks(),
        counters.bits(),
        counters.batches_emitted(),
        counters.batches_rejected()
    );
    println!("Done.");
}
