//! Command handlers.
//!
//! Each handler resolves its options, loads the engine module and drives one
//! streaming run. The streaming halves take an already-loaded binding and a
//! writer, so they run unchanged against the in-process stub engine.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};
use vadkit_core::audio::capture::MicSource;
use vadkit_core::audio::device::list_input_devices;
use vadkit_core::audio::wav::{WavSource, WavTee};
use vadkit_core::engine::pipeline;
use vadkit_core::{
    list_hardware_devices, AudioSource, Binding, DynamicBinding, Profile, StopToken,
    StreamContext, StreamSummary, VadEngine,
};

use crate::display::{print_devices, FramePrinter, LiveMeter, OutputMode};

/// Everything needed to construct an engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub library_path: PathBuf,
    pub access_key: String,
    pub device: String,
    pub profile: Profile,
    pub preliminary_memory_size: usize,
}

#[derive(Debug, Clone)]
pub struct FileJob {
    pub wav_path: PathBuf,
    pub mode: OutputMode,
}

#[derive(Debug, Clone)]
pub struct MicJob {
    /// `None` selects the default input device.
    pub audio_device_index: Option<usize>,
    pub output_path: Option<PathBuf>,
    pub threshold: Option<f32>,
    pub meter_alpha: f32,
}

pub fn load_binding(path: &Path, profile: Profile) -> anyhow::Result<Arc<dyn Binding>> {
    let binding = DynamicBinding::load(path, profile)
        .with_context(|| format!("failed to load engine module '{}'", path.display()))?;
    Ok(Arc::new(binding))
}

pub fn create_engine(binding: Arc<dyn Binding>, opts: &EngineOptions) -> anyhow::Result<VadEngine> {
    let engine = match opts.profile {
        Profile::Desktop => VadEngine::new(binding, &opts.access_key, Some(&opts.device))?,
        Profile::BoundedMemory => {
            VadEngine::bounded(binding, &opts.access_key, opts.preliminary_memory_size)?
        }
    };
    info!(
        version = engine.version(),
        frame_length = engine.frame_length(),
        sample_rate = engine.sample_rate(),
        "engine ready"
    );
    Ok(engine)
}

/// Request a stop on Ctrl+C.
fn install_interrupt(stop: StopToken) -> anyhow::Result<()> {
    ctrlc::set_handler(move || stop.request_stop()).context("failed to install Ctrl+C handler")
}

// ── file ────────────────────────────────────────────────────────────────────

pub fn run_file(opts: &EngineOptions, job: &FileJob) -> anyhow::Result<()> {
    let binding = load_binding(&opts.library_path, opts.profile)?;
    let stop = StopToken::new();
    install_interrupt(stop.clone())?;
    stream_file(binding, opts, job, stop, io::stdout().lock())?;
    Ok(())
}

pub fn stream_file<W: Write>(
    binding: Arc<dyn Binding>,
    opts: &EngineOptions,
    job: &FileJob,
    stop: StopToken,
    out: W,
) -> anyhow::Result<StreamSummary> {
    let mut engine = create_engine(binding, opts)?;
    let mut source = WavSource::open(&job.wav_path)
        .with_context(|| format!("failed to open '{}'", job.wav_path.display()))?;

    let mut printer = FramePrinter::new(out, job.mode);
    let summary = pipeline::run(
        StreamContext {
            engine: &mut engine,
            source: &mut source,
            stop,
        },
        &mut printer,
    )
    .with_context(|| format!("failed to process '{}'", job.wav_path.display()))?;
    printer.finish(&summary)?;

    engine.destroy();
    Ok(summary)
}

// ── mic ─────────────────────────────────────────────────────────────────────

pub fn run_mic(opts: &EngineOptions, job: &MicJob) -> anyhow::Result<()> {
    let binding = load_binding(&opts.library_path, opts.profile)?;
    let mut engine = create_engine(binding, opts)?;

    let stop = StopToken::new();
    install_interrupt(stop.clone())?;

    let mic = MicSource::open(job.audio_device_index, engine.sample_rate(), stop.clone())?;
    eprintln!(
        "Listening on '{}' (press Ctrl+C to stop)...",
        mic.device_name()
    );

    let out = io::stdout().lock();
    let summary = match &job.output_path {
        Some(path) => {
            let mut tee = WavTee::create(mic, path)
                .with_context(|| format!("failed to create '{}'", path.display()))?;
            let summary = stream_live(&mut engine, &mut tee, stop, job, out)?;
            let written = tee.samples_written();
            tee.finish()?;
            eprintln!("Recorded {written} samples to '{}'", path.display());
            summary
        }
        None => {
            let mut mic = mic;
            stream_live(&mut engine, &mut mic, stop, job, out)?
        }
    };

    info!(frames = summary.frames, reason = ?summary.end_reason, "capture finished");
    engine.destroy();
    Ok(())
}

/// Stream a live source, drawing the meter or printing detections.
pub fn stream_live<W: Write>(
    engine: &mut VadEngine,
    source: &mut dyn AudioSource,
    stop: StopToken,
    job: &MicJob,
    out: W,
) -> anyhow::Result<StreamSummary> {
    let ctx = StreamContext {
        engine,
        source,
        stop,
    };

    let summary = match job.threshold {
        Some(threshold) => {
            let mut printer = FramePrinter::new(out, OutputMode::Threshold(threshold));
            let summary = pipeline::run(ctx, &mut printer)?;
            printer.finish(&summary)?;
            summary
        }
        None => {
            let mut meter = LiveMeter::new(out, job.meter_alpha);
            let summary = pipeline::run(ctx, &mut meter)?;
            let mut out = meter.finish()?;
            if let Some(rtf) = summary.real_time_factor {
                writeln!(out, "real time factor : {rtf:.3}")?;
            }
            summary
        }
    };
    Ok(summary)
}

// ── device listings ─────────────────────────────────────────────────────────

pub fn show_audio_devices<W: Write>(mut out: W) -> anyhow::Result<()> {
    let devices = list_input_devices().context("failed to enumerate audio input devices")?;
    if devices.is_empty() {
        warn!("no audio input devices found");
    }
    print_devices(
        &mut out,
        devices.into_iter().map(|d| {
            let name = if d.is_default {
                format!("{} (default)", d.name)
            } else {
                d.name
            };
            (d.index, name)
        }),
    )?;
    Ok(())
}

pub fn show_hardware_devices<W: Write>(binding: &dyn Binding, mut out: W) -> anyhow::Result<()> {
    if binding.profile() != Profile::Desktop {
        bail!("hardware device listing needs a desktop engine build");
    }
    let devices = list_hardware_devices(binding)?;
    print_devices(&mut out, devices.into_iter().enumerate())?;
    Ok(())
}
