//! Blocking frame streaming loop.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 0. Check the stop token
//! 1. Fill one frame from the source (short reads are retried)
//!    └─ fewer than frame_length samples → end of stream, tail discarded
//! 2. engine.process(frame), timed by the RTF profiler
//!    └─ failure → error (already explained by the error stack), run ends
//! 3. Hand a FrameEvent to the sink
//! ```
//!
//! The source format is validated once before the first frame; a mismatch
//! ends the run before anything reaches the engine. Probabilities are handed
//! out in arrival order with at most one frame in flight.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, info, info_span, trace, warn};

use super::{profiler::RtfProfiler, VadEngine};
use crate::{
    audio::{AudioSource, SourceFormat},
    buffering::{Fill, FrameBuffer},
    error::{Result, VadError},
    events::{EndReason, FrameEvent, StreamSummary},
};

/// Real-time factor above which a completed run is flagged.
pub const RTF_WARN_THRESHOLD: f64 = 1.0;

/// Cooperative cancellation flag shared with signal handlers and capture.
///
/// Only ever set from outside the loop; checked once per iteration, so an
/// in-flight `process` call always completes.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Receives every processed frame, in order.
pub trait FrameSink {
    /// Returning an error ends the run with that error.
    fn on_frame(&mut self, event: &FrameEvent) -> Result<()>;
}

impl<F: FnMut(&FrameEvent)> FrameSink for F {
    fn on_frame(&mut self, event: &FrameEvent) -> Result<()> {
        self(event);
        Ok(())
    }
}

/// Everything one run needs, passed as one struct and owned by the call.
pub struct StreamContext<'a> {
    pub engine: &'a mut VadEngine,
    pub source: &'a mut dyn AudioSource,
    pub stop: StopToken,
}

/// Check that `format` is exactly what the engine consumes.
pub fn validate_format(engine: &VadEngine, format: &SourceFormat) -> Result<()> {
    let mut problems = Vec::new();
    if format.sample_rate != engine.sample_rate() {
        problems.push(format!(
            "sample rate is {} Hz, engine requires {} Hz",
            format.sample_rate,
            engine.sample_rate()
        ));
    }
    if format.channels != 1 {
        problems.push(format!("{} channels, engine requires mono", format.channels));
    }
    if format.bits_per_sample != 16 || format.is_float {
        problems.push(format!(
            "{}-bit {} samples, engine requires 16-bit integer PCM",
            format.bits_per_sample,
            if format.is_float { "float" } else { "integer" }
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(VadError::FormatMismatch(problems.join("; ")))
    }
}

/// Stream the source through the engine until end of stream, a stop
/// request, or the first failure.
///
/// # Errors
/// - `VadError::FormatMismatch` before any frame is processed.
/// - Source read errors.
/// - Engine processing failures, carrying the engine's error stack.
/// - Errors returned by `sink`.
pub fn run(ctx: StreamContext<'_>, sink: &mut dyn FrameSink) -> Result<StreamSummary> {
    let StreamContext {
        engine,
        source,
        stop,
    } = ctx;

    validate_format(engine, &source.format())?;

    let frame_length = engine.frame_length();
    let sample_rate = engine.sample_rate();
    let span = info_span!("stream", frame_length, sample_rate);
    let _guard = span.enter();
    info!("stream started");

    let mut frame = FrameBuffer::new(frame_length);
    let mut profiler = RtfProfiler::new(sample_rate, frame_length);
    let mut discarded_samples = 0;
    let frame_secs = frame_length as f64 / f64::from(sample_rate);

    let end_reason = loop {
        // ── 0. Check stop token ─────────────────────────────────────────────
        if stop.is_stop_requested() {
            break EndReason::Stopped;
        }

        // ── 1. Fill one frame ───────────────────────────────────────────────
        if let Fill::Partial(n) = frame.fill(source)? {
            discarded_samples = n;
            if n > 0 {
                debug!(samples = n, "discarding partial trailing frame");
            }
            break if stop.is_stop_requested() {
                EndReason::Stopped
            } else {
                EndReason::EndOfStream
            };
        }

        // ── 2. Process ──────────────────────────────────────────────────────
        let index = profiler.frames();
        let probability = profiler.measure(|| engine.process(frame.as_slice()))?;
        trace!(index, probability, "frame processed");

        // ── 3. Emit ─────────────────────────────────────────────────────────
        sink.on_frame(&FrameEvent {
            index,
            offset_secs: index as f64 * frame_secs,
            probability,
        })?;
    };

    let summary = StreamSummary {
        frames: profiler.frames(),
        audio_secs: profiler.audio_secs(),
        processing_secs: profiler.processing_secs(),
        real_time_factor: profiler.real_time_factor(),
        discarded_samples,
        end_reason,
    };

    info!(
        frames = summary.frames,
        audio_secs = summary.audio_secs,
        rtf = summary.real_time_factor,
        reason = ?summary.end_reason,
        "stream finished"
    );
    if let Some(rtf) = summary.real_time_factor {
        if rtf > RTF_WARN_THRESHOLD {
            warn!(rtf, "engine is processing slower than real time");
        }
    }

    Ok(summary)
}
