use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use vadkit_core::audio::wav::WavSource;
use vadkit_core::binding::stub::{StubBinding, StubConfig, StubErrorStack};
use vadkit_core::binding::{Binding, ErrorStack, InitTarget, RawHandle};
use vadkit_core::engine::pipeline::{self, FrameSink};
use vadkit_core::{
    EndReason, FrameEvent, MemorySource, Profile, SourceFormat, Status, StopToken, StreamContext,
    VadEngine, VadError,
};

const FRAME: usize = 512;
const RATE: u32 = 16_000;

/// Engine whose probability is the frame's first sample divided by 1000,
/// so tests can tell frames apart by their output.
struct TaggingBinding {
    delay: Duration,
}

impl Binding for TaggingBinding {
    fn profile(&self) -> Profile {
        Profile::Desktop
    }

    fn status_to_string(&self, status: Status) -> String {
        status.as_str().to_string()
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn frame_length(&self) -> usize {
        FRAME
    }

    fn version(&self) -> String {
        "tagging".into()
    }

    fn init(&self, _credential: &str, _target: InitTarget<'_>) -> Result<RawHandle, Status> {
        Ok(RawHandle::from_ptr(std::ptr::NonNull::dangling().as_ptr()))
    }

    fn delete(&self, _handle: RawHandle) {}

    fn process(&self, _handle: &RawHandle, pcm: &[i16]) -> Result<f32, Status> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(f32::from(pcm[0]) / 1000.0)
    }

    fn error_stack(&self) -> Result<ErrorStack<'_>, Status> {
        Ok(ErrorStack::owned(vec![]))
    }
}

fn tagged_frames(count: usize, tail: usize) -> Vec<i16> {
    let mut samples = Vec::with_capacity(count * FRAME + tail);
    for i in 0..count {
        samples.extend(std::iter::repeat(i as i16).take(FRAME));
    }
    samples.extend(std::iter::repeat(999).take(tail));
    samples
}

fn collect(
    engine: &mut VadEngine,
    source: &mut MemorySource,
) -> (Vec<FrameEvent>, vadkit_core::Result<vadkit_core::StreamSummary>) {
    let mut events = Vec::new();
    let result = pipeline::run(
        StreamContext {
            engine,
            source,
            stop: StopToken::new(),
        },
        &mut |event: &FrameEvent| events.push(*event),
    );
    (events, result)
}

fn stub_engine(config: StubConfig) -> (VadEngine, Arc<vadkit_core::binding::stub::StubCounters>) {
    let stub = StubBinding::new(config);
    let counters = stub.counters();
    let engine = VadEngine::new(Arc::new(stub), "test-key", None).unwrap();
    (engine, counters)
}

fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn n_frames_yield_n_probabilities_in_order() {
    let binding = Arc::new(TaggingBinding {
        delay: Duration::ZERO,
    });
    let mut engine = VadEngine::new(binding, "key", None).unwrap();
    let mut source = MemorySource::new(tagged_frames(7, 0), SourceFormat::pcm16_mono(RATE))
        .with_block_size(300);

    let (events, result) = collect(&mut engine, &mut source);
    let summary = result.unwrap();

    let tags: Vec<i32> = events
        .iter()
        .map(|e| (e.probability * 1000.0).round() as i32)
        .collect();
    assert_eq!(tags, vec![0, 1, 2, 3, 4, 5, 6]);
    let indices: Vec<u64> = events.iter().map(|e| e.index).collect();
    assert_eq!(indices, (0..7).collect::<Vec<_>>());
    assert_eq!(summary.frames, 7);
    assert_eq!(summary.end_reason, EndReason::EndOfStream);
}

#[test]
fn partial_tail_is_discarded() {
    let (mut engine, counters) = stub_engine(StubConfig::default());
    let mut source = MemorySource::new(tagged_frames(3, 100), SourceFormat::pcm16_mono(RATE));

    let (events, result) = collect(&mut engine, &mut source);
    let summary = result.unwrap();

    assert_eq!(events.len(), 3);
    assert_eq!(summary.discarded_samples, 100);
    assert_eq!(counters.snapshot().process_calls, 3);
}

#[test]
fn format_mismatch_fails_before_any_frame() {
    let formats = [
        SourceFormat::pcm16_mono(44_100),
        SourceFormat {
            channels: 2,
            ..SourceFormat::pcm16_mono(RATE)
        },
        SourceFormat {
            bits_per_sample: 8,
            ..SourceFormat::pcm16_mono(RATE)
        },
    ];

    for format in formats {
        let (mut engine, counters) = stub_engine(StubConfig::default());
        let mut source = MemorySource::new(tagged_frames(4, 0), format);
        let (events, result) = collect(&mut engine, &mut source);

        assert!(matches!(result, Err(VadError::FormatMismatch(_))), "{format}");
        assert!(events.is_empty());
        assert_eq!(counters.snapshot().process_calls, 0);
    }
}

#[test]
fn silent_wav_scores_low_with_finite_rtf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silence.wav");
    write_wav(&path, RATE, 1, &vec![0i16; RATE as usize]);

    let (mut engine, _) = stub_engine(StubConfig::default());
    let mut source = WavSource::open(&path).unwrap();
    let mut probabilities = Vec::new();
    let summary = pipeline::run(
        StreamContext {
            engine: &mut engine,
            source: &mut source,
            stop: StopToken::new(),
        },
        &mut |event: &FrameEvent| probabilities.push(event.probability),
    )
    .unwrap();

    // 16000 / 512 = 31 full frames, 128 samples left over
    assert_eq!(probabilities.len(), 31);
    assert!(probabilities.iter().all(|&p| p < 0.2));
    assert_eq!(summary.discarded_samples, 128);
    let rtf = summary.real_time_factor.expect("frames were processed");
    assert!(rtf.is_finite() && rtf > 0.0, "rtf={rtf}");
}

#[test]
fn stereo_wav_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo.wav");
    write_wav(&path, RATE, 2, &vec![0i16; 4 * FRAME]);

    let (mut engine, counters) = stub_engine(StubConfig::default());
    let mut source = WavSource::open(&path).unwrap();
    let err = pipeline::run(
        StreamContext {
            engine: &mut engine,
            source: &mut source,
            stop: StopToken::new(),
        },
        &mut |_: &FrameEvent| {},
    )
    .unwrap_err();

    assert!(err.to_string().contains("2 channels"));
    assert_eq!(counters.snapshot().process_calls, 0);
}

#[test]
fn slow_engine_reports_rtf_above_one() {
    // 512 samples at 16 kHz is 32 ms of audio; 40 ms per frame is too slow.
    let binding = Arc::new(TaggingBinding {
        delay: Duration::from_millis(40),
    });
    let mut engine = VadEngine::new(binding, "key", None).unwrap();
    let mut source = MemorySource::new(tagged_frames(2, 0), SourceFormat::pcm16_mono(RATE));

    let (_, result) = collect(&mut engine, &mut source);
    let rtf = result.unwrap().real_time_factor.unwrap();
    assert!(rtf > 1.0, "rtf={rtf}");
}

#[test]
fn processing_failure_ends_the_run_with_the_stack() {
    let (mut engine, counters) = stub_engine(StubConfig {
        fail_process_after: Some(2),
        ..StubConfig::default()
    });
    let mut source = MemorySource::new(tagged_frames(5, 0), SourceFormat::pcm16_mono(RATE));

    let (events, result) = collect(&mut engine, &mut source);
    let err = result.unwrap_err();

    assert_eq!(events.len(), 2);
    match err {
        VadError::Engine(failure) => {
            assert_eq!(failure.status, Status::RuntimeError);
            assert!(!failure.messages.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    let snapshot = counters.snapshot();
    assert_eq!(snapshot.process_calls, 3);
    assert_eq!(snapshot.stacks_retrieved, 1);
    assert_eq!(snapshot.stacks_released, 1);
}

#[test]
fn failing_stack_retrieval_degrades_to_status_line() {
    let (mut engine, _) = stub_engine(StubConfig {
        fail_process_after: Some(0),
        error_stack: StubErrorStack::Fail(Status::InvalidState),
        ..StubConfig::default()
    });
    let mut source = MemorySource::new(tagged_frames(1, 0), SourceFormat::pcm16_mono(RATE));

    let (_, result) = collect(&mut engine, &mut source);
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        VadError::Unexplained {
            status: Status::RuntimeError,
            retrieval: Status::InvalidState,
            ..
        }
    ));
    assert!(!err.to_string().contains('\n'));
}

#[test]
fn malformed_credentials_are_explained() {
    for credential in ["", "has spaces in it"] {
        let stub = StubBinding::new(StubConfig::default());
        let counters = stub.counters();
        let err = VadEngine::new(Arc::new(stub), credential, None).unwrap_err();

        let status = err.status().expect("engine status");
        assert!(status == Status::InvalidArgument || status.is_activation());
        match err {
            VadError::Engine(failure) => assert!(!failure.messages.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(counters.snapshot().constructed, 0);
    }
}

#[test]
fn refused_credential_is_an_activation_error() {
    let stub = StubBinding::new(StubConfig {
        expected_credential: Some("issued-key".into()),
        ..StubConfig::default()
    });
    let err = VadEngine::new(Arc::new(stub), "other-key", None).unwrap_err();
    assert_eq!(err.status(), Some(Status::ActivationRefused));
}

#[test]
fn repeated_failures_never_leak_error_stacks() {
    let stub = StubBinding::new(StubConfig::default());
    let counters = stub.counters();
    let binding: Arc<dyn Binding> = Arc::new(stub);

    for _ in 0..25 {
        assert!(VadEngine::new(Arc::clone(&binding), "", None).is_err());
    }
    let snapshot = counters.snapshot();
    assert_eq!(snapshot.stacks_retrieved, 25);
    assert_eq!(snapshot.stacks_released, 25);
}

#[test]
fn engine_constants_are_stable_across_instances() {
    let binding: Arc<dyn Binding> = Arc::new(StubBinding::new(StubConfig::default()));
    let first = VadEngine::new(Arc::clone(&binding), "key", None).unwrap();
    let second = VadEngine::new(Arc::clone(&binding), "key", Some("cpu")).unwrap();
    for _ in 0..3 {
        assert_eq!(first.frame_length(), second.frame_length());
        assert_eq!(first.sample_rate(), second.sample_rate());
        assert_eq!(first.frame_length(), binding.frame_length());
    }
}

#[test]
fn sink_error_ends_the_run() {
    struct FailAfterOne(usize);

    impl FrameSink for FailAfterOne {
        fn on_frame(&mut self, _event: &FrameEvent) -> vadkit_core::Result<()> {
            self.0 += 1;
            if self.0 > 1 {
                return Err(VadError::Io(std::io::Error::other("sink closed")));
            }
            Ok(())
        }
    }

    let (mut engine, counters) = stub_engine(StubConfig::default());
    let mut source = MemorySource::new(tagged_frames(4, 0), SourceFormat::pcm16_mono(RATE));
    let err = pipeline::run(
        StreamContext {
            engine: &mut engine,
            source: &mut source,
            stop: StopToken::new(),
        },
        &mut FailAfterOne(0),
    )
    .unwrap_err();
    assert!(matches!(err, VadError::Io(_)));
    assert_eq!(counters.snapshot().process_calls, 2);
}

proptest! {
    #[test]
    fn probabilities_stay_in_unit_interval(
        samples in proptest::collection::vec(any::<i16>(), FRAME * 4)
    ) {
        let (mut engine, _) = stub_engine(StubConfig::default());
        let mut source = MemorySource::new(samples, SourceFormat::pcm16_mono(RATE));
        let (events, result) = collect(&mut engine, &mut source);
        prop_assert!(result.is_ok());
        prop_assert_eq!(events.len(), 4);
        for event in events {
            prop_assert!((0.0..=1.0).contains(&event.probability));
        }
    }

    #[test]
    fn frame_count_is_floor_of_sample_count(len in 0usize..(FRAME * 6)) {
        let (mut engine, _) = stub_engine(StubConfig::default());
        let mut source = MemorySource::new(vec![0; len], SourceFormat::pcm16_mono(RATE));
        let (events, result) = collect(&mut engine, &mut source);
        let summary = result.unwrap();
        prop_assert_eq!(events.len(), len / FRAME);
        prop_assert_eq!(summary.discarded_samples, len % FRAME);
    }
}
