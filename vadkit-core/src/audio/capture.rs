//! Live microphone capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It only down-mixes to mono and pushes into an SPSC ring buffer producer,
//! whose `push_slice` is lock-free and allocation-free. Resampling to the
//! engine rate and conversion to i16 happen in [`MicSource::read`], on the
//! processing thread.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `MicSource` must be created and dropped on the same thread, which
//! is the thread driving the frame loop.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SizedSample, Stream, StreamConfig,
};
use std::time::Duration;
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use super::{resample::PcmConverter, AudioSource, SourceFormat};
#[cfg(feature = "audio-cpal")]
use crate::buffering::{create_audio_ring, AudioProducer};
use crate::{
    buffering::{AudioConsumer, Consumer},
    engine::pipeline::StopToken,
    error::{Result, VadError},
};

/// Samples drained from the ring per poll: 10 ms at 48 kHz.
#[cfg(feature = "audio-cpal")]
const DRAIN_CHUNK: usize = 480;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY: Duration = Duration::from_millis(5);

/// An open input device delivering 16-bit mono audio at the engine rate.
///
/// **Not `Send`**: create and drop it on the thread that reads from it.
pub struct MicSource {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    consumer: AudioConsumer,
    converter: PcmConverter,
    stop: StopToken,
    raw: Vec<f32>,
    /// Converted samples not yet handed to the reader.
    pending: Vec<i16>,
    target_rate: u32,
    device_name: String,
}

impl MicSource {
    /// Open the input device at `device_index` (or the default input when
    /// `None`) and start capturing. Audio is converted to `target_rate`.
    ///
    /// Reads return `Ok(0)` once `stop` is requested.
    ///
    /// # Errors
    /// - `VadError::AudioDevice` if the index does not exist or the device
    ///   cannot report a configuration.
    /// - `VadError::NoDefaultInputDevice` when no microphone is available.
    /// - `VadError::AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open(device_index: Option<usize>, target_rate: u32, stop: StopToken) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_index {
            Some(index) => host
                .input_devices()
                .map_err(|e| VadError::AudioDevice(e.to_string()))?
                .nth(index)
                .ok_or_else(|| {
                    VadError::AudioDevice(format!("no input device at index {index}"))
                })?,
            None => host
                .default_input_device()
                .ok_or(VadError::NoDefaultInputDevice)?,
        };
        let device_name = device.name().unwrap_or_default();

        info!(device = device_name.as_str(), "opening input device");

        let supported = device
            .default_input_config()
            .map_err(|e| VadError::AudioDevice(e.to_string()))?;

        let capture_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(capture_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = create_audio_ring();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, producer, &stop, |s| s),
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, producer, &stop, |s| s as f32 / 32768.0)
            }
            SampleFormat::U8 => build_stream::<u8>(&device, &config, producer, &stop, |s| {
                (s as f32 - 128.0) / 128.0
            }),
            fmt => {
                return Err(VadError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| VadError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            consumer,
            converter: PcmConverter::new(capture_rate, target_rate, DRAIN_CHUNK)?,
            stop,
            raw: vec![0f32; DRAIN_CHUNK],
            pending: Vec::new(),
            target_rate,
            device_name,
        })
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl MicSource {
    pub fn open(_device_index: Option<usize>, _target_rate: u32, _stop: StopToken) -> Result<Self> {
        Err(VadError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl MicSource {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Drain the ring once, converting whatever arrived into `pending`.
    /// Returns the number of raw device samples drained.
    fn poll(&mut self) -> Result<usize> {
        let n = self.consumer.pop_slice(&mut self.raw);
        if n > 0 {
            self.converter.convert(&self.raw[..n], &mut self.pending)?;
        }
        Ok(n)
    }
}

impl AudioSource for MicSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::pcm16_mono(self.target_rate)
    }

    /// Block until at least one converted sample is available or a stop is
    /// requested.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        while self.pending.is_empty() {
            if self.stop.is_stop_requested() {
                return Ok(0);
            }
            if self.poll()? == 0 {
                std::thread::sleep(SLEEP_EMPTY);
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Build an input stream whose callback down-mixes `T` samples to mono f32
/// and pushes them into `producer`.
#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    stop: &StopToken,
    to_f32: fn(T) -> f32,
) -> Result<Stream>
where
    T: SizedSample + Copy + Send + 'static,
{
    use crate::buffering::Producer;

    let stop = stop.clone();
    let ch = config.channels as usize;
    let mut mix_buf: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if stop.is_stop_requested() {
                    return;
                }
                let frames = data.len() / ch;
                mix_buf.resize(frames, 0.0);
                for (f, out) in mix_buf.iter_mut().enumerate() {
                    let base = f * ch;
                    let sum: f32 = data[base..base + ch].iter().map(|&s| to_f32(s)).sum();
                    *out = sum / ch as f32;
                }
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    warn!("ring buffer full: dropped {} samples", mix_buf.len() - written);
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| VadError::AudioStream(e.to_string()))
}

#[cfg(all(test, not(feature = "audio-cpal")))]
mod tests {
    use super::*;

    #[test]
    fn open_without_backend_is_a_stream_error() {
        let err = MicSource::open(None, 16_000, StopToken::new()).err();
        assert!(matches!(err, Some(VadError::AudioStream(_))));
    }
}
