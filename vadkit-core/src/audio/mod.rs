//! Audio sources feeding the frame streaming loop.
//!
//! Every source exposes its format up front and a blocking `read`. The loop
//! validates the format once before the first frame; sources never resample
//! or reformat silently except `MicSource`, whose device rate is converted
//! to the engine rate on the processing thread.
//!
//! | Source | Backing |
//! |--------|---------|
//! | [`MemorySource`] | in-memory samples (tests, embedders) |
//! | [`wav::WavSource`] | 16-bit PCM WAV file via `hound` |
//! | [`capture::MicSource`] | live input device via `cpal` + ring buffer |
//! | [`wav::WavTee`] | any source, copying what it reads to a WAV file |

pub mod capture;
pub mod device;
pub mod resample;
pub mod wav;

use crate::error::Result;

/// Sample layout a source delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub is_float: bool,
}

impl SourceFormat {
    /// Signed 16-bit mono PCM at `sample_rate`, the only layout the engine accepts.
    pub fn pcm16_mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
            is_float: false,
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {} channel(s), {}-bit {}",
            self.sample_rate,
            self.channels,
            self.bits_per_sample,
            if self.is_float { "float" } else { "integer" }
        )
    }
}

/// A blocking producer of 16-bit mono samples.
pub trait AudioSource {
    fn format(&self) -> SourceFormat;

    /// Fill `buf` with up to `buf.len()` samples and return how many were
    /// written. `Ok(0)` means the source is exhausted or was stopped.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize>;
}

/// Source over samples held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<i16>,
    position: usize,
    format: SourceFormat,
    /// Upper bound on samples returned per read.
    block_size: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<i16>, format: SourceFormat) -> Self {
        Self {
            samples,
            position: 0,
            format,
            block_size: usize::MAX,
        }
    }

    /// Deliver at most `block_size` samples per read.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioSource for MemorySource {
    fn format(&self) -> SourceFormat {
        self.format
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        let n = buf.len().min(self.remaining()).min(self.block_size);
        buf[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Convert a normalised f32 sample to i16 with saturation.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
