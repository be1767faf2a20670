//! Fixed-length frame assembled from an audio source.

use crate::audio::AudioSource;
use crate::error::Result;

/// Outcome of filling a frame from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Exactly `frame_length` samples are ready.
    Full,
    /// The source ran dry after this many samples (possibly zero).
    Partial(usize),
}

/// A caller-owned frame of signed 16-bit mono samples, reused across
/// iterations and overwritten by every fill.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    samples: Vec<i16>,
}

impl FrameBuffer {
    pub fn new(frame_length: usize) -> Self {
        Self {
            samples: vec![0; frame_length],
        }
    }

    /// Read from `source` until the frame is full or the source returns
    /// zero samples. Short reads are retried, so sources may deliver audio
    /// in any block size.
    pub fn fill(&mut self, source: &mut dyn AudioSource) -> Result<Fill> {
        let mut filled = 0;
        while filled < self.samples.len() {
            let n = source.read(&mut self.samples[filled..])?;
            if n == 0 {
                return Ok(Fill::Partial(filled));
            }
            filled += n;
        }
        Ok(Fill::Full)
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MemorySource, SourceFormat};

    #[test]
    fn fills_whole_frames_then_reports_the_tail() {
        let samples: Vec<i16> = (0..10).collect();
        let mut source = MemorySource::new(samples, SourceFormat::pcm16_mono(16_000));
        let mut frame = FrameBuffer::new(4);

        assert_eq!(frame.fill(&mut source).unwrap(), Fill::Full);
        assert_eq!(frame.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(frame.fill(&mut source).unwrap(), Fill::Full);
        assert_eq!(frame.as_slice(), &[4, 5, 6, 7]);
        assert_eq!(frame.fill(&mut source).unwrap(), Fill::Partial(2));
        assert_eq!(frame.fill(&mut source).unwrap(), Fill::Partial(0));
    }

    #[test]
    fn short_reads_are_accumulated() {
        let mut source = MemorySource::new(vec![7; 9], SourceFormat::pcm16_mono(16_000))
            .with_block_size(2);
        let mut frame = FrameBuffer::new(5);
        assert_eq!(frame.fill(&mut source).unwrap(), Fill::Full);
        assert_eq!(frame.as_slice(), &[7; 5]);
        assert_eq!(frame.fill(&mut source).unwrap(), Fill::Partial(4));
    }
}
