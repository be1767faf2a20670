//! WAV file input and capture recording via `hound`.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, info};

use super::{AudioSource, SourceFormat};
use crate::error::{Result, VadError};

/// Streams samples from a WAV file.
///
/// The reported format is the file's own; reading anything other than
/// 16-bit integer mono fails, so callers validate before streaming.
pub struct WavSource {
    reader: WavReader<std::io::BufReader<File>>,
    format: SourceFormat,
    path: PathBuf,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = WavReader::open(&path)?;
        let spec = reader.spec();
        let format = SourceFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            is_float: spec.sample_format == SampleFormat::Float,
        };
        info!(path = %path.display(), %format, "opened WAV input");
        Ok(Self {
            reader,
            format,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total samples per channel declared by the header.
    pub fn duration_samples(&self) -> u32 {
        self.reader.duration()
    }
}

impl AudioSource for WavSource {
    fn format(&self) -> SourceFormat {
        self.format
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        if self.format != SourceFormat::pcm16_mono(self.format.sample_rate) {
            return Err(VadError::FormatMismatch(format!(
                "'{}' is {}, expected 16-bit integer mono",
                self.path.display(),
                self.format
            )));
        }

        let mut n = 0;
        for (slot, sample) in buf.iter_mut().zip(self.reader.samples::<i16>()) {
            *slot = sample?;
            n += 1;
        }
        Ok(n)
    }
}

/// Wraps a source and records every sample it yields to a WAV file.
pub struct WavTee<S> {
    inner: S,
    writer: WavWriter<BufWriter<File>>,
    written: u64,
}

impl<S: AudioSource> WavTee<S> {
    pub fn create(inner: S, path: impl AsRef<Path>) -> Result<Self> {
        let format = inner.format();
        let spec = WavSpec {
            channels: 1,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path.as_ref(), spec)?;
        info!(path = %path.as_ref().display(), "recording input to WAV");
        Ok(Self {
            inner,
            writer,
            written: 0,
        })
    }

    pub fn samples_written(&self) -> u64 {
        self.written
    }

    /// Finalize the WAV header and hand back the wrapped source.
    pub fn finish(self) -> Result<S> {
        self.writer.finalize()?;
        debug!(samples = self.written, "WAV recording finalized");
        Ok(self.inner)
    }
}

impl<S: AudioSource> AudioSource for WavTee<S> {
    fn format(&self) -> SourceFormat {
        self.inner.format()
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        for &sample in &buf[..n] {
            self.writer.write_sample(sample)?;
        }
        self.written += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemorySource;

    fn write_wav(path: &Path, spec: WavSpec, samples: &[i16]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn reads_pcm16_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[1, -2, 3, -4, 5]);

        let mut source = WavSource::open(&path).unwrap();
        assert_eq!(source.format(), SourceFormat::pcm16_mono(16_000));
        assert_eq!(source.duration_samples(), 5);
        let mut buf = [0i16; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, -2, 3, -4]);
        assert_eq!(source.read(&mut buf).unwrap(), 1);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn stereo_file_refuses_to_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[0; 8]);

        let mut source = WavSource::open(&path).unwrap();
        assert_eq!(source.format().channels, 2);
        let mut buf = [0i16; 4];
        assert!(matches!(
            source.read(&mut buf),
            Err(VadError::FormatMismatch(_))
        ));
    }

    #[test]
    fn tee_records_what_was_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tee.wav");
        let inner = MemorySource::new(vec![10, 20, 30], SourceFormat::pcm16_mono(16_000));
        let mut tee = WavTee::create(inner, &path).unwrap();

        let mut buf = [0i16; 2];
        tee.read(&mut buf).unwrap();
        tee.read(&mut buf).unwrap();
        assert_eq!(tee.samples_written(), 3);
        tee.finish().unwrap();

        let recorded: Vec<i16> = WavReader::open(&path)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(recorded, vec![10, 20, 30]);
    }
}
