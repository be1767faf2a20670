//! Capture-rate to engine-rate conversion.
//!
//! Devices deliver mono f32 at whatever rate they run (44.1 and 48 kHz are
//! common); the engine takes 16-bit samples at exactly one rate. A
//! [`PcmConverter`] does both steps on the reading thread. Equal rates skip
//! rubato entirely and only quantize.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use super::f32_to_i16;
use crate::error::{Result, VadError};

pub struct PcmConverter {
    /// `None` when the rates already match.
    resampler: Option<FastFixedIn<f32>>,
    /// Input not yet forming a full block.
    backlog: Vec<f32>,
    block: usize,
    scratch: Vec<Vec<f32>>,
}

impl PcmConverter {
    /// `block` is the number of input samples handed to rubato per call.
    pub fn new(capture_rate: u32, target_rate: u32, block: usize) -> Result<Self> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                backlog: Vec::new(),
                block,
                scratch: Vec::new(),
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            target_rate as f64 / capture_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            block,
            1,
        )
        .map_err(|e| {
            VadError::AudioStream(format!(
                "cannot convert {capture_rate} Hz capture to {target_rate} Hz: {e}"
            ))
        })?;
        let scratch = vec![vec![0f32; resampler.output_frames_max()]];

        tracing::info!(capture_rate, target_rate, block, "resampling capture audio");

        Ok(Self {
            resampler: Some(resampler),
            backlog: Vec::with_capacity(block * 2),
            block,
            scratch,
        })
    }

    /// Convert `input` and append the resulting engine samples to `out`.
    ///
    /// Returns the number of samples appended. Input short of a full block is
    /// held back until the next call.
    pub fn convert(&mut self, input: &[f32], out: &mut Vec<i16>) -> Result<usize> {
        let before = out.len();
        let Some(resampler) = self.resampler.as_mut() else {
            out.extend(input.iter().copied().map(f32_to_i16));
            return Ok(out.len() - before);
        };

        self.backlog.extend_from_slice(input);
        let mut offset = 0;
        while self.backlog.len() - offset >= self.block {
            let block = &self.backlog[offset..offset + self.block];
            let (_, produced) = resampler
                .process_into_buffer(&[block], &mut self.scratch, None)
                .map_err(|e| VadError::AudioStream(format!("resampling failed: {e}")))?;
            out.extend(self.scratch[0][..produced].iter().copied().map(f32_to_i16));
            offset += self.block;
        }
        self.backlog.drain(..offset);
        Ok(out.len() - before)
    }

    /// Input samples waiting for a full block.
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_rates_only_quantize() {
        let mut conv = PcmConverter::new(16_000, 16_000, 480).unwrap();
        assert!(conv.is_passthrough());
        let mut out = Vec::new();
        assert_eq!(conv.convert(&[0.0, 0.5, -1.0, 1.0], &mut out).unwrap(), 4);
        assert_eq!(out, vec![0, 16_384, -32_768, 32_767]);
    }

    #[test]
    fn cd_rate_is_brought_down_to_16k() {
        let mut conv = PcmConverter::new(44_100, 16_000, 441).unwrap();
        let mut out = Vec::new();
        // 100 ms of input
        conv.convert(&vec![0.0f32; 4410], &mut out).unwrap();
        assert!((out.len() as isize - 1600).unsigned_abs() <= 10, "len={}", out.len());
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn short_input_waits_for_a_full_block() {
        let mut conv = PcmConverter::new(48_000, 16_000, 480).unwrap();
        let mut out = Vec::new();
        assert_eq!(conv.convert(&[0.0; 300], &mut out).unwrap(), 0);
        assert_eq!(conv.backlog(), 300);

        assert!(conv.convert(&[0.0; 300], &mut out).unwrap() > 0);
        assert_eq!(conv.backlog(), 120);
    }
}
