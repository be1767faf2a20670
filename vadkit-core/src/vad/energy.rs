//! Energy-based voice probability scorer.
//!
//! Backs the in-process stub engine, so streams can be exercised end to end
//! without a native engine binary.
//!
//! ## Algorithm
//!
//! 1. Compute the RMS level of the frame in dBFS.
//! 2. Map it through a logistic centred on `midpoint_dbfs` to get a raw
//!    probability. A digitally silent frame scores exactly `0.0`.
//! 3. Hold the result against a decaying hangover
//!    (`max(raw, previous * decay)`) so syllable endings are not clipped.
//! 4. Clamp to `[0, 1]`.

/// Level below which a frame is treated as digital silence.
const SILENCE_FLOOR_DBFS: f32 = -90.0;

/// A simple energy-based voice probability scorer.
#[derive(Debug, Clone)]
pub struct EnergyScorer {
    /// Level (dBFS) that scores 0.5.
    midpoint_dbfs: f32,
    /// dB per logistic unit. Smaller is a sharper transition.
    slope_db: f32,
    /// Per-frame decay of the held probability, in `[0, 1)`.
    decay: f32,
    held: f32,
}

impl EnergyScorer {
    /// Create a new `EnergyScorer`.
    ///
    /// # Parameters
    /// - `midpoint_dbfs`: level scoring 0.5. Default: `-40.0`.
    /// - `slope_db`: logistic slope. Default: `4.0`.
    /// - `decay`: hangover decay per frame. Default: `0.6`.
    pub fn new(midpoint_dbfs: f32, slope_db: f32, decay: f32) -> Self {
        Self {
            midpoint_dbfs,
            slope_db: slope_db.max(f32::EPSILON),
            decay: decay.clamp(0.0, 0.999),
            held: 0.0,
        }
    }

    /// Score one frame of 16-bit PCM.
    pub fn score(&mut self, frame: &[i16]) -> f32 {
        let level = Self::level_dbfs(frame);
        let raw = if level <= SILENCE_FLOOR_DBFS {
            0.0
        } else {
            1.0 / (1.0 + (-(level - self.midpoint_dbfs) / self.slope_db).exp())
        };

        self.held = raw.max(self.held * self.decay);
        if self.held < 1e-4 {
            self.held = 0.0;
        }
        self.held.clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        self.held = 0.0;
    }

    /// RMS level of a frame relative to i16 full scale.
    fn level_dbfs(frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return f32::NEG_INFINITY;
        }
        let sum_sq: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        let rms = (sum_sq / frame.len() as f64).sqrt() / f64::from(i16::MAX);
        if rms <= 0.0 {
            return f32::NEG_INFINITY;
        }
        (20.0 * rms.log10()) as f32
    }
}

impl Default for EnergyScorer {
    fn default() -> Self {
        Self::new(-40.0, 4.0, 0.6)
    }
}
