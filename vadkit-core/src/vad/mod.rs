//! Voice activity helpers layered over engine probabilities.
//!
//! The engine only ever produces a probability per frame. Turning that into a
//! decision, or into something steady enough to render, happens here.

pub mod energy;
pub mod smoothing;

pub use energy::EnergyScorer;
pub use smoothing::ExpSmoother;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// The probability reached the threshold.
    Speech,
    Silence,
}

impl VadDecision {
    /// `Speech` iff `probability >= threshold`.
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability >= threshold {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}
