/// Exponential smoothing of per-frame probabilities for display.
///
/// `value = alpha * p + (1 - alpha) * value`, starting from zero.
#[derive(Debug, Clone, Copy)]
pub struct ExpSmoother {
    alpha: f32,
    value: f32,
}

impl ExpSmoother {
    pub const DEFAULT_ALPHA: f32 = 0.15;

    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: 0.0,
        }
    }

    pub fn update(&mut self, probability: f32) -> f32 {
        self.value = self.alpha * probability + (1.0 - self.alpha) * self.value;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Default for ExpSmoother {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ALPHA)
    }
}
