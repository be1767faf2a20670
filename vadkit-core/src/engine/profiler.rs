//! Real-time-factor profiling.
//!
//! RTF = wall-clock time spent inside the engine / duration of audio it
//! processed. Only the engine call is timed; file reads, capture waits and
//! output are excluded. Values below 1.0 mean faster than real time.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RtfProfiler {
    sample_rate: u32,
    frame_length: usize,
    frames: u64,
    processing: Duration,
}

impl RtfProfiler {
    pub fn new(sample_rate: u32, frame_length: usize) -> Self {
        Self {
            sample_rate,
            frame_length,
            frames: 0,
            processing: Duration::ZERO,
        }
    }

    /// Time one engine call and count its frame.
    pub fn measure<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(start.elapsed());
        out
    }

    /// Count one frame that took `elapsed` to process.
    pub fn record(&mut self, elapsed: Duration) {
        self.frames += 1;
        self.processing += elapsed;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Seconds of audio processed so far.
    pub fn audio_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.frames * self.frame_length as u64) as f64 / f64::from(self.sample_rate)
    }

    pub fn processing_secs(&self) -> f64 {
        self.processing.as_secs_f64()
    }

    /// `None` until at least one frame has been processed.
    pub fn real_time_factor(&self) -> Option<f64> {
        let audio = self.audio_secs();
        if audio <= 0.0 {
            return None;
        }
        Some(self.processing_secs() / audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn no_frames_means_no_rtf() {
        let profiler = RtfProfiler::new(16_000, 512);
        assert_eq!(profiler.real_time_factor(), None);
        assert_eq!(profiler.audio_secs(), 0.0);
    }

    #[test]
    fn rtf_is_processing_over_audio() {
        let mut profiler = RtfProfiler::new(16_000, 512);
        for _ in 0..100 {
            profiler.record(Duration::from_micros(320));
        }
        // 100 * 512 / 16000 = 3.2 s of audio, 32 ms of processing
        assert_relative_eq!(profiler.audio_secs(), 3.2, epsilon = 1e-9);
        assert_relative_eq!(profiler.real_time_factor().unwrap(), 0.01, epsilon = 1e-9);
    }

    #[test]
    fn measure_returns_the_closure_value() {
        let mut profiler = RtfProfiler::new(16_000, 512);
        let value = profiler.measure(|| 7);
        assert_eq!(value, 7);
        assert_eq!(profiler.frames(), 1);
        assert!(profiler.real_time_factor().unwrap() >= 0.0);
    }
}
