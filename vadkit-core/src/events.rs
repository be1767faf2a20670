//! Records produced by a streaming run.
//!
//! Both types serialize to camelCase JSON so the CLI can emit them as
//! newline-delimited records for downstream tooling.

use serde::{Deserialize, Serialize};

/// One processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEvent {
    /// Zero-based position of the frame in the stream.
    pub index: u64,
    /// Start of the frame, in seconds from the start of the stream.
    pub offset_secs: f64,
    /// Raw engine probability in `[0, 1]`.
    pub probability: f32,
}

/// Why a streaming run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// The source delivered fewer samples than a full frame.
    EndOfStream,
    /// A stop was requested.
    Stopped,
}

/// Totals for a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub frames: u64,
    pub audio_secs: f64,
    /// Wall-clock time spent inside the engine.
    pub processing_secs: f64,
    /// `None` when no frame was processed.
    pub real_time_factor: Option<f64>,
    /// Samples of a trailing partial frame that were dropped.
    pub discarded_samples: usize,
    pub end_reason: EndReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_event_json_shape() {
        let event = FrameEvent {
            index: 3,
            offset_secs: 0.096,
            probability: 0.5,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["index"], 3);
        assert_eq!(json["offsetSecs"], 0.096);
        assert_eq!(json["probability"], 0.5);
    }

    #[test]
    fn summary_round_trips_end_reason() {
        let summary = StreamSummary {
            frames: 0,
            audio_secs: 0.0,
            processing_secs: 0.0,
            real_time_factor: None,
            discarded_samples: 12,
            end_reason: EndReason::Stopped,
        };
        let text = serde_json::to_string(&summary).unwrap();
        assert!(text.contains("\"endReason\":\"stopped\""));
        assert!(text.contains("\"realTimeFactor\":null"));
        let back: StreamSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back, summary);
    }
}
