//! Terminal renderings of a stream: raw probabilities, threshold detections,
//! JSON records and the live meter.

use std::io::Write;

use vadkit_core::engine::pipeline::FrameSink;
use vadkit_core::vad::{ExpSmoother, VadDecision};
use vadkit_core::{FrameEvent, Result, StreamSummary};

/// Cells in the live meter bar.
const METER_CELLS: usize = 20;

/// How per-frame results are written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    /// `0.42 ` per frame on one line.
    Probabilities,
    /// One line per frame at or above the threshold.
    Threshold(f32),
    /// One JSON object per frame, then the summary.
    Json,
}

pub struct FramePrinter<W: Write> {
    out: W,
    mode: OutputMode,
}

impl<W: Write> FramePrinter<W> {
    pub fn new(out: W, mode: OutputMode) -> Self {
        Self { out, mode }
    }

    /// Write the run totals in the same mode as the frames.
    pub fn finish(mut self, summary: &StreamSummary) -> Result<W> {
        match self.mode {
            OutputMode::Json => {
                serde_json::to_writer(&mut self.out, summary).map_err(std::io::Error::other)?;
                writeln!(self.out)?;
            }
            OutputMode::Probabilities => {
                writeln!(self.out)?;
                write_rtf(&mut self.out, summary)?;
            }
            OutputMode::Threshold(_) => write_rtf(&mut self.out, summary)?,
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> FrameSink for FramePrinter<W> {
    fn on_frame(&mut self, event: &FrameEvent) -> Result<()> {
        match self.mode {
            OutputMode::Probabilities => write!(self.out, "{:.2} ", event.probability)?,
            OutputMode::Threshold(threshold) => {
                if VadDecision::from_probability(event.probability, threshold).is_speech() {
                    writeln!(self.out, "{}", detection_line(event))?;
                }
            }
            OutputMode::Json => {
                serde_json::to_writer(&mut self.out, event).map_err(std::io::Error::other)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }
}

pub fn detection_line(event: &FrameEvent) -> String {
    format!(
        "Detected voice activity at {:.3} seconds",
        event.offset_secs
    )
}

fn write_rtf<W: Write>(out: &mut W, summary: &StreamSummary) -> std::io::Result<()> {
    match summary.real_time_factor {
        Some(rtf) => writeln!(out, "real time factor : {rtf:.3}"),
        None => writeln!(out, "real time factor : n/a (no frames processed)"),
    }
}

/// Progressively updated voice meter driven by smoothed probabilities.
///
/// Smoothing only affects what is drawn; frame events keep the raw value.
pub struct LiveMeter<W: Write> {
    out: W,
    smoother: ExpSmoother,
}

impl<W: Write> LiveMeter<W> {
    pub fn new(out: W, alpha: f32) -> Self {
        Self {
            out,
            smoother: ExpSmoother::new(alpha),
        }
    }

    pub fn finish(mut self) -> Result<W> {
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> FrameSink for LiveMeter<W> {
    fn on_frame(&mut self, event: &FrameEvent) -> Result<()> {
        let value = self.smoother.update(event.probability);
        write!(self.out, "{}", render_meter(value))?;
        self.out.flush()?;
        Ok(())
    }
}

/// `\r[ 42%]████████            |`
pub fn render_meter(value: f32) -> String {
    let value = value.clamp(0.0, 1.0);
    let percentage = (value * 100.0).round() as u32;
    let filled = ((value * METER_CELLS as f32).round() as usize).min(METER_CELLS);
    format!(
        "\r[{percentage:3}%]{}{}|",
        "█".repeat(filled),
        " ".repeat(METER_CELLS - filled)
    )
}

/// Write `index: N, name: X` per device.
pub fn print_devices<W: Write>(
    out: &mut W,
    devices: impl IntoIterator<Item = (usize, String)>,
) -> std::io::Result<()> {
    for (index, name) in devices {
        writeln!(out, "index: {index}, name: {name}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vadkit_core::EndReason;

    fn event(index: u64, probability: f32) -> FrameEvent {
        FrameEvent {
            index,
            offset_secs: index as f64 * 0.032,
            probability,
        }
    }

    fn summary(frames: u64) -> StreamSummary {
        StreamSummary {
            frames,
            audio_secs: frames as f64 * 0.032,
            processing_secs: 0.001,
            real_time_factor: (frames > 0).then(|| 0.001 / (frames as f64 * 0.032)),
            discarded_samples: 0,
            end_reason: EndReason::EndOfStream,
        }
    }

    #[test]
    fn probabilities_are_space_separated() {
        let mut printer = FramePrinter::new(Vec::new(), OutputMode::Probabilities);
        printer.on_frame(&event(0, 0.0)).unwrap();
        printer.on_frame(&event(1, 0.456)).unwrap();
        let out = String::from_utf8(printer.finish(&summary(2)).unwrap()).unwrap();
        assert!(out.starts_with("0.00 0.46 \n"));
        assert!(out.lines().nth(1).unwrap().starts_with("real time factor : 0.0"));
    }

    #[test]
    fn threshold_prints_only_detections() {
        let mut printer = FramePrinter::new(Vec::new(), OutputMode::Threshold(0.5));
        printer.on_frame(&event(0, 0.1)).unwrap();
        printer.on_frame(&event(3, 0.9)).unwrap();
        let out = String::from_utf8(printer.finish(&summary(4)).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Detected voice activity at 0.096 seconds");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn json_mode_emits_one_record_per_line() {
        let mut printer = FramePrinter::new(Vec::new(), OutputMode::Json);
        printer.on_frame(&event(0, 0.25)).unwrap();
        let out = String::from_utf8(printer.finish(&summary(1)).unwrap()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["probability"], 0.25);
        assert_eq!(lines[1]["frames"], 1);
        assert_eq!(lines[1]["endReason"], "endOfStream");
    }

    #[test]
    fn meter_renders_twenty_cells() {
        assert_eq!(render_meter(0.0), format!("\r[  0%]{}|", " ".repeat(20)));
        assert_eq!(render_meter(1.0), format!("\r[100%]{}|", "█".repeat(20)));
        assert_eq!(
            render_meter(0.42),
            format!("\r[ 42%]{}{}|", "█".repeat(8), " ".repeat(12))
        );
    }

    #[test]
    fn meter_draws_smoothed_values() {
        let mut meter = LiveMeter::new(Vec::new(), 0.15);
        meter.on_frame(&event(0, 1.0)).unwrap();
        let out = String::from_utf8(meter.finish().unwrap()).unwrap();
        // 0.15 smoothed from zero
        assert!(out.starts_with("\r[ 15%]"));
    }

    #[test]
    fn devices_are_listed_by_index() {
        let mut out = Vec::new();
        print_devices(&mut out, vec![(0, "cpu".to_string()), (1, "gpu:0".to_string())]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "index: 0, name: cpu\nindex: 1, name: gpu:0\n"
        );
    }
}
