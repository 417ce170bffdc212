//! Sink that reports throughput and optionally keeps the last frame

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::ExtendedColorType;
use tracing::{info, warn};

use crate::capture::{Depth, Frame};
use crate::pipeline::{FrameSink, Throughput};
use crate::OutputConfig;

pub struct MonitorSink {
    max_frames: u64,
    interval: Duration,
    snapshot: Option<PathBuf>,
    throughput: Throughput,
    last_report: Instant,
    last_frame: Option<Frame>,
}

impl MonitorSink {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            max_frames: config.max_frames,
            interval: Duration::from_millis(config.report_interval_ms),
            snapshot: config.snapshot.clone(),
            throughput: Throughput::new(),
            last_report: Instant::now(),
            last_frame: None,
        }
    }

    pub fn frames(&self) -> u64 {
        self.throughput.frames()
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Write the most recent frame to the configured snapshot path.
    /// Returns the path written, if any.
    pub fn write_snapshot(&self) -> Result<Option<&Path>, image::ImageError> {
        let (Some(path), Some(frame)) = (self.snapshot.as_deref(), self.last_frame.as_ref()) else {
            return Ok(None);
        };
        let color = match (frame.element().depth(), frame.element().channels()) {
            (Depth::U8, 1) => ExtendedColorType::L8,
            (Depth::U8, 3) => ExtendedColorType::Rgb8,
            (Depth::U8, 4) => ExtendedColorType::Rgba8,
            (depth, channels) => {
                warn!(?depth, channels, "Snapshot skipped, PNG needs 8-bit gray, BGR or BGRA");
                return Ok(None);
            }
        };
        let mut data = frame.clone().into_packed();
        if matches!(color, ExtendedColorType::Rgb8 | ExtendedColorType::Rgba8) {
            let step = frame.element().channels() as usize;
            for px in data.chunks_exact_mut(step) {
                px.swap(0, 2);
            }
        }
        image::save_buffer_with_format(
            path,
            &data,
            frame.cols() as u32,
            frame.rows() as u32,
            color,
            image::ImageFormat::Png,
        )?;
        info!(path = %path.display(), "Snapshot written");
        Ok(Some(path))
    }
}

impl FrameSink for MonitorSink {
    fn consume(&mut self, frame: Frame) -> ControlFlow<()> {
        let fps = self.throughput.record();
        if self.last_report.elapsed() >= self.interval {
            info!(frames = self.throughput.frames(), fps = format!("{fps:.1}"), "Throughput");
            self.last_report = Instant::now();
        }
        if self.snapshot.is_some() {
            self.last_frame = Some(frame);
        }

        if self.max_frames > 0 && self.throughput.frames() >= self.max_frames {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
