//! Camera stand-in producing a moving test pattern at a fixed rate

use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use super::frame::{ElementType, Frame};
use super::FrameCapture;
use crate::error::CaptureError;
use crate::CaptureConfig;

pub struct SyntheticCapture {
    rows: usize,
    cols: usize,
    interval: Option<Duration>,
    next_due: Option<Instant>,
    sequence: u64,
}

impl SyntheticCapture {
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::DeviceUnavailable(format!(
                "synthetic source needs a non-zero size, got {}x{}",
                config.width, config.height
            )));
        }
        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Synthetic capture ready"
        );
        Ok(Self {
            rows: config.height as usize,
            cols: config.width as usize,
            interval: (config.fps > 0).then(|| Duration::from_secs(1) / config.fps),
            next_due: None,
            sequence: 0,
        })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Block until the next frame is due, like a camera would
    fn wait_for_slot(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        // Fall back onto the grid instead of bursting after a stall
        self.next_due = Some(due.max(now) + interval);
    }

    fn render(&self) -> Result<Frame, CaptureError> {
        let shift = self.sequence as usize;
        let mut data = Vec::with_capacity(self.rows * self.cols * 3);
        for y in 0..self.rows {
            for x in 0..self.cols {
                // Diagonal bars drifting one pixel per frame
                let bar = ((x + y + shift) / 16) % 2 == 0;
                let b = if bar { 230 } else { 25 };
                let g = (y * 255 / self.rows.max(1)) as u8;
                let r = (x * 255 / self.cols.max(1)) as u8;
                data.extend_from_slice(&[b, g, r]);
            }
        }
        Ok(Frame::new(self.rows, self.cols, ElementType::BGR8, data)?)
    }
}

impl FrameCapture for SyntheticCapture {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        self.wait_for_slot();
        let frame = self.render()?;
        self.sequence += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(width: u32, height: u32, fps: u32) -> CaptureConfig {
        CaptureConfig {
            width,
            height,
            fps,
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn frames_have_configured_geometry() {
        let mut capture = SyntheticCapture::new(&config(32, 24, 0)).unwrap();
        let frame = capture.capture().unwrap();
        assert_eq!((frame.rows(), frame.cols()), (24, 32));
        assert_eq!(frame.element(), ElementType::BGR8);
        assert_eq!(capture.sequence(), 1);
    }

    #[test]
    fn pattern_moves_between_frames() {
        let mut capture = SyntheticCapture::new(&config(32, 8, 0)).unwrap();
        let first = capture.capture().unwrap();
        let second = capture.capture().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn capture_is_paced_by_fps() {
        let mut capture = SyntheticCapture::new(&config(4, 4, 50)).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            capture.capture().unwrap();
        }
        // First frame is immediate, the next two wait 20ms each
        assert!(start.elapsed() >= Duration::from_millis(35));
    }

    #[test]
    fn zero_size_is_refused() {
        assert!(matches!(
            SyntheticCapture::new(&config(0, 10, 30)),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }
}
