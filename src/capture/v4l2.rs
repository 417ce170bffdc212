//! V4L2 camera capture

use tracing::{info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder::decode_frame;
use super::frame::Frame;
use super::FrameCapture;
use crate::error::CaptureError;
use crate::{CaptureConfig, PixelFormat};

pub struct V4l2Capture {
    stream: MmapStream<'static>,
    format: PixelFormat,
    width: usize,
    height: usize,
    sequence: u64,
}

impl V4l2Capture {
    /// Open the device, negotiate the format and start streaming
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        info!("Initializing V4L2 capture: {}", config.device);

        let device = Device::with_path(&config.device)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {e}", config.device)))?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} does not support video capture",
                config.device
            )));
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = match config.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        };
        let fmt = device.set_format(&fmt)?;

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)?;
        info!(
            width = fmt.width,
            height = fmt.height,
            buffers = config.buffer_count,
            "Capture stream started"
        );

        Ok(Self {
            stream,
            format: config.format,
            width: fmt.width as usize,
            height: fmt.height as usize,
            sequence: 0,
        })
    }
}

impl FrameCapture for V4l2Capture {
    #[instrument(skip(self), fields(sequence = self.sequence))]
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let (buf, _meta) = self.stream.next()?;
        let frame = decode_frame(buf, self.format, self.width, self.height)?;
        self.sequence += 1;
        Ok(frame)
    }
}
