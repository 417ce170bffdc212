pub mod frame;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod decoder;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{Depth, ElementType, Frame};
pub use synthetic::SyntheticCapture;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Capture;

use crate::error::CaptureError;

/// A blocking frame source owned by the producer thread
pub trait FrameCapture: Send {
    fn capture(&mut self) -> Result<Frame, CaptureError>;
}

impl<C: FrameCapture + ?Sized> FrameCapture for Box<C> {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        (**self).capture()
    }
}
