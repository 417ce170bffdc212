//! Per-frame image transforms run by the worker pool

mod edges;

pub use edges::EdgeDetect;

use crate::capture::Frame;
use crate::error::TransformError;

/// An expensive, stateless frame transform shared by every worker
pub trait ImageTransform: Send + Sync {
    fn transform(&self, frame: Frame) -> Result<Frame, TransformError>;
}

impl<F> ImageTransform for F
where
    F: Fn(Frame) -> Result<Frame, TransformError> + Send + Sync,
{
    fn transform(&self, frame: Frame) -> Result<Frame, TransformError> {
        self(frame)
    }
}

/// Pass frames through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ImageTransform for Identity {
    fn transform(&self, frame: Frame) -> Result<Frame, TransformError> {
        Ok(frame)
    }
}
