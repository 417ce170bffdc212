//! Error types for the frame pipeline

use thiserror::Error;

use crate::capture::frame::ElementType;

/// Invalid frame geometry or buffer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame dimensions {rows}x{cols} exceed the wire header range")]
    TooLarge { rows: usize, cols: usize },

    #[error("row stride {stride} is shorter than a row of {row_bytes} bytes")]
    StrideTooShort { stride: usize, row_bytes: usize },

    #[error("pixel buffer holds {actual} bytes, frame needs {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// Failure to obtain a frame from the source
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture stream not started")]
    NotStarted,

    #[error("unsupported capture format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to decode captured image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Truncated or malformed wire buffer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("wire buffer of {len} bytes is shorter than the {header} byte header")]
    Truncated { len: usize, header: usize },

    #[error("negative dimensions in header: {rows}x{cols}")]
    NegativeDimension { rows: i32, cols: i32 },

    #[error("unknown element type code {0}")]
    UnknownElementType(i32),

    #[error("payload is {actual} bytes, header declares {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Failure inside an image transform
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("transform does not support element type {0}")]
    UnsupportedElementType(ElementType),

    #[error("transform failed: {0}")]
    Failed(String),

    #[error("transform panicked: {0}")]
    Panicked(String),
}

impl From<FrameError> for TransformError {
    fn from(err: FrameError) -> Self {
        TransformError::Failed(err.to_string())
    }
}

/// Recoverable per-frame failure inside a worker
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Fatal pipeline failure
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    Config(String),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("frame source stopped: {0}")]
    Capture(#[from] CaptureError),

    #[error("thread {0} panicked")]
    ThreadPanicked(String),
}

/// Configuration could not be loaded or is invalid
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
