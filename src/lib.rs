pub mod capture;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod transform;
pub mod wire;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use capture::{ElementType, Frame, FrameCapture};
pub use error::{CaptureError, ConfigError, DecodeError, PipelineError, TransformError};
pub use pipeline::{Pipeline, PipelineReport};
pub use transform::ImageTransform;

/// Prefix for environment overrides, e.g. `FRAMEPACE__PIPELINE__NUM_WORKERS=8`
pub const ENV_PREFIX: &str = "FRAMEPACE";

/// System configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// Generated test pattern
    Synthetic,
    /// V4L2 camera, needs the `v4l2` feature
    V4l2,
}

/// Formats requested from a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Mjpeg,
    Yuyv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: CaptureSource,
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub num_workers: usize,
    /// Frames are resized to this before dispatch
    pub target_width: usize,
    pub target_height: usize,
    /// Number of timing samples averaged for pacing
    pub pacing_window: usize,
    /// Processed frames held for the consumer; older ones are dropped
    pub result_capacity: usize,
    pub pin_workers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Stop after this many frames; 0 runs until interrupted
    pub max_frames: u64,
    pub report_interval_ms: u64,
    /// Write the last processed frame here as PNG
    pub snapshot: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CaptureSource::Synthetic,
            device: "/dev/video0".into(),
            width: 1280,
            height: 720,
            fps: 30,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            target_width: 640,
            target_height: 360,
            pacing_window: pipeline::DEFAULT_PACING_WINDOW,
            result_capacity: 4,
            pin_workers: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_frames: 0,
            report_interval_ms: 1000,
            snapshot: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.num_workers == 0 {
            return Err("num_workers must be at least 1".into());
        }
        if self.pacing_window == 0 {
            return Err("pacing_window must be at least 1".into());
        }
        if self.result_capacity == 0 {
            return Err("result_capacity must be at least 1".into());
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(format!(
                "target size must be non-zero, got {}x{}",
                self.target_width, self.target_height
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.pipeline.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}
