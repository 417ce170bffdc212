//! framepace: paced frame processing with a parallel worker pool

use std::path::PathBuf;

use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use framepace::capture::{FrameCapture, SyntheticCapture};
use framepace::sink::MonitorSink;
use framepace::transform::EdgeDetect;
use framepace::{CaptureConfig, CaptureSource, Config, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framepace=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("framepace launching...");

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Capture failures at startup are fatal
    let capture = open_capture(&config.capture)?;
    let pipeline = Pipeline::spawn(&config.pipeline, capture, EdgeDetect::default())?;
    let trigger = pipeline.shutdown_trigger();

    let mut sink = MonitorSink::new(&config.output);
    let mut consumer = tokio::task::spawn_blocking(move || {
        let report = pipeline.consume(&mut sink);
        (pipeline, sink, report)
    });

    let (pipeline, sink, consumed) = tokio::select! {
        joined = &mut consumer => joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
            trigger.trigger();
            consumer.await?
        }
    };

    let faults = pipeline.faults();
    let faults = faults.try_iter().count() as u64 + faults.dropped();
    let report = pipeline.shutdown()?;

    if let Err(err) = sink.write_snapshot() {
        warn!("Failed to write snapshot: {err}");
    }

    info!(
        captured = report.source.frames,
        replaced = report.source.dispatch.replaced,
        consumed = consumed.frames,
        fps = format!("{:.1}", consumed.fps),
        faults,
        "framepace shutting down"
    );
    for worker in &report.workers {
        info!(
            worker = worker.worker,
            processed = worker.processed,
            failed = worker.failed,
            "Worker summary"
        );
    }
    Ok(())
}

fn open_capture(config: &CaptureConfig) -> Result<Box<dyn FrameCapture>> {
    match config.source {
        CaptureSource::Synthetic => Ok(Box::new(SyntheticCapture::new(config)?)),
        #[cfg(feature = "v4l2")]
        CaptureSource::V4l2 => Ok(Box::new(framepace::capture::V4l2Capture::new(config)?)),
        #[cfg(not(feature = "v4l2"))]
        CaptureSource::V4l2 => Err(color_eyre::eyre::eyre!(
            "V4L2 capture requires the `v4l2` feature"
        )),
    }
}
