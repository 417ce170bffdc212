//! Paced producer, worker pool and result fan-in.
//!
//! ```text
//! FrameSource --dispatch--> Worker x N --results--> consumer
//!      ^                         |
//!      +-------- feedback -------+
//! ```

pub mod consumer;
pub mod dispatch;
pub mod fan_in;
pub mod pacing;
pub mod shutdown;
pub mod source;
pub mod worker;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

pub use consumer::{run_consumer, ConsumerReport, FrameSink, Throughput};
pub use dispatch::{dispatch_channel, DispatchStats, Dispatcher, Inbox};
pub use fan_in::{
    conflating_fan_in, fan_in, FanInReceiver, FanInSender, FaultReceiver, ResultReceiver,
};
pub use pacing::{PacingState, DEFAULT_PACING_WINDOW};
pub use shutdown::{shutdown_signal, Shutdown, ShutdownTrigger};
pub use source::{FrameSource, SourceReport};
pub use worker::{Worker, WorkerFault, WorkerReport};

use crate::capture::FrameCapture;
use crate::error::{CaptureError, PipelineError};
use crate::transform::ImageTransform;
use crate::PipelineConfig;

/// Faults kept for [`Pipeline::faults`]; older ones are dropped (they are
/// logged by the worker regardless)
pub const FAULT_CAPACITY: usize = 64;

/// Outcome of a clean shutdown
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineReport {
    pub source: SourceReport,
    pub workers: Vec<WorkerReport>,
}

/// A running pipeline: one source thread and a pool of worker threads.
/// The consumer loop runs on whichever thread calls [`Pipeline::consume`].
pub struct Pipeline {
    trigger: ShutdownTrigger,
    shutdown: Shutdown,
    source: JoinHandle<Result<SourceReport, CaptureError>>,
    workers: Vec<JoinHandle<WorkerReport>>,
    results: ResultReceiver,
    faults: FaultReceiver,
}

impl Pipeline {
    pub fn spawn<C, T>(
        config: &PipelineConfig,
        capture: C,
        transform: T,
    ) -> Result<Self, PipelineError>
    where
        C: FrameCapture + 'static,
        T: ImageTransform + 'static,
    {
        config.validate().map_err(PipelineError::Config)?;

        let (trigger, shutdown) = shutdown_signal();
        let (dispatcher, inboxes) = dispatch_channel(config.num_workers);
        let (feedback_tx, feedback_rx) = fan_in();
        let (results_tx, results) = conflating_fan_in(config.result_capacity);
        let (faults_tx, faults) = conflating_fan_in(FAULT_CAPACITY);
        let transform = Arc::new(transform);
        let cores = if config.pin_workers {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut workers = Vec::with_capacity(config.num_workers);
        for (id, inbox) in inboxes.into_iter().enumerate() {
            let worker = Worker::new(
                id,
                inbox,
                Arc::clone(&transform),
                results_tx.clone(),
                feedback_tx.clone(),
                faults_tx.clone(),
                shutdown.clone(),
            );
            let core = (!cores.is_empty()).then(|| cores[id % cores.len()]);
            let spawned = thread::Builder::new()
                .name(format!("framepace-worker-{id}"))
                .spawn(move || {
                    if let Some(core) = core {
                        if !core_affinity::set_for_current(core) {
                            warn!(worker = id, core = core.id, "Failed to pin worker");
                        }
                    }
                    worker.run()
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    trigger.trigger();
                    return Err(err.into());
                }
            }
        }
        // Workers own the only senders from here on
        drop((results_tx, feedback_tx, faults_tx));

        let source = FrameSource::new(
            capture,
            (config.target_height, config.target_width),
            dispatcher,
            feedback_rx,
            PacingState::new(config.pacing_window),
        );
        let source_shutdown = shutdown.clone();
        let source = thread::Builder::new()
            .name("framepace-source".into())
            .spawn(move || source.run(source_shutdown))
            .map_err(|err| {
                trigger.trigger();
                err
            })?;

        info!(
            workers = config.num_workers,
            width = config.target_width,
            height = config.target_height,
            "Pipeline started"
        );
        Ok(Self {
            trigger,
            shutdown,
            source,
            workers,
            results,
            faults,
        })
    }

    /// Run the consumer loop on the calling thread
    pub fn consume<S: FrameSink + ?Sized>(&self, sink: &mut S) -> ConsumerReport {
        run_consumer(&self.results, sink, &self.shutdown)
    }

    /// Processed frames waiting for the consumer
    pub fn backlog(&self) -> usize {
        self.results.len()
    }

    /// Processed frames evicted because the consumer fell behind
    pub fn dropped_results(&self) -> u64 {
        self.results.dropped()
    }

    /// Handle for stopping the pipeline from elsewhere, e.g. a signal handler
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Recent frames workers failed to process, for observability.
    /// At most [`FAULT_CAPACITY`] are kept; see [`FanInReceiver::dropped`].
    pub fn faults(&self) -> &FaultReceiver {
        &self.faults
    }

    /// Stop every loop and wait for all threads
    pub fn shutdown(self) -> Result<PipelineReport, PipelineError> {
        self.trigger.trigger();
        debug!("Shutdown requested, joining threads");

        let source = self
            .source
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("framepace-source".into()));

        let mut workers = Vec::with_capacity(self.workers.len());
        let mut panicked = None;
        for (id, handle) in self.workers.into_iter().enumerate() {
            match handle.join() {
                Ok(report) => workers.push(report),
                Err(_) => panicked = Some(format!("framepace-worker-{id}")),
            }
        }

        let source = source??;
        if let Some(name) = panicked {
            return Err(PipelineError::ThreadPanicked(name));
        }
        info!(frames = source.frames, "Pipeline stopped");
        Ok(PipelineReport { source, workers })
    }
}
