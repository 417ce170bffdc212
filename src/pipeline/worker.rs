//! Worker loop: take the pending frame, transform it, report the result
//! and how long the transform took.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use super::dispatch::Inbox;
use super::fan_in::{FaultSender, FeedbackSender, ResultSender};
use super::shutdown::Shutdown;
use crate::error::{TransformError, WorkerError};
use crate::transform::ImageTransform;
use crate::wire::{self, TimingSample, WireMessage};

/// A frame a worker could not process
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerFault {
    pub worker: usize,
    pub error: WorkerError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerReport {
    pub worker: usize,
    pub processed: u64,
    pub failed: u64,
}

pub struct Worker<T: ?Sized> {
    id: usize,
    inbox: Inbox,
    transform: Arc<T>,
    results: ResultSender,
    feedback: FeedbackSender,
    faults: FaultSender,
    shutdown: Shutdown,
}

impl<T: ImageTransform + ?Sized> Worker<T> {
    pub fn new(
        id: usize,
        inbox: Inbox,
        transform: Arc<T>,
        results: ResultSender,
        feedback: FeedbackSender,
        faults: FaultSender,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            id,
            inbox,
            transform,
            results,
            feedback,
            faults,
            shutdown,
        }
    }

    /// Process frames until the inbox closes or shutdown fires
    #[instrument(skip_all, fields(worker = self.id))]
    pub fn run(self) -> WorkerReport {
        info!("Worker started");
        let mut report = WorkerReport {
            worker: self.id,
            ..WorkerReport::default()
        };

        while let Some(msg) = self.inbox.recv(&self.shutdown) {
            match self.process(&msg) {
                Ok((output, sample)) => {
                    report.processed += 1;
                    debug!(worker = self.id, secs = sample.as_secs(), "Frame processed");
                    metrics::histogram!("framepace_transform_seconds").record(sample.as_secs());
                    self.results.send(output);
                    self.feedback.send(sample);
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(worker = self.id, %error, "Dropping frame");
                    metrics::counter!("framepace_worker_faults").increment(1);
                    self.faults.send(WorkerFault {
                        worker: self.id,
                        error,
                    });
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            "Worker stopped"
        );
        report
    }

    /// Decode, transform and re-encode one message, timing the transform
    fn process(&self, msg: &WireMessage) -> Result<(WireMessage, TimingSample), WorkerError> {
        let frame = msg.decode()?;
        let start = Instant::now();
        // A panic must not take the slot down with it
        let output = panic::catch_unwind(AssertUnwindSafe(|| self.transform.transform(frame)))
            .map_err(|payload| TransformError::Panicked(panic_message(payload.as_ref())))??;
        let sample = TimingSample::from(start.elapsed());
        Ok((wire::encode(&output), sample))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
