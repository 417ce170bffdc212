//! The paced producer: capture, resize, encode and dispatch one frame per
//! step, then sleep for the delay derived from worker timing feedback.

use std::time::Duration;

use tracing::{info, instrument, trace};

use super::dispatch::{DispatchStats, Dispatcher};
use super::fan_in::FeedbackReceiver;
use super::pacing::PacingState;
use super::shutdown::Shutdown;
use crate::capture::FrameCapture;
use crate::error::CaptureError;
use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceReport {
    pub frames: u64,
    pub last_delay: Duration,
    pub dispatch: DispatchStats,
}

/// The producer: samples frames at a rate matched to the worker pool
pub struct FrameSource<C> {
    capture: C,
    rows: usize,
    cols: usize,
    dispatcher: Dispatcher,
    feedback: FeedbackReceiver,
    pacing: PacingState,
    frames: u64,
}

impl<C: FrameCapture> FrameSource<C> {
    pub fn new(
        capture: C,
        (rows, cols): (usize, usize),
        dispatcher: Dispatcher,
        feedback: FeedbackReceiver,
        pacing: PacingState,
    ) -> Self {
        Self {
            capture,
            rows,
            cols,
            dispatcher,
            feedback,
            pacing,
            frames: 0,
        }
    }

    pub fn pacing(&self) -> &PacingState {
        &self.pacing
    }

    /// One pass: capture, resize, dispatch, absorb feedback. Returns how
    /// long to wait before the next pass.
    pub fn step(&mut self) -> Result<Duration, CaptureError> {
        let frame = self.capture.capture()?.resize(self.rows, self.cols)?;
        self.dispatcher.dispatch(wire::encode(&frame));
        self.frames += 1;

        let mut received = 0usize;
        for sample in self.feedback.try_iter() {
            self.pacing.record(sample);
            received += 1;
        }
        let average = self.pacing.recompute();
        let delay = self.pacing.delay(self.dispatcher.len());

        trace!(received, average, delay = ?delay, "Pacing updated");
        metrics::gauge!("framepace_pacing_delay_seconds").set(delay.as_secs_f64());
        Ok(delay)
    }

    /// Run until shutdown fires or capture fails
    #[instrument(skip_all)]
    pub fn run(mut self, shutdown: Shutdown) -> Result<SourceReport, CaptureError> {
        info!(
            rows = self.rows,
            cols = self.cols,
            workers = self.dispatcher.len(),
            "Frame source started"
        );
        let mut last_delay = Duration::ZERO;
        while !shutdown.is_triggered() {
            last_delay = self.step()?;
            if !shutdown.sleep(last_delay) {
                break;
            }
        }

        let report = SourceReport {
            frames: self.frames,
            last_delay,
            dispatch: self.dispatcher.stats(),
        };
        info!(
            frames = report.frames,
            replaced = report.dispatch.replaced,
            "Frame source stopped"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ElementType, Frame};
    use crate::pipeline::dispatch::{dispatch_channel, Inbox};
    use crate::pipeline::fan_in::{fan_in, FeedbackSender};
    use crate::pipeline::pacing::DEFAULT_PACING_WINDOW;
    use crate::pipeline::shutdown::shutdown_signal;
    use crate::wire::TimingSample;

    struct Counting(u8);

    impl FrameCapture for Counting {
        fn capture(&mut self) -> Result<Frame, CaptureError> {
            self.0 = self.0.wrapping_add(1);
            Ok(Frame::new(4, 4, ElementType::GRAY8, vec![self.0; 16])?)
        }
    }

    struct Broken;

    impl FrameCapture for Broken {
        fn capture(&mut self) -> Result<Frame, CaptureError> {
            Err(CaptureError::DeviceUnavailable("unplugged".into()))
        }
    }

    fn source<C: FrameCapture>(
        capture: C,
        workers: usize,
    ) -> (FrameSource<C>, Vec<Inbox>, FeedbackSender) {
        let (dispatcher, inboxes) = dispatch_channel(workers);
        let (feedback_tx, feedback) = fan_in();
        let source = FrameSource::new(
            capture,
            (2, 3),
            dispatcher,
            feedback,
            PacingState::default(),
        );
        (source, inboxes, feedback_tx)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn first_step_runs_unthrottled() {
        let (mut source, _inboxes, _feedback) = source(Counting(0), 4);
        assert_eq!(source.step().unwrap(), Duration::ZERO);
    }

    #[test]
    fn frames_are_resized_and_spread_over_workers() {
        let (mut source, inboxes, _feedback) = source(Counting(0), 2);
        source.step().unwrap();
        source.step().unwrap();

        let first = inboxes[0].try_recv().unwrap().decode().unwrap();
        let second = inboxes[1].try_recv().unwrap().decode().unwrap();
        assert_eq!((first.rows(), first.cols()), (2, 3));
        assert_eq!(first.row(0), &[1, 1, 1]);
        assert_eq!(second.row(1), &[2, 2, 2]);
    }

    #[test]
    fn constant_feedback_converges_to_share_of_sample() {
        let (mut source, _inboxes, feedback) = source(Counting(0), 4);
        let mut delay = Duration::ZERO;
        for _ in 0..DEFAULT_PACING_WINDOW {
            feedback.send(TimingSample::from_secs(0.4));
            delay = source.step().unwrap();
        }
        assert!(approx(source.pacing().average(), 0.4));
        assert!(approx(delay.as_secs_f64(), 0.1), "delay {delay:?}");
    }

    #[test]
    fn ramp_of_samples_averages_out() {
        let (mut source, _inboxes, feedback) = source(Counting(0), 1);
        for i in 1..=8 {
            feedback.send(TimingSample::from_secs(i as f64 / 10.0));
            source.step().unwrap();
        }
        assert!(approx(source.pacing().average(), 0.45));
    }

    #[test]
    fn burst_of_feedback_is_drained_in_one_pass() {
        let (mut source, _inboxes, feedback) = source(Counting(0), 2);
        for _ in 0..20 {
            feedback.send(TimingSample::from_secs(0.2));
        }
        let delay = source.step().unwrap();
        assert!(approx(delay.as_secs_f64(), 0.1));
        assert_eq!(source.step().unwrap(), delay);
    }

    #[test]
    fn capture_failure_stops_the_source() {
        let (_trigger, shutdown) = shutdown_signal();
        let (source, _inboxes, _feedback) = source(Broken, 1);
        assert!(matches!(
            source.run(shutdown),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn run_returns_after_shutdown() {
        let (trigger, shutdown) = shutdown_signal();
        let (source, inboxes, feedback) = source(Counting(0), 1);
        feedback.send(TimingSample::from_secs(80.0));
        let handle = std::thread::spawn(move || source.run(shutdown));

        // One frame, then a ten second pacing sleep that shutdown cuts short
        std::thread::sleep(Duration::from_millis(50));
        trigger.trigger();
        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.frames, 1);
        assert_eq!(report.last_delay, Duration::from_secs(10));
        assert!(inboxes[0].try_recv().is_some());
    }
}
