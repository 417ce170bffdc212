//! Consumer loop draining merged worker results into a sink

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use super::fan_in::ResultReceiver;
use super::shutdown::Shutdown;
use crate::capture::Frame;

/// Final destination for processed frames
pub trait FrameSink {
    /// `Break` ends the consumer loop
    fn consume(&mut self, frame: Frame) -> ControlFlow<()>;
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) -> ControlFlow<()>,
{
    fn consume(&mut self, frame: Frame) -> ControlFlow<()> {
        self(frame)
    }
}

/// Frames per second of wall time since construction
#[derive(Debug, Clone, Copy)]
pub struct Throughput {
    start: Instant,
    frames: u64,
}

impl Throughput {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frames: 0,
        }
    }

    /// Count one frame and return the running rate
    pub fn record(&mut self) -> f64 {
        self.frames += 1;
        self.fps()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for Throughput {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConsumerReport {
    pub frames: u64,
    pub decode_failures: u64,
    pub elapsed: Duration,
    pub fps: f64,
    pub stopped_by_sink: bool,
}

/// Hand every processed frame to `sink` until it asks to stop, shutdown
/// fires, or the workers are gone
#[instrument(skip_all)]
pub fn run_consumer<S: FrameSink + ?Sized>(
    results: &ResultReceiver,
    sink: &mut S,
    shutdown: &Shutdown,
) -> ConsumerReport {
    let mut throughput = Throughput::new();
    let mut report = ConsumerReport::default();

    while let Some(msg) = results.recv(shutdown) {
        let frame = match msg.decode() {
            Ok(frame) => frame,
            Err(error) => {
                report.decode_failures += 1;
                warn!(%error, "Discarding undecodable result");
                continue;
            }
        };
        let fps = throughput.record();
        metrics::gauge!("framepace_consumer_fps").set(fps);
        if sink.consume(frame).is_break() {
            report.stopped_by_sink = true;
            break;
        }
    }

    report.frames = throughput.frames();
    report.elapsed = throughput.elapsed();
    report.fps = throughput.fps();
    info!(
        frames = report.frames,
        fps = report.fps,
        stopped_by_sink = report.stopped_by_sink,
        "Consumer stopped"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ElementType;
    use crate::pipeline::fan_in::fan_in;
    use crate::pipeline::shutdown::shutdown_signal;
    use crate::wire::{self, WireMessage};

    fn result(value: u8) -> WireMessage {
        wire::encode(&Frame::new(1, 1, ElementType::GRAY8, vec![value]).unwrap())
    }

    #[test]
    fn sink_decides_when_to_stop() {
        let (_trigger, shutdown) = shutdown_signal();
        let (tx, rx) = fan_in();
        for value in 0..10 {
            tx.send(result(value));
        }

        let mut seen = Vec::new();
        let mut sink = |frame: Frame| {
            seen.push(frame.row(0)[0]);
            if seen.len() == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let report = run_consumer(&rx, &mut sink, &shutdown);

        assert!(report.stopped_by_sink);
        assert_eq!(report.frames, 3);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(rx.len(), 7);
    }

    #[test]
    fn ends_when_workers_are_gone() {
        let (_trigger, shutdown) = shutdown_signal();
        let (tx, rx) = fan_in();
        tx.send(result(1));
        tx.send(WireMessage::from(vec![0; 4]));
        tx.send(result(2));
        drop(tx);

        let mut count = 0;
        let report = run_consumer(
            &rx,
            &mut |_frame: Frame| {
                count += 1;
                ControlFlow::Continue(())
            },
            &shutdown,
        );

        assert_eq!(count, 2);
        assert_eq!(report.frames, 2);
        assert_eq!(report.decode_failures, 1);
        assert!(!report.stopped_by_sink);
    }

    #[test]
    fn ends_on_shutdown() {
        let (trigger, shutdown) = shutdown_signal();
        let (_tx, rx) = fan_in();
        trigger.trigger();
        let report = run_consumer(
            &rx,
            &mut |_frame: Frame| ControlFlow::Continue(()),
            &shutdown,
        );
        assert_eq!(report.frames, 0);
    }

    #[test]
    fn throughput_counts_frames() {
        let mut throughput = Throughput::new();
        std::thread::sleep(Duration::from_millis(10));
        throughput.record();
        throughput.record();
        assert_eq!(throughput.frames(), 2);
        assert!(throughput.fps() > 0.0);
        assert!(throughput.fps() < 1000.0);
    }
}
