//! Many-writer, single-reader queues: timing feedback, processed frames,
//! and worker faults all flow back through one of these.
//!
//! Feedback is drained every source iteration and stays unbounded. Results
//! and faults are read at the pace of whoever consumes them, so they use a
//! conflating queue: when full, the oldest item is evicted to make room.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use flume::{Receiver, Sender, TrySendError};
use tracing::trace;

use super::shutdown::Shutdown;
use super::worker::WorkerFault;
use crate::wire::{TimingSample, WireMessage};

pub type FeedbackSender = FanInSender<TimingSample>;
pub type FeedbackReceiver = FanInReceiver<TimingSample>;
pub type ResultSender = FanInSender<WireMessage>;
pub type ResultReceiver = FanInReceiver<WireMessage>;
pub type FaultSender = FanInSender<WorkerFault>;
pub type FaultReceiver = FanInReceiver<WorkerFault>;

pub struct FanInSender<T> {
    tx: Sender<T>,
    /// Shared by every sender clone of a conflating queue
    evict: Option<Arc<Receiver<T>>>,
    dropped: Arc<CachePadded<AtomicU64>>,
}

pub struct FanInReceiver<T> {
    rx: Receiver<T>,
    dropped: Arc<CachePadded<AtomicU64>>,
}

/// Unbounded queue; nothing is ever dropped
pub fn fan_in<T>() -> (FanInSender<T>, FanInReceiver<T>) {
    let (tx, rx) = flume::unbounded();
    let dropped = Arc::new(CachePadded::new(AtomicU64::new(0)));
    (
        FanInSender {
            tx,
            evict: None,
            dropped: Arc::clone(&dropped),
        },
        FanInReceiver { rx, dropped },
    )
}

/// Queue holding at most `capacity` items (minimum 1). A send into a full
/// queue evicts the oldest unread item instead of blocking.
pub fn conflating_fan_in<T>(capacity: usize) -> (FanInSender<T>, FanInReceiver<T>) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    let dropped = Arc::new(CachePadded::new(AtomicU64::new(0)));
    (
        FanInSender {
            tx,
            evict: Some(Arc::new(rx.clone())),
            dropped: Arc::clone(&dropped),
        },
        FanInReceiver { rx, dropped },
    )
}

impl<T> Clone for FanInSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> FanInSender<T> {
    /// Never blocks. Returns `false` once the reader is gone.
    pub fn send(&self, item: T) -> bool {
        let Some(evict) = &self.evict else {
            return self.tx.send(item).is_ok();
        };
        // The eviction handle counts as a receiver
        if self.tx.receiver_count() <= 1 {
            return false;
        }
        let mut item = item;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return true,
                Err(TrySendError::Disconnected(_)) => return false,
                Err(TrySendError::Full(back)) => {
                    if evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!("Evicted oldest queued item");
                    }
                    item = back;
                }
            }
        }
    }

    /// Items evicted so far because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> FanInReceiver<T> {
    /// Everything currently queued, without waiting
    pub fn try_iter(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }

    /// Wait for the next item. `None` once every sender is gone or
    /// shutdown fires.
    pub fn recv(&self, shutdown: &Shutdown) -> Option<T> {
        flume::Selector::new()
            .recv(&self.rx, |item| item.ok())
            .recv(shutdown.receiver(), |_| None)
            .wait()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Items evicted so far because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::pipeline::shutdown::shutdown_signal;

    #[test]
    fn drain_is_non_blocking() {
        let (tx, rx) = fan_in::<TimingSample>();
        assert_eq!(rx.try_iter().count(), 0);

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let tx = tx.clone();
                thread::spawn(move || tx.send(TimingSample::from_secs(i as f64)))
            })
            .collect();
        for writer in writers {
            assert!(writer.join().unwrap());
        }

        let mut drained: Vec<f64> = rx.try_iter().map(TimingSample::as_secs).collect();
        drained.sort_by(f64::total_cmp);
        assert_eq!(drained, vec![0.0, 1.0, 2.0, 3.0]);
        assert!(rx.is_empty());
    }

    #[test]
    fn recv_ends_when_writers_leave() {
        let (_trigger, shutdown) = shutdown_signal();
        let (tx, rx) = fan_in::<u32>();
        tx.send(5);
        drop(tx);
        assert_eq!(rx.recv(&shutdown), Some(5));
        assert_eq!(rx.recv(&shutdown), None);
    }

    #[test]
    fn recv_ends_on_shutdown() {
        let (trigger, shutdown) = shutdown_signal();
        let (_tx, rx) = fan_in::<u32>();
        let waiter = thread::spawn(move || rx.recv(&shutdown));
        thread::sleep(Duration::from_millis(20));
        trigger.trigger();
        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn send_reports_missing_reader() {
        let (tx, rx) = fan_in::<u32>();
        drop(rx);
        assert!(!tx.send(1));

        let (tx, rx) = conflating_fan_in::<u32>(2);
        drop(rx);
        assert!(!tx.send(1));
    }

    #[test]
    fn conflating_keeps_newest_items() {
        let (tx, rx) = conflating_fan_in::<u32>(3);
        for i in 0..10 {
            assert!(tx.send(i));
        }
        assert_eq!(rx.len(), 3);
        assert_eq!(rx.dropped(), 7);
        assert_eq!(tx.dropped(), 7);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![7, 8, 9]);
    }

    #[test]
    fn conflating_stays_bounded_under_many_writers() {
        let (_trigger, shutdown) = shutdown_signal();
        let (tx, rx) = conflating_fan_in::<u32>(4);
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..1000 {
                        assert!(tx.send(w * 1000 + i));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let pending = rx.len();
        assert!((1..=4).contains(&pending), "{pending} queued");
        assert_eq!(pending as u64 + rx.dropped(), 4000);
        drop(tx);
        assert_eq!(rx.try_iter().count(), pending);
        assert_eq!(rx.recv(&shutdown), None);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let (tx, rx) = conflating_fan_in::<u32>(0);
        assert!(tx.send(1));
        assert!(tx.send(2));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![2]);
    }
}
