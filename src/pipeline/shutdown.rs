//! Cooperative shutdown observed by every pipeline loop.
//!
//! Nothing is ever sent on the channel; firing the trigger drops the only
//! sender, which wakes every waiting receiver with a disconnect.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Fires shutdown; cheap to clone and share with signal handlers
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

/// Observes shutdown from inside a loop
#[derive(Clone)]
pub struct Shutdown {
    rx: Receiver<()>,
}

pub fn shutdown_signal() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = flume::bounded(0);
    (
        ShutdownTrigger {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        Shutdown { rx },
    )
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `duration`; returns `false` if shutdown cut it short
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_triggered();
        }
        match Instant::now().checked_add(duration) {
            Some(deadline) => matches!(
                self.rx.recv_deadline(deadline),
                Err(RecvTimeoutError::Timeout)
            ),
            // Past any representable deadline: only shutdown ends it
            None => {
                let _ = self.rx.recv();
                false
            }
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn sleep_runs_to_completion_without_trigger() {
        let (_trigger, shutdown) = shutdown_signal();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.sleep(Duration::from_millis(5)));
        assert!(shutdown.sleep(Duration::ZERO));
    }

    #[test]
    fn trigger_wakes_sleepers_early() {
        let (trigger, shutdown) = shutdown_signal();
        let sleeper = shutdown.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        trigger.trigger();

        assert!(!handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(shutdown.is_triggered());
        assert!(!shutdown.sleep(Duration::ZERO));
    }

    #[test]
    fn unbounded_sleep_waits_for_trigger() {
        let (trigger, shutdown) = shutdown_signal();
        let handle = thread::spawn(move || shutdown.sleep(Duration::MAX));
        thread::sleep(Duration::from_millis(20));
        trigger.trigger();
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn dropping_every_trigger_also_shuts_down() {
        let (trigger, shutdown) = shutdown_signal();
        let copy = trigger.clone();
        drop(trigger);
        assert!(!shutdown.is_triggered());
        drop(copy);
        assert!(shutdown.is_triggered());
    }
}
