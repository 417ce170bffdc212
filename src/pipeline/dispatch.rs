//! Round-robin fan-out into single-slot, overwrite-on-full inboxes

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use flume::{Receiver, Sender, TrySendError};
use tracing::trace;

use super::shutdown::Shutdown;
use crate::wire::WireMessage;

/// Worker end of one slot
pub struct Inbox {
    rx: Receiver<WireMessage>,
}

struct Slot {
    tx: Sender<WireMessage>,
    /// Lets the dispatcher evict an unread message
    stale: Receiver<WireMessage>,
}

/// Producer end of every slot
pub struct Dispatcher {
    slots: Vec<Slot>,
    cursor: usize,
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    dispatched: AtomicU64,
    replaced: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub replaced: u64,
}

/// Where a message went and whether it evicted an unread one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub slot: usize,
    pub replaced: bool,
}

pub fn dispatch_channel(slots: usize) -> (Dispatcher, Vec<Inbox>) {
    let (slots, inboxes): (Vec<_>, Vec<_>) = (0..slots)
        .map(|_| {
            let (tx, rx) = flume::bounded(1);
            (
                Slot {
                    tx,
                    stale: rx.clone(),
                },
                Inbox { rx },
            )
        })
        .unzip();
    (
        Dispatcher {
            slots,
            cursor: 0,
            stats: CachePadded::new(Stats::default()),
        },
        inboxes,
    )
}

impl Dispatcher {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Hand `msg` to the next slot in turn, replacing anything unread
    /// there. Never blocks. Returns `None` only when there are no slots.
    pub fn dispatch(&mut self, msg: WireMessage) -> Option<Dispatched> {
        if self.slots.is_empty() {
            return None;
        }
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.slots.len();
        let slot = &self.slots[index];

        let mut replaced = false;
        if let Err(TrySendError::Full(msg)) = slot.tx.try_send(msg) {
            // The worker may take the old message first; either way the
            // slot has room afterwards since we are the only writer.
            replaced = slot.stale.try_recv().is_ok();
            let _ = slot.tx.try_send(msg);
        }

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framepace_frames_dispatched").increment(1);
        if replaced {
            self.stats.replaced.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("framepace_inbox_replaced").increment(1);
            trace!(slot = index, "Replaced unread frame");
        }
        Some(Dispatched {
            slot: index,
            replaced,
        })
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.stats.dispatched.load(Ordering::Relaxed),
            replaced: self.stats.replaced.load(Ordering::Relaxed),
        }
    }
}

impl Inbox {
    /// Wait for the pending message. `None` once the dispatcher is gone or
    /// shutdown fires.
    pub fn recv(&self, shutdown: &Shutdown) -> Option<WireMessage> {
        flume::Selector::new()
            .recv(&self.rx, |msg| msg.ok())
            .recv(shutdown.receiver(), |_| None)
            .wait()
    }

    pub fn try_recv(&self) -> Option<WireMessage> {
        self.rx.try_recv().ok()
    }
}
