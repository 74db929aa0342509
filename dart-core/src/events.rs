//! A bounded, drop-oldest event bus (spec §5 "Event queue").
//!
//! Modeled on the teacher's `monitor::create_monitor` (a `flume` channel
//! pair exposed as a sender half kept by the producer and a receiver half
//! handed to the subscriber), generalized here to enforce a capacity: a
//! slow consumer must never stall the producer, so a full queue drops its
//! oldest entry and counts the drop rather than blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type EventSubscriber<T> = flume::Receiver<T>;

/// Producer handle for a bounded event queue.
///
/// Cheap to clone: the sender and the purge-receiver are both reference
/// counted `flume` handles.
#[derive(Clone)]
pub struct EventBus<T> {
    tx: flume::Sender<T>,
    /// A second handle onto the same queue, used only to pop the oldest
    /// entry when the queue is full. Competes with the real subscriber for
    /// messages, which is exactly the desired effect: whichever side reads
    /// first, the queue shrinks by one.
    purge_rx: flume::Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> EventBus<T> {
    /// Publish an event. Never blocks. If the queue is at capacity, the
    /// oldest queued event is discarded and `dropped_count` is incremented.
    pub fn publish(&self, event: T) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(event)) => {
                let _ = self.purge_rx.try_recv();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                // Best effort: if another thread already drained a slot,
                // this still succeeds; if not, the event is dropped too
                // (spec only requires *a* drop on overflow, not a specific one).
                let _ = self.tx.try_send(event);
            }
            Err(flume::TrySendError::Disconnected(_)) => {}
        }
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a bounded event bus with the given capacity (spec §5 recommends
/// 1024) and its single subscriber receiver.
#[must_use]
pub fn bounded<T>(capacity: usize) -> (EventBus<T>, EventSubscriber<T>) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    let purge_rx = rx.clone();
    (
        EventBus {
            tx,
            purge_rx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}
