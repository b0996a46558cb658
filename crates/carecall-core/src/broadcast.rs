//! Best-effort fan-out of `QueueStatus` snapshots.
//!
//! An observer is anything that can take a snapshot without blocking. A full
//! observer misses one snapshot and stays subscribed; a disconnected one is
//! dropped on the spot. Neither outcome reaches the mutation that triggered
//! the broadcast.

use std::sync::mpsc::{SyncSender, TrySendError};

use tracing::{debug, warn};

use crate::status::QueueStatus;

pub type ObserverId = u64;

/// Result of handing one snapshot to one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The observer is alive but could not take this snapshot right now.
    Skipped,
    /// The observer is gone and should be unsubscribed.
    Disconnected,
}

pub trait StatusObserver: Send {
    /// Must not block.
    fn deliver(&self, snapshot: &QueueStatus) -> Delivery;
}

impl<F> StatusObserver for F
where
    F: Fn(&QueueStatus) -> Delivery + Send,
{
    fn deliver(&self, snapshot: &QueueStatus) -> Delivery {
        self(snapshot)
    }
}

impl StatusObserver for SyncSender<QueueStatus> {
    fn deliver(&self, snapshot: &QueueStatus) -> Delivery {
        match self.try_send(snapshot.clone()) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Skipped,
            Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
        }
    }
}

#[derive(Default)]
pub struct StatusBroadcaster {
    observers: Vec<(ObserverId, Box<dyn StatusObserver>)>,
    next_id: ObserverId,
}

impl std::fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBroadcaster")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn StatusObserver>) -> ObserverId {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.push((id, observer));
        debug!(observer = id, "observer subscribed");
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        before != self.observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver `snapshot` to every observer. Returns how many received it.
    pub fn publish(&mut self, snapshot: &QueueStatus) -> usize {
        let mut delivered = 0;
        self.observers.retain(|(id, observer)| match observer.deliver(snapshot) {
            Delivery::Delivered => {
                delivered += 1;
                true
            }
            Delivery::Skipped => {
                debug!(observer = *id, revision = snapshot.revision, "observer lagging");
                true
            }
            Delivery::Disconnected => {
                warn!(observer = *id, "observer disconnected, unsubscribing");
                false
            }
        });
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::QueueStats;
    use crate::types::Lifecycle;
    use std::sync::mpsc::sync_channel;

    fn snapshot(revision: u64) -> QueueStatus {
        QueueStatus {
            revision,
            lifecycle: Lifecycle::Idle,
            current_record: None,
            dispatch_id: None,
            stats: QueueStats::default(),
            total_records: 0,
            cursor: 0,
            remaining: 0,
            progress_percent: 0.0,
            dynamically_added: 0,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn full_observer_keeps_subscription() {
        let mut broadcaster = StatusBroadcaster::new();
        let (tx, rx) = sync_channel(1);
        broadcaster.subscribe(Box::new(tx));

        assert_eq!(broadcaster.publish(&snapshot(1)), 1);
        assert_eq!(broadcaster.publish(&snapshot(2)), 0);
        assert_eq!(broadcaster.observer_count(), 1);
        assert_eq!(rx.try_recv().unwrap().revision, 1);
    }

    #[test]
    fn disconnected_observer_is_dropped_without_affecting_others() {
        let mut broadcaster = StatusBroadcaster::new();
        let (gone_tx, gone_rx) = sync_channel(4);
        let (live_tx, live_rx) = sync_channel(4);
        broadcaster.subscribe(Box::new(gone_tx));
        broadcaster.subscribe(Box::new(live_tx));
        drop(gone_rx);

        assert_eq!(broadcaster.publish(&snapshot(1)), 1);
        assert_eq!(broadcaster.observer_count(), 1);
        assert_eq!(live_rx.try_recv().unwrap().revision, 1);
    }

    #[test]
    fn unsubscribe_by_id() {
        let mut broadcaster = StatusBroadcaster::new();
        let id = broadcaster.subscribe(Box::new(|_: &QueueStatus| Delivery::Delivered));
        assert!(broadcaster.unsubscribe(id));
        assert!(!broadcaster.unsubscribe(id));
        assert_eq!(broadcaster.publish(&snapshot(1)), 0);
    }
}
