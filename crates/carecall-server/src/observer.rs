use carecall_core::broadcast::{Delivery, StatusObserver};
use carecall_core::status::QueueStatus;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Bridges the engine's synchronous broadcaster to an async consumer such as
/// an SSE connection. Never blocks the engine: a full channel drops the
/// snapshot, a closed one unsubscribes.
pub struct ChannelObserver {
    tx: mpsc::Sender<QueueStatus>,
}

impl ChannelObserver {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<QueueStatus>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl StatusObserver for ChannelObserver {
    fn deliver(&self, snapshot: &QueueStatus) -> Delivery {
        match self.tx.try_send(snapshot.clone()) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Skipped,
            Err(TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }
}
