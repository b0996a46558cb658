use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use carecall_core::orchestrator::Orchestrator;
use tokio::sync::Notify;

/// Spawn the task that writes `.carecall/queue.yaml` whenever it is notified.
///
/// Notifications that arrive while a save is running collapse into a single
/// follow-up save, so a burst of mutations costs at most two writes.
pub fn spawn(root: PathBuf, engine: Arc<Mutex<Orchestrator>>) -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    let wake = Arc::clone(&notify);
    tokio::spawn(async move {
        loop {
            wake.notified().await;
            let store = match engine.lock() {
                Ok(engine) => engine.store().clone(),
                Err(_) => {
                    tracing::error!("queue engine poisoned; persistence stopped");
                    return;
                }
            };
            let root = root.clone();
            let result = tokio::task::spawn_blocking(move || store.save(&root)).await;
            match result {
                Ok(Ok(())) => tracing::debug!("queue saved"),
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to save queue"),
                Err(e) => tracing::warn!(error = %e, "queue save task failed"),
            }
        }
    });
    notify
}
