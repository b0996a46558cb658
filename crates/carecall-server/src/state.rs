use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use carecall_core::config::Config;
use carecall_core::orchestrator::{Orchestrator, QueuePolicy};
use carecall_core::store::QueueStore;

use crate::dispatch::{self, Dispatcher};
use crate::runtime::QueueRuntime;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub runtime: QueueRuntime,
}

impl AppState {
    /// Read `.carecall/config.yaml`, restore the saved queue and pick the
    /// dispatcher the config names.
    pub fn load(root: PathBuf) -> anyhow::Result<Self> {
        let config = Config::load(&root)?;
        for warning in config.validate() {
            tracing::warn!(level = ?warning.level, "{}", warning.message);
        }
        let store = if config.queue.persist {
            QueueStore::load(&root)?
        } else {
            QueueStore::new()
        };
        let dispatcher = dispatch::from_config(&config.telephony)?;
        Ok(Self::new(root, config, store, dispatcher))
    }

    pub fn new(
        root: PathBuf,
        config: Config,
        store: QueueStore,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let engine = Orchestrator::new(store, QueuePolicy::from(&config.queue));
        let mut runtime = QueueRuntime::new(engine, dispatcher)
            .with_call_gap(Duration::from_secs(config.queue.call_gap_secs));
        // Guard: only spawn the persister inside a Tokio runtime.
        if config.queue.persist && tokio::runtime::Handle::try_current().is_ok() {
            runtime = runtime.with_persistence(root.clone());
        }
        Self {
            root,
            config: Arc::new(config),
            runtime,
        }
    }
}
