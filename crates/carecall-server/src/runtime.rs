//! Async shell around the synchronous `Orchestrator`.
//!
//! Every engine call goes through one mutex. Calls are short and never await
//! while holding the lock, so a plain `std::sync::Mutex` is enough. When an
//! operation hands back a `DispatchRequest`, a task places the call through
//! the `Dispatcher` and feeds the result back into the engine. A `GapToken`
//! makes the task sleep for the call gap first.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use carecall_core::broadcast::{ObserverId, StatusObserver};
use carecall_core::error::{CarecallError, Result};
use carecall_core::orchestrator::{DispatchRequest, Next, Orchestrator, Step};
use carecall_core::status::QueueStatus;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::persist;

#[derive(Clone)]
pub struct QueueRuntime {
    engine: Arc<Mutex<Orchestrator>>,
    dispatcher: Arc<dyn Dispatcher>,
    persist: Option<Arc<Notify>>,
    call_gap: Duration,
}

impl QueueRuntime {
    pub fn new(engine: Orchestrator, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            dispatcher,
            persist: None,
            call_gap: Duration::ZERO,
        }
    }

    /// Save the queue under `root` after every successful mutation. Must be
    /// called inside a Tokio runtime.
    pub fn with_persistence(mut self, root: PathBuf) -> Self {
        self.persist = Some(persist::spawn(root, Arc::clone(&self.engine)));
        self
    }

    /// How long to wait when the engine asks for a gap between calls.
    pub fn with_call_gap(mut self, gap: Duration) -> Self {
        self.call_gap = gap;
        self
    }

    pub fn dispatcher_name(&self) -> &'static str {
        self.dispatcher.name()
    }

    /// Run `f` against the engine without mutating it.
    pub fn read<R>(&self, f: impl FnOnce(&Orchestrator) -> R) -> R {
        f(&self.lock())
    }

    /// Register `observer` and return the snapshot it starts from. Both happen
    /// under one lock so no snapshot falls between them.
    pub fn subscribe(&self, observer: Box<dyn StatusObserver>) -> (ObserverId, QueueStatus) {
        let mut engine = self.lock();
        let id = engine.subscribe(observer);
        (id, engine.status())
    }

    /// Run a mutation that never unlocks a dispatch.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut Orchestrator) -> Result<T>) -> Result<T> {
        let value = f(&mut self.lock())?;
        self.changed();
        Ok(value)
    }

    /// Run an engine operation and start whatever follow-up it returns.
    pub fn execute<T>(&self, f: impl FnOnce(&mut Orchestrator) -> Result<Step<T>>) -> Result<T> {
        let (value, next) = self.step(f)?;
        if next != Next::Nothing {
            tokio::spawn(self.clone().drive(next));
        }
        Ok(value)
    }

    fn step<T>(&self, f: impl FnOnce(&mut Orchestrator) -> Result<Step<T>>) -> Result<(T, Next)> {
        let step = f(&mut self.lock())?;
        self.changed();
        Ok(step.into_parts())
    }

    /// A poisoned lock means an invariant check panicked mid-operation; the
    /// engine state can no longer be trusted.
    fn lock(&self) -> MutexGuard<'_, Orchestrator> {
        self.engine
            .lock()
            .expect("queue engine poisoned by an invariant violation")
    }

    fn changed(&self) {
        if let Some(notify) = &self.persist {
            notify.notify_one();
        }
    }

    /// Work through follow-ups until the engine has nothing left for us. A
    /// rejected dispatch fails its record, which may unlock the next one.
    async fn drive(self, mut next: Next) {
        loop {
            next = match next {
                Next::Nothing => break,
                Next::Dispatch(request) => self.place(request).await,
                Next::AfterGap(token) => {
                    debug!(gap_secs = self.call_gap.as_secs(), "waiting between calls");
                    tokio::time::sleep(self.call_gap).await;
                    match self.step(|engine| engine.dispatch_after_gap(token)) {
                        Ok(((), next)) => next,
                        Err(e) => {
                            warn!(error = %e, "could not dispatch after call gap");
                            Next::Nothing
                        }
                    }
                }
            };
        }
    }

    async fn place(&self, request: DispatchRequest) -> Next {
        let DispatchRequest {
            session_id,
            row_number,
            attempt,
            record,
        } = request;
        info!(
            row_number,
            session_id,
            attempt,
            dispatcher = self.dispatcher.name(),
            "placing call"
        );
        match self.dispatcher.dispatch_call(&record).await {
            Ok(dispatch_id) => {
                match self.mutate(|engine| engine.acknowledge(row_number, session_id, dispatch_id)) {
                    Ok(()) => {}
                    // Outcome, skip or a newer run got there first.
                    Err(CarecallError::UnknownSession(_)) => {
                        debug!(row_number, session_id, "acknowledgment after session closed");
                    }
                    Err(e) => warn!(row_number, error = %e, "acknowledgment rejected"),
                }
                Next::Nothing
            }
            Err(e) => {
                let reason = format!("{e:#}");
                match self.step(|engine| engine.dispatch_failed(row_number, session_id, reason)) {
                    Ok(((), next)) => next,
                    Err(CarecallError::UnknownSession(_)) => {
                        debug!(row_number, session_id, "dispatch failure after session closed");
                        Next::Nothing
                    }
                    Err(e) => {
                        warn!(row_number, error = %e, "could not record dispatch failure");
                        Next::Nothing
                    }
                }
            }
        }
    }
}
