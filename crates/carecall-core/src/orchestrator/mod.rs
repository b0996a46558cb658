//! Queue orchestration engine.
//!
//! `Orchestrator` owns the `QueueStore`, the session tracker and the status
//! broadcaster, and is driven entirely by explicit method calls: operator
//! commands, record intake, and call outcomes. It never performs I/O. An
//! operation that frees the dispatch slot hands back a `DispatchRequest` in its
//! `Step`; the caller places the call and reports the acknowledgment or
//! failure back through `acknowledge` / `dispatch_failed`, quoting the
//! request's session id. With call pacing on, a finished call yields a
//! `GapToken` instead and the caller asks for the next dispatch once the gap
//! has passed.

pub mod machine;
pub mod request;

pub use machine::{Orchestrator, QueuePolicy};
pub use request::{DispatchRequest, GapToken, Next, OperatorCommand, Step};
