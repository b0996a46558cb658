//! Correlates the single outstanding dispatch with its eventual outcome.
//!
//! The tracker holds at most one `ActiveSession`. It never owns records; every
//! operation takes the `QueueStore` it mutates, so all writes still go through
//! the store's transition checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CarecallError, Result};
use crate::store::QueueStore;
use crate::types::{CallOutcome, CallState, RowNumber};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    /// Unique for the lifetime of the tracker, so results from an earlier
    /// dispatch of the same row can be told apart.
    pub session_id: u64,
    pub row_number: RowNumber,
    /// Provider-side identifier, known once the dispatch is acknowledged.
    pub dispatch_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    active: Option<ActiveSession>,
    last_id: u64,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Open a session for `row_number` and mark the record `Dialing`.
    /// Returns the new session id.
    pub fn begin(&mut self, store: &mut QueueStore, row_number: RowNumber) -> Result<u64> {
        if let Some(active) = &self.active {
            return Err(CarecallError::SessionAlreadyActive(active.row_number));
        }
        store.mark(row_number, CallState::Dialing, None)?;
        self.last_id += 1;
        let session_id = self.last_id;
        self.active = Some(ActiveSession {
            session_id,
            row_number,
            dispatch_id: None,
            started_at: Utc::now(),
        });
        debug!(row_number, session_id, "session opened");
        Ok(session_id)
    }

    /// Fails with `UnknownSession` unless `session_id` is the active session
    /// and it belongs to `row_number`.
    pub fn ensure(&self, row_number: RowNumber, session_id: u64) -> Result<()> {
        match &self.active {
            Some(s) if s.row_number == row_number && s.session_id == session_id => Ok(()),
            _ => Err(CarecallError::UnknownSession(row_number)),
        }
    }

    /// The provider accepted the dispatch: `Dialing → InProgress`.
    ///
    /// Repeated acknowledgments (e.g. an `answered` event after the dispatch
    /// ack) only fill in a missing dispatch id.
    pub fn acknowledge(
        &mut self,
        store: &mut QueueStore,
        row_number: RowNumber,
        dispatch_id: Option<String>,
    ) -> Result<()> {
        let session = self.session_for(row_number)?;
        if dispatch_id.is_some() && session.dispatch_id.is_none() {
            session.dispatch_id = dispatch_id;
        }
        let dialing = store
            .get(row_number)
            .map(|r| r.call_state == CallState::Dialing)
            .unwrap_or(false);
        if dialing {
            store.mark(row_number, CallState::InProgress, None)?;
            info!(row_number, "call in progress");
        }
        Ok(())
    }

    /// Close the session with a classified outcome. An outcome for a record
    /// that was never acknowledged implies the acknowledgment.
    pub fn complete(
        &mut self,
        store: &mut QueueStore,
        row_number: RowNumber,
        outcome: CallOutcome,
    ) -> Result<()> {
        self.acknowledge(store, row_number, None)?;
        store.mark(row_number, CallState::Completed, Some(outcome))?;
        self.active = None;
        info!(row_number, %outcome, "call completed");
        Ok(())
    }

    /// Close the session as failed, keeping `reason` on the record.
    pub fn fail(
        &mut self,
        store: &mut QueueStore,
        row_number: RowNumber,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.session_for(row_number)?;
        let reason = reason.into();
        store.mark_detailed(row_number, CallState::Failed, None, Some(reason.clone()))?;
        self.active = None;
        info!(row_number, %reason, "call failed");
        Ok(())
    }

    /// Close whatever session is active as `Skipped`. Returns the skipped row.
    pub fn skip(&mut self, store: &mut QueueStore) -> Result<RowNumber> {
        let row_number = self
            .active
            .as_ref()
            .map(|s| s.row_number)
            .ok_or(CarecallError::NoActiveCall)?;
        store.mark_detailed(
            row_number,
            CallState::Skipped,
            None,
            Some("skipped by operator".to_string()),
        )?;
        self.active = None;
        info!(row_number, "call skipped");
        Ok(row_number)
    }

    fn session_for(&mut self, row_number: RowNumber) -> Result<&mut ActiveSession> {
        match self.active.as_mut() {
            Some(s) if s.row_number == row_number => Ok(s),
            _ => Err(CarecallError::UnknownSession(row_number)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
