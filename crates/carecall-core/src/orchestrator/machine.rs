use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::broadcast::{ObserverId, StatusBroadcaster, StatusObserver};
use crate::config::QueueConfig;
use crate::error::{CarecallError, Result};
use crate::ingest::{self, UploadReport};
use crate::record::{PatientRecord, RecordDraft};
use crate::session::{ActiveSession, SessionTracker};
use crate::stats::QueueStats;
use crate::status::{self, QueueStatus};
use crate::store::QueueStore;
use crate::types::{CallOutcome, Lifecycle, ProviderEvent, RowNumber};

use super::request::{DispatchRequest, GapToken, Next, OperatorCommand, Step};

// ---------------------------------------------------------------------------
// QueuePolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// A record appended to a `completed` queue puts it back in `running`.
    /// When off, `start` picks the new records up instead.
    pub auto_resume_on_growth: bool,
    /// Wait out a gap after each finished call before dispatching the next.
    /// The engine only hands out `GapToken`s; the caller owns the clock.
    pub pace_calls: bool,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            auto_resume_on_growth: true,
            pace_calls: false,
        }
    }
}

impl From<&QueueConfig> for QueuePolicy {
    fn from(cfg: &QueueConfig) -> Self {
        Self {
            auto_resume_on_growth: cfg.auto_resume_on_growth,
            pace_calls: cfg.call_gap_secs > 0,
        }
    }
}

/// How the active call ended.
enum Finish {
    Completed(CallOutcome),
    Failed(String),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Queue lifecycle, dispatch loop and outcome handling over one `QueueStore`.
///
/// Every mutating operation publishes exactly one snapshot to the
/// broadcaster when it succeeds and none when it fails.
#[derive(Debug)]
pub struct Orchestrator {
    store: QueueStore,
    sessions: SessionTracker,
    lifecycle: Lifecycle,
    policy: QueuePolicy,
    broadcaster: StatusBroadcaster,
    revision: u64,
    dynamically_added: usize,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    /// Outstanding call gap; no dispatch happens while it is set.
    gap: Option<GapToken>,
    last_gap: u64,
}

impl Orchestrator {
    /// Take ownership of `store` in `idle`. Records a previous process left
    /// mid-call are failed first, since nothing tracks their sessions.
    pub fn new(mut store: QueueStore, policy: QueuePolicy) -> Self {
        let recovered = store.recover_interrupted();
        if recovered > 0 {
            warn!(recovered, "failed calls interrupted by a restart");
        }
        Self {
            store,
            sessions: SessionTracker::new(),
            lifecycle: Lifecycle::Idle,
            policy,
            broadcaster: StatusBroadcaster::new(),
            revision: 0,
            dynamically_added: 0,
            started_at: None,
            completed_at: None,
            gap: None,
            last_gap: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.sessions.active()
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn status(&self) -> QueueStatus {
        let stats = QueueStats::aggregate(self.store.records());
        let session = self.sessions.active();
        let total = self.store.len();
        QueueStatus {
            revision: self.revision,
            lifecycle: self.lifecycle,
            current_record: session.and_then(|s| self.store.get(s.row_number).cloned()),
            dispatch_id: session.and_then(|s| s.dispatch_id.clone()),
            total_records: total,
            cursor: self.store.cursor(),
            remaining: stats.pending,
            progress_percent: status::progress_percent(total, stats.pending),
            stats,
            dynamically_added: self.dynamically_added,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn StatusObserver>) -> ObserverId {
        self.broadcaster.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.broadcaster.observer_count()
    }

    // -----------------------------------------------------------------------
    // Operator commands
    // -----------------------------------------------------------------------

    pub fn apply(&mut self, command: OperatorCommand) -> Result<Step<()>> {
        match command {
            OperatorCommand::Start => self.start(),
            OperatorCommand::Pause => self.pause().map(Step::new),
            OperatorCommand::Resume => self.resume(),
            OperatorCommand::Stop => self.stop().map(Step::new),
            OperatorCommand::Reset => self.reset().map(Step::new),
            OperatorCommand::SkipCurrent => self.skip_current().map(|step| step.map(|_| ())),
        }
    }

    /// `idle → running`, scanning from the head of the queue.
    ///
    /// Without auto-resume a `completed` queue does not pick up new records
    /// on its own; `start` from `completed` then continues from the current
    /// cursor, so records already called are not dialed again.
    pub fn start(&mut self) -> Result<Step<()>> {
        let continuing =
            self.lifecycle == Lifecycle::Completed && !self.policy.auto_resume_on_growth;
        if continuing {
            info!(cursor = self.store.cursor(), "queue restarted after completion");
        } else {
            self.require(&[Lifecycle::Idle], "start")?;
            self.store.rewind();
            self.started_at = Some(Utc::now());
            info!(records = self.store.len(), "queue started");
        }
        self.lifecycle = Lifecycle::Running;
        self.completed_at = None;
        self.gap = None;
        let dispatch = self.tick();
        self.publish();
        Ok(Step::with_dispatch((), dispatch))
    }

    /// `running → paused`. An in-flight call keeps going.
    pub fn pause(&mut self) -> Result<()> {
        self.require(&[Lifecycle::Running], "pause")?;
        self.lifecycle = Lifecycle::Paused;
        info!("queue paused");
        self.publish();
        Ok(())
    }

    /// `paused → running`, continuing from the current cursor.
    pub fn resume(&mut self) -> Result<Step<()>> {
        self.require(&[Lifecycle::Paused], "resume")?;
        self.lifecycle = Lifecycle::Running;
        info!(cursor = self.store.cursor(), "queue resumed");
        let dispatch = self.tick();
        self.publish();
        Ok(Step::with_dispatch((), dispatch))
    }

    /// `running | paused → stopped`. An in-flight call keeps going but its
    /// outcome no longer moves the cursor.
    pub fn stop(&mut self) -> Result<()> {
        self.require(&[Lifecycle::Running, Lifecycle::Paused], "stop")?;
        self.lifecycle = Lifecycle::Stopped;
        self.gap = None;
        info!("queue stopped");
        self.publish();
        Ok(())
    }

    /// Every record back to `pending` and the queue back to `idle`.
    pub fn reset(&mut self) -> Result<()> {
        if !self.lifecycle.accepts_reset() {
            return Err(CarecallError::InvalidStateTransition {
                from: self.lifecycle,
                command: "reset",
            });
        }
        if let Some(active) = self.sessions.active() {
            return Err(CarecallError::CallInFlight(active.row_number));
        }
        self.store.reset_all();
        self.lifecycle = Lifecycle::Idle;
        self.gap = None;
        self.dynamically_added = 0;
        self.started_at = None;
        self.completed_at = None;
        info!(records = self.store.len(), "queue reset");
        self.publish();
        Ok(())
    }

    /// Abandon the active call as `skipped`. Works in any lifecycle since it
    /// targets the call rather than the loop. Returns the skipped row.
    ///
    /// The next record is dispatched right away, without a call gap.
    pub fn skip_current(&mut self) -> Result<Step<RowNumber>> {
        let position = self
            .sessions
            .active()
            .and_then(|s| self.store.position(s.row_number));
        let row_number = self.sessions.skip(&mut self.store)?;
        let next = position.map_or(Next::Nothing, |pos| self.after_call(pos, false));
        self.publish();
        Ok(Step::then(row_number, next))
    }

    // -----------------------------------------------------------------------
    // Record intake
    // -----------------------------------------------------------------------

    /// Admit one normalized row. A row already in the store is a no-op and
    /// yields `false`; a row that fails validation is an error.
    pub fn on_record_discovered(&mut self, draft: RecordDraft) -> Result<Step<bool>> {
        let row_number = draft.row_number;
        let draft = ingest::validate_draft(draft).map_err(|reason| CarecallError::InvalidRecord {
            row_number,
            reason: reason.describe().to_string(),
        })?;
        if self.store.contains(row_number) {
            debug!(row_number, "duplicate row ignored");
            return Ok(Step::new(false));
        }
        self.resume_on_growth();
        self.admit(PatientRecord::from_draft(draft))?;
        let dispatch = self.tick();
        self.publish();
        Ok(Step::with_dispatch(true, dispatch))
    }

    /// Validate and admit a batch. Rows are accepted or rejected one by one;
    /// the report lists both.
    pub fn upload(&mut self, drafts: Vec<RecordDraft>) -> Result<Step<UploadReport>> {
        let (records, report) = ingest::check_batch(&self.store, drafts);
        if records.is_empty() {
            info!(rejected = report.rejected_count(), "upload admitted no records");
            return Ok(Step::new(report));
        }
        self.resume_on_growth();
        for record in records {
            self.admit(record)?;
        }
        info!(
            admitted = report.admitted_count(),
            rejected = report.rejected_count(),
            "upload processed"
        );
        let dispatch = self.tick();
        self.publish();
        Ok(Step::with_dispatch(report, dispatch))
    }

    fn admit(&mut self, mut record: PatientRecord) -> Result<()> {
        let during_run = matches!(self.lifecycle, Lifecycle::Running | Lifecycle::Paused);
        record.added_while_active = during_run;
        let row_number = record.row_number;
        self.store.append(record)?;
        if during_run {
            self.dynamically_added += 1;
        }
        debug!(row_number, lifecycle = %self.lifecycle, "record appended");
        Ok(())
    }

    fn resume_on_growth(&mut self) {
        if self.lifecycle == Lifecycle::Completed && self.policy.auto_resume_on_growth {
            self.lifecycle = Lifecycle::Running;
            self.completed_at = None;
            info!("queue resumed on new records");
        }
    }

    // -----------------------------------------------------------------------
    // Call outcomes
    // -----------------------------------------------------------------------

    /// The telephony collaborator accepted dispatch `session_id` for
    /// `row_number`. Fails with `UnknownSession` once that session is gone,
    /// even if the same row has been dispatched again since.
    pub fn acknowledge(
        &mut self,
        row_number: RowNumber,
        session_id: u64,
        dispatch_id: impl Into<String>,
    ) -> Result<()> {
        self.sessions.ensure(row_number, session_id)?;
        self.sessions
            .acknowledge(&mut self.store, row_number, Some(dispatch_id.into()))?;
        self.publish();
        Ok(())
    }

    /// The collaborator refused dispatch `session_id` for `row_number`.
    pub fn dispatch_failed(
        &mut self,
        row_number: RowNumber,
        session_id: u64,
        reason: impl Into<String>,
    ) -> Result<Step<()>> {
        self.sessions.ensure(row_number, session_id)?;
        let reason = reason.into();
        warn!(row_number, session_id, %reason, "dispatch rejected");
        self.finish_call(row_number, Finish::Failed(reason))
    }

    /// Apply a status event reported for the active call.
    pub fn report(&mut self, row_number: RowNumber, event: ProviderEvent) -> Result<Step<()>> {
        match event {
            ProviderEvent::Answered => {
                self.sessions.acknowledge(&mut self.store, row_number, None)?;
                self.publish();
                Ok(Step::new(()))
            }
            ProviderEvent::NoAnswer => {
                self.finish_call(row_number, Finish::Failed("no answer".to_string()))
            }
            ProviderEvent::Busy => self.finish_call(row_number, Finish::Failed("busy".to_string())),
            ProviderEvent::Failed { reason } => self.finish_call(row_number, Finish::Failed(reason)),
            ProviderEvent::Completed { outcome } => {
                self.finish_call(row_number, Finish::Completed(outcome))
            }
        }
    }

    fn finish_call(&mut self, row_number: RowNumber, finish: Finish) -> Result<Step<()>> {
        let position = self
            .store
            .position(row_number)
            .ok_or(CarecallError::UnknownSession(row_number))?;
        match finish {
            Finish::Completed(outcome) => self.sessions.complete(&mut self.store, row_number, outcome)?,
            Finish::Failed(reason) => self.sessions.fail(&mut self.store, row_number, reason)?,
        }
        let next = self.after_call(position, true);
        self.publish();
        Ok(Step::then((), next))
    }

    /// The call gap issued as `token` has passed: dispatch the next record if
    /// the queue is still running. Tokens from an earlier run, or a gap that
    /// was already used, change nothing.
    pub fn dispatch_after_gap(&mut self, token: GapToken) -> Result<Step<()>> {
        if self.gap != Some(token) {
            debug!(?token, "stale call gap ignored");
            return Ok(Step::new(()));
        }
        self.gap = None;
        let dispatch = self.tick();
        self.publish();
        Ok(Step::with_dispatch((), dispatch))
    }

    /// Bookkeeping once the record at `position` reached a terminal state.
    fn after_call(&mut self, position: usize, paced: bool) -> Next {
        match self.lifecycle {
            Lifecycle::Running => {
                self.store.advance_cursor(position + 1);
                let more = self.store.next_eligible(self.store.cursor()).is_some();
                if paced && more && self.policy.pace_calls {
                    self.last_gap += 1;
                    let token = GapToken(self.last_gap);
                    self.gap = Some(token);
                    debug!(?token, "waiting out call gap");
                    return Next::AfterGap(token);
                }
                self.tick().map_or(Next::Nothing, Next::Dispatch)
            }
            Lifecycle::Paused => {
                self.store.advance_cursor(position + 1);
                Next::Nothing
            }
            Lifecycle::Stopped | Lifecycle::Idle | Lifecycle::Completed => Next::Nothing,
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch loop
    // -----------------------------------------------------------------------

    /// One turn of the loop: open a session for the next pending record, or
    /// complete the queue when nothing is left and nothing is in flight.
    fn tick(&mut self) -> Option<DispatchRequest> {
        if self.lifecycle != Lifecycle::Running || self.sessions.is_active() || self.gap.is_some() {
            return None;
        }
        let row_number = match self.store.next_eligible(self.store.cursor()) {
            Some((_, record)) => record.row_number,
            None => {
                self.lifecycle = Lifecycle::Completed;
                self.completed_at = Some(Utc::now());
                info!(records = self.store.len(), "queue completed");
                return None;
            }
        };
        let session_id = match self.sessions.begin(&mut self.store, row_number) {
            Ok(id) => id,
            Err(e) => panic!("dispatch invariant violated for row {row_number}: {e}"),
        };
        let record = self.store.get(row_number)?.clone();
        info!(row_number, session_id, attempt = record.attempts, "dispatching call");
        Some(DispatchRequest {
            session_id,
            row_number,
            attempt: record.attempts,
            record,
        })
    }

    fn require(&self, allowed: &[Lifecycle], command: &'static str) -> Result<()> {
        if allowed.contains(&self.lifecycle) {
            Ok(())
        } else {
            Err(CarecallError::InvalidStateTransition {
                from: self.lifecycle,
                command,
            })
        }
    }

    fn publish(&mut self) {
        self.check_invariants();
        self.revision += 1;
        let snapshot = self.status();
        let delivered = self.broadcaster.publish(&snapshot);
        debug!(
            revision = snapshot.revision,
            lifecycle = %snapshot.lifecycle,
            delivered,
            "status published"
        );
    }

    /// The session tracker and the store must agree on what is in flight.
    fn check_invariants(&self) {
        let in_flight: Vec<RowNumber> = self.store.active().map(|r| r.row_number).collect();
        match self.sessions.active() {
            Some(session) => assert!(
                in_flight == [session.row_number],
                "session for row {} but in-flight records are {:?}",
                session.row_number,
                in_flight
            ),
            None => assert!(
                in_flight.is_empty(),
                "records {in_flight:?} in flight without a session"
            ),
        }
        assert!(
            self.store.cursor() <= self.store.len(),
            "cursor beyond the store"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallState;
    use std::sync::mpsc::{sync_channel, Receiver};

    fn store_with(rows: &[RowNumber]) -> QueueStore {
        let mut store = QueueStore::new();
        for &row in rows {
            store
                .append(PatientRecord::new(row, format!("Patient {row}"), "+15550100"))
                .unwrap();
        }
        store
    }

    fn engine(rows: &[RowNumber]) -> Orchestrator {
        Orchestrator::new(store_with(rows), QueuePolicy::default())
    }

    fn draft(row: RowNumber) -> RecordDraft {
        RecordDraft::new(row, format!("Patient {row}"), "+15550100")
    }

    fn watch(orch: &mut Orchestrator) -> Receiver<QueueStatus> {
        let (tx, rx) = sync_channel(64);
        orch.subscribe(Box::new(tx));
        rx
    }

    fn booked() -> ProviderEvent {
        ProviderEvent::Completed {
            outcome: CallOutcome::AppointmentBooked,
        }
    }

    fn dispatched_row(step: &Step<()>) -> Option<RowNumber> {
        step.dispatch.as_ref().map(|d| d.row_number)
    }

    fn in_flight(orch: &Orchestrator) -> usize {
        orch.store().active().count()
    }

    fn without_revision(mut status: QueueStatus) -> QueueStatus {
        status.revision = 0;
        status
    }

    #[test]
    fn start_dispatches_first_pending_record() {
        let mut orch = engine(&[2, 3, 4]);
        let step = orch.start().unwrap();
        let dispatch = step.dispatch.unwrap();
        assert_eq!(dispatch.row_number, 2);
        assert_eq!(dispatch.attempt, 1);
        assert_eq!(dispatch.record.call_state, CallState::Dialing);

        let status = orch.status();
        assert_eq!(status.lifecycle, Lifecycle::Running);
        assert_eq!(status.current_record.unwrap().row_number, 2);
        assert!(status.started_at.is_some());
    }

    #[test]
    fn start_on_empty_queue_completes() {
        let mut orch = engine(&[]);
        let step = orch.start().unwrap();
        assert!(step.dispatch.is_none());
        assert_eq!(orch.lifecycle(), Lifecycle::Completed);
        assert!(orch.status().completed_at.is_some());
    }

    #[test]
    fn commands_outside_their_states_are_rejected() {
        let mut orch = engine(&[2]);
        assert!(matches!(
            orch.pause(),
            Err(CarecallError::InvalidStateTransition { from: Lifecycle::Idle, command: "pause" })
        ));
        assert!(orch.resume().is_err());
        assert!(orch.stop().is_err());
        let _ = orch.start().unwrap();
        assert!(matches!(
            orch.start(),
            Err(CarecallError::InvalidStateTransition { from: Lifecycle::Running, command: "start" })
        ));
        assert!(matches!(
            orch.reset(),
            Err(CarecallError::InvalidStateTransition { from: Lifecycle::Running, command: "reset" })
        ));
    }

    #[test]
    fn outcomes_drive_the_queue_in_insertion_order() {
        let mut orch = engine(&[5, 2, 9]);
        let mut order = Vec::new();
        let mut next = orch.start().unwrap().dispatch;
        while let Some(request) = next {
            order.push(request.row_number);
            orch.acknowledge(
                request.row_number,
                request.session_id,
                format!("CA-{}", request.row_number),
            )
            .unwrap();
            next = orch.report(request.row_number, booked()).unwrap().dispatch;
        }
        assert_eq!(order, vec![5, 2, 9]);
        let status = orch.status();
        assert_eq!(status.lifecycle, Lifecycle::Completed);
        assert_eq!(status.stats.total_calls, 3);
        assert_eq!(status.stats.appointments_booked, 3);
        assert_eq!(status.cursor, 3);
        assert_eq!(status.progress_percent, 100.0);
    }

    #[test]
    fn single_flight_holds_while_records_arrive() {
        let mut orch = engine(&[2]);
        let mut order = Vec::new();
        let mut next = orch.start().unwrap().dispatch;
        let mut extra = 10;

        while let Some(request) = next {
            assert_eq!(in_flight(&orch), 1);
            order.push(request.row_number);
            // Two rows arrive during every call.
            for _ in 0..2 {
                if extra < 16 {
                    let step = orch.on_record_discovered(draft(extra)).unwrap();
                    assert!(step.value);
                    assert!(step.dispatch.is_none());
                    assert_eq!(in_flight(&orch), 1);
                    extra += 1;
                }
            }
            next = orch.report(request.row_number, booked()).unwrap().dispatch;
            assert!(in_flight(&orch) <= 1);
        }

        assert_eq!(order, vec![2, 10, 11, 12, 13, 14, 15]);
        assert_eq!(orch.status().dynamically_added, 6);
        assert!(orch.store().get(10).unwrap().added_while_active);
    }

    #[test]
    fn pause_during_second_call_records_its_outcome() {
        let mut orch = engine(&[1, 2]);
        let r1 = orch.start().unwrap().dispatch.unwrap();
        let step = orch.report(r1.row_number, booked()).unwrap();
        assert_eq!(dispatched_row(&step), Some(2));
        assert_eq!(orch.status().stats.total_calls, 1);

        orch.pause().unwrap();
        let step = orch
            .report(
                2,
                ProviderEvent::Completed {
                    outcome: CallOutcome::RescheduleRequested,
                },
            )
            .unwrap();
        assert!(step.dispatch.is_none());

        let status = orch.status();
        assert_eq!(status.lifecycle, Lifecycle::Paused);
        assert_eq!(status.stats.total_calls, 2);
        assert_eq!(status.stats.reschedules, 1);
        assert_eq!(status.cursor, 2);
        assert!(status.current_record.is_none());

        let step = orch.resume().unwrap();
        assert!(step.dispatch.is_none());
        assert_eq!(orch.lifecycle(), Lifecycle::Completed);
    }

    #[test]
    fn stop_lets_the_call_finish_without_moving_on() {
        let mut orch = engine(&[2, 3]);
        let _ = orch.start().unwrap();
        orch.stop().unwrap();

        let step = orch.report(2, booked()).unwrap();
        assert!(step.dispatch.is_none());
        let status = orch.status();
        assert_eq!(status.lifecycle, Lifecycle::Stopped);
        assert_eq!(status.cursor, 0);
        assert_eq!(status.stats.total_calls, 1);
        assert_eq!(orch.store().get(3).unwrap().call_state, CallState::Pending);
    }

    #[test]
    fn skip_without_active_call_changes_nothing() {
        let mut orch = engine(&[2]);
        let rx = watch(&mut orch);
        let before = orch.status();
        assert!(matches!(orch.skip_current(), Err(CarecallError::NoActiveCall)));
        assert_eq!(orch.status(), before);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn skip_marks_skipped_and_dispatches_next() {
        let mut orch = engine(&[2, 3]);
        let _ = orch.start().unwrap();
        let step = orch.skip_current().unwrap();
        assert_eq!(step.value, 2);
        assert_eq!(step.dispatch.unwrap().row_number, 3);

        let skipped = orch.store().get(2).unwrap();
        assert_eq!(skipped.call_state, CallState::Skipped);
        assert_eq!(skipped.outcome, None);
        assert_eq!(orch.status().stats.skipped, 1);
        assert_eq!(orch.status().stats.total_calls, 0);
    }

    #[test]
    fn skip_while_paused_does_not_dispatch() {
        let mut orch = engine(&[2, 3]);
        let _ = orch.start().unwrap();
        orch.pause().unwrap();
        let step = orch.skip_current().unwrap();
        assert!(step.dispatch.is_none());
        assert_eq!(orch.status().cursor, 1);

        let step = orch.resume().unwrap();
        assert_eq!(step.dispatch.unwrap().row_number, 3);
    }

    #[test]
    fn late_outcome_after_skip_is_unknown_session() {
        let mut orch = engine(&[2, 3]);
        let _ = orch.start().unwrap();
        let _ = orch.skip_current().unwrap();
        assert!(matches!(
            orch.report(2, booked()),
            Err(CarecallError::UnknownSession(2))
        ));
        assert_eq!(orch.store().get(2).unwrap().call_state, CallState::Skipped);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut orch = engine(&[2, 3]);
        let mut next = orch.start().unwrap().dispatch;
        while let Some(request) = next {
            next = orch.report(request.row_number, booked()).unwrap().dispatch;
        }
        assert_eq!(orch.lifecycle(), Lifecycle::Completed);

        orch.reset().unwrap();
        let once = orch.status();
        orch.reset().unwrap();
        let twice = orch.status();
        assert_eq!(twice.revision, once.revision + 1);
        assert_eq!(without_revision(once.clone()), without_revision(twice));

        assert_eq!(once.lifecycle, Lifecycle::Idle);
        assert_eq!(once.stats.pending, 2);
        assert_eq!(once.stats.total_calls, 0);
        assert!(orch.store().records().iter().all(|r| r.outcome.is_none()));
    }

    #[test]
    fn reset_with_call_in_flight_is_refused() {
        let mut orch = engine(&[2]);
        let _ = orch.start().unwrap();
        orch.stop().unwrap();
        assert!(matches!(orch.reset(), Err(CarecallError::CallInFlight(2))));

        let _ = orch.report(2, ProviderEvent::Busy).unwrap();
        orch.reset().unwrap();
        assert_eq!(orch.lifecycle(), Lifecycle::Idle);
    }

    #[test]
    fn growth_after_completion_resumes_the_queue() {
        let mut orch = engine(&[2]);
        let r = orch.start().unwrap().dispatch.unwrap();
        let _ = orch.report(r.row_number, booked()).unwrap();
        assert_eq!(orch.lifecycle(), Lifecycle::Completed);

        let step = orch.on_record_discovered(draft(3)).unwrap();
        assert_eq!(step.dispatch.unwrap().row_number, 3);
        let status = orch.status();
        assert_eq!(status.lifecycle, Lifecycle::Running);
        assert!(status.completed_at.is_none());
        assert_eq!(status.dynamically_added, 1);
    }

    #[test]
    fn completion_is_sticky_without_auto_resume() {
        let policy = QueuePolicy {
            auto_resume_on_growth: false,
            ..QueuePolicy::default()
        };
        let mut orch = Orchestrator::new(store_with(&[2]), policy);
        let r = orch.start().unwrap().dispatch.unwrap();
        let _ = orch.report(r.row_number, booked()).unwrap();

        let step = orch.on_record_discovered(draft(3)).unwrap();
        assert!(step.value);
        assert!(step.dispatch.is_none());
        assert_eq!(orch.lifecycle(), Lifecycle::Completed);
        assert_eq!(orch.status().remaining, 1);
        assert_eq!(orch.status().dynamically_added, 0);
    }

    #[test]
    fn start_after_sticky_completion_calls_only_new_records() {
        let policy = QueuePolicy {
            auto_resume_on_growth: false,
            ..QueuePolicy::default()
        };
        let mut orch = Orchestrator::new(store_with(&[2]), policy);
        let r = orch.start().unwrap().dispatch.unwrap();
        let _ = orch.report(r.row_number, booked()).unwrap();
        let started_at = orch.status().started_at;
        let _ = orch.on_record_discovered(draft(3)).unwrap();

        assert!(matches!(
            orch.resume(),
            Err(CarecallError::InvalidStateTransition { from: Lifecycle::Completed, .. })
        ));
        let step = orch.start().unwrap();
        assert_eq!(dispatched_row(&step), Some(3));
        assert_eq!(orch.lifecycle(), Lifecycle::Running);
        assert_eq!(orch.status().started_at, started_at);
        assert_eq!(
            orch.store().get(2).unwrap().outcome,
            Some(CallOutcome::AppointmentBooked)
        );
        assert_eq!(orch.store().get(2).unwrap().attempts, 1);
    }

    #[test]
    fn start_from_completed_needs_sticky_policy() {
        let mut orch = engine(&[]);
        let _ = orch.start().unwrap();
        assert!(matches!(
            orch.start(),
            Err(CarecallError::InvalidStateTransition { from: Lifecycle::Completed, command: "start" })
        ));
    }

    #[test]
    fn results_for_an_earlier_dispatch_of_the_same_row_are_ignored() {
        let mut orch = engine(&[2, 3]);
        let first = orch.start().unwrap().dispatch.unwrap();
        orch.stop().unwrap();
        let _ = orch.skip_current().unwrap();
        orch.reset().unwrap();
        let second = orch.start().unwrap().dispatch.unwrap();
        assert_eq!(second.row_number, 2);
        assert_ne!(second.session_id, first.session_id);
        orch.acknowledge(2, second.session_id, "CA-new").unwrap();

        assert!(matches!(
            orch.dispatch_failed(2, first.session_id, "webhook timed out"),
            Err(CarecallError::UnknownSession(2))
        ));
        assert!(matches!(
            orch.acknowledge(2, first.session_id, "CA-old"),
            Err(CarecallError::UnknownSession(2))
        ));
        let status = orch.status();
        assert_eq!(status.current_record.unwrap().call_state, CallState::InProgress);
        assert_eq!(status.dispatch_id.as_deref(), Some("CA-new"));
        assert_eq!(in_flight(&orch), 1);
        assert_eq!(orch.store().get(3).unwrap().call_state, CallState::Pending);
    }

    fn paced(rows: &[RowNumber]) -> Orchestrator {
        let policy = QueuePolicy {
            pace_calls: true,
            ..QueuePolicy::default()
        };
        Orchestrator::new(store_with(rows), policy)
    }

    #[test]
    fn paced_queue_waits_for_gap_between_calls() {
        let mut orch = paced(&[2, 3]);
        let step = orch.start().unwrap();
        assert_eq!(dispatched_row(&step), Some(2));
        assert!(step.gap.is_none());

        let step = orch.report(2, booked()).unwrap();
        assert!(step.dispatch.is_none());
        let token = step.gap.unwrap();
        assert!(orch.session().is_none());
        assert_eq!(orch.lifecycle(), Lifecycle::Running);

        // New rows wait for the gap too.
        let step = orch.on_record_discovered(draft(4)).unwrap();
        assert!(step.dispatch.is_none());

        let step = orch.dispatch_after_gap(token).unwrap();
        assert_eq!(dispatched_row(&step), Some(3));
        // A token is good for one dispatch.
        let step = orch.dispatch_after_gap(token).unwrap();
        assert!(step.dispatch.is_none());
        assert_eq!(in_flight(&orch), 1);
    }

    #[test]
    fn last_call_completes_without_gap() {
        let mut orch = paced(&[2]);
        let _ = orch.start().unwrap();
        let step = orch.report(2, booked()).unwrap();
        assert!(step.gap.is_none());
        assert_eq!(orch.lifecycle(), Lifecycle::Completed);
    }

    #[test]
    fn pause_during_gap_holds_dispatch_until_resume() {
        let mut orch = paced(&[2, 3]);
        let _ = orch.start().unwrap();
        let token = orch.report(2, booked()).unwrap().gap.unwrap();
        orch.pause().unwrap();

        let step = orch.dispatch_after_gap(token).unwrap();
        assert!(step.dispatch.is_none());
        assert_eq!(orch.lifecycle(), Lifecycle::Paused);

        let step = orch.resume().unwrap();
        assert_eq!(dispatched_row(&step), Some(3));
    }

    #[test]
    fn gap_from_an_earlier_run_is_stale() {
        let mut orch = paced(&[2, 3]);
        let _ = orch.start().unwrap();
        let token = orch.report(2, booked()).unwrap().gap.unwrap();
        orch.stop().unwrap();
        orch.reset().unwrap();
        let first = orch.start().unwrap().dispatch.unwrap();
        assert_eq!(first.row_number, 2);

        let step = orch.dispatch_after_gap(token).unwrap();
        assert!(step.dispatch.is_none());
        assert_eq!(in_flight(&orch), 1);
    }

    #[test]
    fn skip_dispatches_without_gap() {
        let mut orch = paced(&[2, 3]);
        let _ = orch.start().unwrap();
        let step = orch.skip_current().unwrap();
        assert_eq!(step.dispatch.unwrap().row_number, 3);
        assert!(step.gap.is_none());
    }

    #[test]
    fn growth_while_paused_waits_for_resume() {
        let mut orch = engine(&[2]);
        let _ = orch.start().unwrap();
        let _ = orch.report(2, booked()).unwrap();
        // Queue completed; start over with a paused run.
        orch.reset().unwrap();
        let _ = orch.start().unwrap();
        orch.pause().unwrap();
        let _ = orch.report(2, booked()).unwrap();

        let step = orch.on_record_discovered(draft(3)).unwrap();
        assert!(step.dispatch.is_none());
        assert_eq!(orch.lifecycle(), Lifecycle::Paused);

        let step = orch.resume().unwrap();
        assert_eq!(step.dispatch.unwrap().row_number, 3);
    }

    #[test]
    fn duplicate_discovery_is_a_no_op() {
        let mut orch = engine(&[2]);
        let rx = watch(&mut orch);
        let step = orch.on_record_discovered(draft(2)).unwrap();
        assert!(!step.value);
        assert!(step.dispatch.is_none());
        assert_eq!(orch.store().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_discovery_is_rejected() {
        let mut orch = engine(&[]);
        let err = orch
            .on_record_discovered(RecordDraft::new(4, "No Phone", "  "))
            .unwrap_err();
        assert!(matches!(err, CarecallError::InvalidRecord { row_number: 4, .. }));
        assert!(orch.store().is_empty());
    }

    #[test]
    fn upload_reports_present_rows_and_admits_the_rest() {
        let mut orch = engine(&[2]);
        let step = orch
            .upload(vec![draft(2), draft(3), RecordDraft::new(4, "Bad", "n/a")])
            .unwrap();
        assert!(step.dispatch.is_none());
        let report = step.value;
        assert_eq!(report.admitted, vec![3]);
        let rejected: Vec<_> = report.rejected.iter().map(|r| r.row_number).collect();
        assert_eq!(rejected, vec![2, 4]);
        assert_eq!(orch.store().len(), 2);
        assert_eq!(orch.store().get(2).unwrap().name, "Patient 2");
    }

    #[test]
    fn upload_while_running_dispatches_when_idle_loop() {
        let mut orch = engine(&[]);
        let _ = orch.start().unwrap();
        assert_eq!(orch.lifecycle(), Lifecycle::Completed);
        let step = orch.upload(vec![draft(7), draft(8)]).unwrap();
        assert_eq!(step.dispatch.unwrap().row_number, 7);
        assert_eq!(orch.status().dynamically_added, 2);
    }

    #[test]
    fn rejected_dispatch_fails_record_and_moves_on() {
        let mut orch = engine(&[2, 3]);
        let session = orch.start().unwrap().dispatch.unwrap().session_id;
        let step = orch.dispatch_failed(2, session, "webhook returned 503").unwrap();
        assert_eq!(dispatched_row(&step), Some(3));

        let failed = orch.store().get(2).unwrap();
        assert_eq!(failed.call_state, CallState::Failed);
        assert_eq!(failed.outcome, Some(CallOutcome::Failed));
        assert_eq!(failed.details.as_deref(), Some("webhook returned 503"));
        assert_eq!(orch.status().stats.failed, 1);
    }

    #[test]
    fn answered_then_busy() {
        let mut orch = engine(&[2]);
        let session = orch.start().unwrap().dispatch.unwrap().session_id;
        orch.acknowledge(2, session, "CA-2").unwrap();
        let _ = orch.report(2, ProviderEvent::Answered).unwrap();
        let status = orch.status();
        assert_eq!(status.dispatch_id.as_deref(), Some("CA-2"));
        assert_eq!(
            status.current_record.unwrap().call_state,
            CallState::InProgress
        );

        let _ = orch.report(2, ProviderEvent::Busy).unwrap();
        let record = orch.store().get(2).unwrap();
        assert_eq!(record.call_state, CallState::Failed);
        assert_eq!(record.details.as_deref(), Some("busy"));
    }

    #[test]
    fn report_for_other_row_leaves_state_alone() {
        let mut orch = engine(&[2, 3]);
        let _ = orch.start().unwrap();
        let before = orch.status();
        assert!(matches!(
            orch.report(3, booked()),
            Err(CarecallError::UnknownSession(3))
        ));
        assert!(matches!(
            orch.report(99, booked()),
            Err(CarecallError::UnknownSession(99))
        ));
        assert_eq!(orch.status(), before);
    }

    #[test]
    fn terminal_outcome_cannot_be_overwritten() {
        let mut orch = engine(&[2, 3]);
        let session = orch.start().unwrap().dispatch.unwrap().session_id;
        let _ = orch.report(2, booked()).unwrap();
        assert!(orch
            .report(
                2,
                ProviderEvent::Completed {
                    outcome: CallOutcome::Incomplete
                }
            )
            .is_err());
        assert!(orch.dispatch_failed(2, session, "late").is_err());
        assert_eq!(
            orch.store().get(2).unwrap().outcome,
            Some(CallOutcome::AppointmentBooked)
        );
    }

    #[test]
    fn every_change_publishes_one_snapshot() {
        let mut orch = engine(&[2]);
        let rx = watch(&mut orch);
        let session = orch.start().unwrap().dispatch.unwrap().session_id;
        orch.acknowledge(2, session, "CA-2").unwrap();
        let _ = orch.report(2, booked()).unwrap();

        let revisions: Vec<u64> = rx.try_iter().map(|s| s.revision).collect();
        assert_eq!(revisions, vec![1, 2, 3]);
        assert_eq!(orch.status().revision, 3);
    }

    #[test]
    fn apply_routes_commands() {
        let mut orch = engine(&[2]);
        let step = orch.apply(OperatorCommand::Start).unwrap();
        assert_eq!(dispatched_row(&step), Some(2));
        let step = orch.apply(OperatorCommand::SkipCurrent).unwrap();
        assert!(step.dispatch.is_none());
        assert_eq!(orch.lifecycle(), Lifecycle::Completed);
        let _ = orch.apply(OperatorCommand::Reset).unwrap();
        assert_eq!(orch.lifecycle(), Lifecycle::Idle);
    }

    #[test]
    fn new_recovers_records_left_in_flight() {
        let mut store = store_with(&[2, 3]);
        store.mark(2, CallState::Dialing, None).unwrap();
        let orch = Orchestrator::new(store, QueuePolicy::default());
        let record = orch.store().get(2).unwrap();
        assert_eq!(record.call_state, CallState::Failed);
        assert_eq!(record.details.as_deref(), Some("recovered from restart"));
        assert_eq!(orch.lifecycle(), Lifecycle::Idle);
    }

    #[test]
    fn start_after_restart_picks_up_where_it_left_off() {
        let mut store = store_with(&[2, 3]);
        store.mark(2, CallState::Dialing, None).unwrap();
        store.mark(2, CallState::InProgress, None).unwrap();
        store
            .mark(2, CallState::Completed, Some(CallOutcome::Incomplete))
            .unwrap();
        let mut orch = Orchestrator::new(store, QueuePolicy::default());
        let step = orch.start().unwrap();
        assert_eq!(dispatched_row(&step), Some(3));
    }
}
