//! Ordered, growable list of patient records.
//!
//! The store is the single source of truth for dial order and dedupe. Records
//! are only ever appended; their position never changes, and the only way a
//! record's `call_state` moves backwards is `reset_all`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CarecallError, Result};
use crate::paths;
use crate::record::PatientRecord;
use crate::types::{CallOutcome, CallState, RowNumber};

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct StoreFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    cursor: usize,
    #[serde(default)]
    records: Vec<PatientRecord>,
}

fn default_version() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// QueueStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueStore {
    records: Vec<PatientRecord>,
    /// row_number → position in `records`
    index: HashMap<RowNumber, usize>,
    cursor: usize,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted records, rejecting duplicate rows or a
    /// cursor past the end.
    pub fn from_records(records: Vec<PatientRecord>, cursor: usize) -> Result<Self> {
        if cursor > records.len() {
            return Err(CarecallError::CorruptStore(format!(
                "cursor {cursor} beyond {} records",
                records.len()
            )));
        }
        let mut index = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if index.insert(record.row_number, pos).is_some() {
                return Err(CarecallError::CorruptStore(format!(
                    "row {} appears more than once",
                    record.row_number
                )));
            }
        }
        Ok(Self {
            records,
            index,
            cursor,
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    pub fn contains(&self, row_number: RowNumber) -> bool {
        self.index.contains_key(&row_number)
    }

    pub fn position(&self, row_number: RowNumber) -> Option<usize> {
        self.index.get(&row_number).copied()
    }

    pub fn get(&self, row_number: RowNumber) -> Option<&PatientRecord> {
        self.position(row_number).map(|pos| &self.records[pos])
    }

    /// First `Pending` record at or after `cursor`, with its position.
    pub fn next_eligible(&self, cursor: usize) -> Option<(usize, &PatientRecord)> {
        self.records
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, r)| r.call_state == CallState::Pending)
    }

    /// Number of records in each call state, keyed by the state's wire name.
    pub fn count_by_state(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> =
            CallState::all().iter().map(|s| (s.as_str(), 0)).collect();
        for record in &self.records {
            *counts.entry(record.call_state.as_str()).or_default() += 1;
        }
        counts
    }

    /// Records currently dialing or connected.
    pub fn active(&self) -> impl Iterator<Item = &PatientRecord> {
        self.records.iter().filter(|r| r.call_state.is_active())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert `record` at the end. Returns its position.
    pub fn append(&mut self, record: PatientRecord) -> Result<usize> {
        if self.contains(record.row_number) {
            return Err(CarecallError::DuplicateRecord(record.row_number));
        }
        let pos = self.records.len();
        self.index.insert(record.row_number, pos);
        self.records.push(record);
        Ok(pos)
    }

    pub fn mark(
        &mut self,
        row_number: RowNumber,
        new_state: CallState,
        outcome: Option<CallOutcome>,
    ) -> Result<&PatientRecord> {
        self.mark_detailed(row_number, new_state, outcome, None)
    }

    /// Move a record along the call graph, attaching `details` to it.
    ///
    /// `Completed` requires an outcome; `Failed` always records
    /// `CallOutcome::Failed`; every other state carries no outcome.
    pub fn mark_detailed(
        &mut self,
        row_number: RowNumber,
        new_state: CallState,
        outcome: Option<CallOutcome>,
        details: Option<String>,
    ) -> Result<&PatientRecord> {
        let pos = self
            .position(row_number)
            .ok_or(CarecallError::UnknownRecord(row_number))?;
        let from = self.records[pos].call_state;

        let reject = |reason: &str| CarecallError::InvalidTransition {
            row_number,
            from,
            to: new_state,
            reason: reason.to_string(),
        };

        if !from.can_transition_to(new_state) {
            return Err(reject("not reachable in the call graph"));
        }
        let outcome = match (new_state, outcome) {
            (CallState::Completed, None) => {
                return Err(reject("completion requires an outcome"));
            }
            (CallState::Completed, Some(o)) => Some(o),
            (CallState::Failed, _) => Some(CallOutcome::Failed),
            (_, Some(_)) => {
                return Err(reject("only completed or failed calls carry an outcome"));
            }
            (_, None) => None,
        };

        let record = &mut self.records[pos];
        record.call_state = new_state;
        if new_state == CallState::Dialing {
            record.attempts += 1;
            record.last_attempt = Some(Utc::now());
        }
        if outcome.is_some() {
            record.outcome = outcome;
        }
        if details.is_some() {
            record.details = details;
        }
        Ok(&self.records[pos])
    }

    /// Move the cursor forward. Panics if that would move it backwards or past
    /// the end: either means the orchestrator lost track of the queue.
    pub fn advance_cursor(&mut self, to: usize) {
        assert!(
            to >= self.cursor && to <= self.records.len(),
            "cursor invariant violated: {} -> {} with {} records",
            self.cursor,
            to,
            self.records.len()
        );
        self.cursor = to;
    }

    /// Start scanning from the head again without touching record states.
    pub(crate) fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Every record back to `Pending`, outcomes cleared, cursor at 0.
    pub fn reset_all(&mut self) {
        for record in &mut self.records {
            record.clear_progress();
        }
        self.cursor = 0;
    }

    /// Fail any record left mid-call by a previous process. Returns how many.
    pub fn recover_interrupted(&mut self) -> usize {
        let mut count = 0;
        for record in self.records.iter_mut().filter(|r| r.call_state.is_active()) {
            record.call_state = CallState::Failed;
            record.outcome = Some(CallOutcome::Failed);
            record.details = Some("recovered from restart".to_string());
            count += 1;
        }
        count
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save(&self, root: &Path) -> Result<()> {
        let file = StoreFile {
            version: default_version(),
            cursor: self.cursor,
            records: self.records.clone(),
        };
        crate::io::write_yaml(&paths::queue_path(root), &file)
    }

    /// Load `.carecall/queue.yaml`, or an empty store if it does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        match crate::io::read_yaml::<StoreFile>(&paths::queue_path(root))? {
            Some(file) => Self::from_records(file.records, file.cursor),
            None => Ok(Self::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
