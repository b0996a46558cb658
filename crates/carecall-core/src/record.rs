use crate::types::{CallOutcome, CallState, RowNumber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RecordDraft
// ---------------------------------------------------------------------------

/// A normalized spreadsheet row as delivered by the record source.
///
/// Nothing is validated yet; `ingest::validate_draft` turns a draft into a
/// `PatientRecord` or a per-row rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub row_number: RowNumber,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl RecordDraft {
    pub fn new(row_number: RowNumber, name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            row_number,
            name: name.into(),
            phone: phone.into(),
            age: None,
            gender: None,
            address: None,
        }
    }
}

// ---------------------------------------------------------------------------
// PatientRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub row_number: RowNumber,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub call_state: CallState,
    #[serde(default)]
    pub outcome: Option<CallOutcome>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    /// Reason attached to a terminal state (failure reason, skip note).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub added_while_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PatientRecord {
    pub fn new(row_number: RowNumber, name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            row_number,
            name: name.into(),
            phone: phone.into(),
            age: None,
            gender: None,
            address: None,
            call_state: CallState::Pending,
            outcome: None,
            attempts: 0,
            last_attempt: None,
            details: None,
            added_while_active: false,
            created_at: Utc::now(),
        }
    }

    /// Build a pending record from an already-validated draft.
    pub(crate) fn from_draft(draft: RecordDraft) -> Self {
        Self {
            age: draft.age,
            gender: draft.gender,
            address: draft.address,
            ..Self::new(draft.row_number, draft.name, draft.phone)
        }
    }

    /// Return to `Pending`, clearing everything a call attempt wrote.
    pub(crate) fn clear_progress(&mut self) {
        self.call_state = CallState::Pending;
        self.outcome = None;
        self.attempts = 0;
        self.last_attempt = None;
        self.details = None;
    }
}
