//! Boundary validation for incoming rows.
//!
//! Drafts are checked one at a time; a bad row never blocks the rest of its
//! batch. The orchestrator admits whatever `check_batch` accepts and returns
//! the rest in an `UploadReport`.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::record::{PatientRecord, RecordDraft};
use crate::store::QueueStore;
use crate::types::RowNumber;

// ---------------------------------------------------------------------------
// RejectReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidRowNumber,
    MissingPhone,
    MalformedPhone,
    /// Already present in the queue store.
    Duplicate,
    /// Repeated earlier in the same batch.
    DuplicateInBatch,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRowNumber => "invalid_row_number",
            Self::MissingPhone => "missing_phone",
            Self::MalformedPhone => "malformed_phone",
            Self::Duplicate => "duplicate",
            Self::DuplicateInBatch => "duplicate_in_batch",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::InvalidRowNumber => "row number must be 1 or greater",
            Self::MissingPhone => "phone number is missing",
            Self::MalformedPhone => "phone number is not dialable",
            Self::Duplicate => "row is already queued",
            Self::DuplicateInBatch => "row appears more than once in the batch",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// UploadReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRejection {
    pub row_number: RowNumber,
    pub reason: RejectReason,
}

/// Per-row result of a batch upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub admitted: Vec<RowNumber>,
    pub rejected: Vec<RowRejection>,
}

impl UploadReport {
    pub fn admitted_count(&self) -> usize {
        self.admitted.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

const MIN_PHONE_DIGITS: usize = 7;

static PHONE_RE: OnceLock<Regex> = OnceLock::new();

fn phone_re() -> &'static Regex {
    PHONE_RE.get_or_init(|| Regex::new(r"^\+?[0-9(][0-9\s\-().]{5,}$").unwrap())
}

/// Spreadsheet exports write empty cells as these.
fn is_blank(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case("nan") || value.eq_ignore_ascii_case("none")
}

/// Check the fields of a single draft, ignoring the store. On success the
/// draft comes back with its text fields trimmed.
pub fn validate_draft(mut draft: RecordDraft) -> Result<RecordDraft, RejectReason> {
    if draft.row_number == 0 {
        return Err(RejectReason::InvalidRowNumber);
    }
    let phone = draft.phone.trim();
    if is_blank(phone) {
        return Err(RejectReason::MissingPhone);
    }
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !phone_re().is_match(phone) || digits < MIN_PHONE_DIGITS {
        return Err(RejectReason::MalformedPhone);
    }
    draft.phone = phone.to_string();
    draft.name = draft.name.trim().to_string();
    draft.gender = draft
        .gender
        .map(|g| g.trim().to_string())
        .filter(|g| !is_blank(g));
    draft.address = draft
        .address
        .map(|a| a.trim().to_string())
        .filter(|a| !is_blank(a));
    Ok(draft)
}

/// Split a batch into records ready for `QueueStore::append` and a report of
/// the rows that were turned away. Admission order follows batch order.
pub fn check_batch(
    store: &QueueStore,
    drafts: Vec<RecordDraft>,
) -> (Vec<PatientRecord>, UploadReport) {
    let mut seen = HashSet::new();
    let mut accepted = Vec::new();
    let mut report = UploadReport::default();

    for draft in drafts {
        let row_number = draft.row_number;
        let verdict = validate_draft(draft).and_then(|draft| {
            if store.contains(row_number) {
                Err(RejectReason::Duplicate)
            } else if !seen.insert(row_number) {
                Err(RejectReason::DuplicateInBatch)
            } else {
                Ok(draft)
            }
        });
        match verdict {
            Ok(draft) => {
                report.admitted.push(row_number);
                accepted.push(PatientRecord::from_draft(draft));
            }
            Err(reason) => report.rejected.push(RowRejection { row_number, reason }),
        }
    }

    (accepted, report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
