use serde::{Deserialize, Serialize};

use crate::record::PatientRecord;
use crate::types::{CallOutcome, CallState};

/// Counters derived from the queue's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Calls that reached `completed` or `failed`. In-flight and skipped
    /// records are not counted.
    pub total_calls: usize,
    pub appointments_booked: usize,
    pub reschedules: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
}

impl QueueStats {
    /// Recompute from scratch. The store is small enough that this runs on
    /// every snapshot instead of being maintained incrementally.
    pub fn aggregate<'a>(records: impl IntoIterator<Item = &'a PatientRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            match record.call_state {
                CallState::Pending => stats.pending += 1,
                CallState::Skipped => stats.skipped += 1,
                CallState::Completed | CallState::Failed => stats.total_calls += 1,
                CallState::Dialing | CallState::InProgress => {}
            }
            match record.outcome {
                Some(CallOutcome::AppointmentBooked) => stats.appointments_booked += 1,
                Some(CallOutcome::RescheduleRequested) => stats.reschedules += 1,
                Some(CallOutcome::Incomplete) => stats.incomplete += 1,
                Some(CallOutcome::Failed) => stats.failed += 1,
                None => {}
            }
        }
        stats
    }
}
