use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::PatientRecord;
use crate::stats::QueueStats;
use crate::types::Lifecycle;

/// Point-in-time view of the queue, delivered to observers and returned by
/// `get_status`. Every field is always present; absent values are explicit
/// `None`s rather than missing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Increases by one with every published snapshot.
    pub revision: u64,
    pub lifecycle: Lifecycle,
    pub current_record: Option<PatientRecord>,
    pub dispatch_id: Option<String>,
    pub stats: QueueStats,
    pub total_records: usize,
    pub cursor: usize,
    pub remaining: usize,
    pub progress_percent: f64,
    pub dynamically_added: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueStatus {
    pub fn call_in_progress(&self) -> bool {
        self.current_record.is_some()
    }
}

/// Share of records that no longer wait for a call, in percent.
pub(crate) fn progress_percent(total: usize, pending: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let done = total.saturating_sub(pending) as f64;
    (done / total as f64 * 1000.0).round() / 10.0
}
