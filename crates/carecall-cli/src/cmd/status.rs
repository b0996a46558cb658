use crate::client::Client;
use crate::output::{print_fields, print_json};
use carecall_core::status::QueueStatus;

pub fn run(client: &Client, json: bool) -> anyhow::Result<()> {
    let status: QueueStatus = client.get("/api/queue/status")?;
    if json {
        return print_json(&status);
    }
    print_status(&status);
    Ok(())
}

pub fn print_status(status: &QueueStatus) {
    let current = match &status.current_record {
        Some(r) => format!(
            "row {} {} ({}{})",
            r.row_number,
            r.name,
            r.call_state,
            status
                .dispatch_id
                .as_deref()
                .map(|id| format!(", dispatch {id}"))
                .unwrap_or_default()
        ),
        None => "none".to_string(),
    };
    let s = &status.stats;
    print_fields(&[
        ("Queue", format!("{} (revision {})", status.lifecycle, status.revision)),
        (
            "Progress",
            format!(
                "{}/{} records ({:.1}%), {} remaining",
                status.total_records - status.remaining,
                status.total_records,
                status.progress_percent,
                status.remaining
            ),
        ),
        ("Current", current),
        (
            "Calls",
            format!(
                "{} total, {} booked, {} reschedules, {} incomplete, {} failed, {} skipped",
                s.total_calls, s.appointments_booked, s.reschedules, s.incomplete, s.failed, s.skipped
            ),
        ),
        ("Added live", status.dynamically_added.to_string()),
    ]);
}
