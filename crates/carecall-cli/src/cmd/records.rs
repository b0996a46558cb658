use crate::client::Client;
use crate::output::{cell, print_json, print_table};
use carecall_core::ingest::UploadReport;
use carecall_core::record::PatientRecord;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Deserialize, serde::Serialize)]
struct RecordsSummary {
    total: usize,
    counts: BTreeMap<String, usize>,
    records: Vec<PatientRecord>,
    #[serde(default)]
    recent_additions: Vec<PatientRecord>,
}

/// `carecall records`: every queued record in dial order.
pub fn list(client: &Client, json: bool) -> anyhow::Result<()> {
    let summary: RecordsSummary = client.get("/api/queue/records")?;
    if json {
        return print_json(&summary);
    }
    let rows = summary
        .records
        .iter()
        .map(|r| {
            vec![
                r.row_number.to_string(),
                r.name.clone(),
                r.phone.clone(),
                r.call_state.to_string(),
                cell(r.outcome),
                r.attempts.to_string(),
                cell(r.details.as_deref()),
            ]
        })
        .collect();
    print_table(
        &["ROW", "NAME", "PHONE", "STATE", "OUTCOME", "ATTEMPTS", "DETAILS"],
        rows,
    );
    let counts: Vec<String> = summary
        .counts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(state, n)| format!("{n} {state}"))
        .collect();
    println!("\n{} record(s): {}", summary.total, counts.join(", "));
    if !summary.recent_additions.is_empty() {
        let rows: Vec<String> = summary
            .recent_additions
            .iter()
            .map(|r| r.row_number.to_string())
            .collect();
        println!("added mid-run: row {}", rows.join(", "));
    }
    Ok(())
}

/// `carecall upload <file>`: send a batch to the server.
pub fn upload(client: &Client, file: &Path, json: bool) -> anyhow::Result<()> {
    let drafts = super::load_batch(file)?;
    let report: UploadReport = client.post(
        "/api/records/upload",
        Some(serde_json::json!({ "records": drafts })),
    )?;
    if json {
        return print_json(&report);
    }
    println!(
        "admitted {} row(s), rejected {}",
        report.admitted_count(),
        report.rejected_count()
    );
    for r in &report.rejected {
        println!("  row {}: {}", r.row_number, r.reason.describe());
    }
    Ok(())
}
