use crate::output::{print_json, print_table};
use carecall_core::ingest;
use carecall_core::store::QueueStore;
use std::path::Path;

/// Check a batch file offline, against the saved queue when there is one.
pub fn run(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let drafts = super::load_batch(file)?;
    let total = drafts.len();
    let store = QueueStore::load(root)?;
    let (_, report) = ingest::check_batch(&store, drafts);

    if json {
        print_json(&report)?;
    } else {
        if !report.rejected.is_empty() {
            let rows = report
                .rejected
                .iter()
                .map(|r| {
                    vec![
                        r.row_number.to_string(),
                        r.reason.to_string(),
                        r.reason.describe().to_string(),
                    ]
                })
                .collect();
            print_table(&["ROW", "REASON", "DETAIL"], rows);
            println!();
        }
        println!(
            "{} of {total} row(s) valid, {} rejected",
            report.admitted_count(),
            report.rejected_count()
        );
    }

    if report.rejected_count() > 0 {
        anyhow::bail!("{} of {total} row(s) rejected", report.rejected_count());
    }
    Ok(())
}
