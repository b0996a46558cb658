use axum::extract::{Path, State};
use axum::Json;
use carecall_core::orchestrator::OperatorCommand;
use carecall_core::status::QueueStatus;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/queue/{command}: start, pause, resume, stop, reset or
/// skip-current. Responds with the status right after the command.
pub async fn apply_command(
    State(app): State<AppState>,
    Path(command): Path<String>,
) -> Result<Json<QueueStatus>, AppError> {
    let command: OperatorCommand = command.parse()?;
    let status = app.runtime.execute(|engine| {
        let step = engine.apply(command)?;
        Ok(step.map(|()| engine.status()))
    })?;
    Ok(Json(status))
}

/// GET /api/queue/status
pub async fn get_status(State(app): State<AppState>) -> Json<QueueStatus> {
    Json(app.runtime.read(|engine| engine.status()))
}

/// Rows appended mid-run that the records view calls out, newest first.
const RECENT_ADDITIONS: usize = 10;

/// GET /api/queue/records: every record in dial order plus counts by state
/// and the latest rows appended while the queue was active.
pub async fn get_records(State(app): State<AppState>) -> Json<serde_json::Value> {
    let summary = app.runtime.read(|engine| {
        let store = engine.store();
        let recent: Vec<_> = store
            .records()
            .iter()
            .rev()
            .filter(|record| record.added_while_active)
            .take(RECENT_ADDITIONS)
            .collect();
        serde_json::json!({
            "lifecycle": engine.lifecycle(),
            "cursor": store.cursor(),
            "total": store.len(),
            "counts": store.count_by_state(),
            "records": store.records(),
            "recent_additions": recent,
        })
    });
    Json(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DryRunDispatcher;
    use carecall_core::config::Config;
    use carecall_core::record::RecordDraft;
    use carecall_core::store::QueueStore;
    use carecall_core::types::Lifecycle;
    use std::sync::Arc;

    fn app() -> AppState {
        let dir = std::env::temp_dir();
        let mut config = Config::new("clinic");
        config.queue.persist = false;
        config.queue.call_gap_secs = 0;
        AppState::new(dir, config, QueueStore::new(), Arc::new(DryRunDispatcher))
    }

    #[tokio::test]
    async fn start_on_empty_queue_reports_completed() {
        let status = apply_command(State(app()), Path("start".into()))
            .await
            .unwrap();
        assert_eq!(status.0.lifecycle, Lifecycle::Completed);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        assert!(apply_command(State(app()), Path("rewind".into()))
            .await
            .is_err());
    }

    fn draft(row_number: u32) -> RecordDraft {
        RecordDraft::new(row_number, format!("Patient {row_number}"), format!("+1555010{row_number:04}"))
    }

    #[tokio::test]
    async fn records_lists_latest_mid_run_additions_first() {
        let app = app();
        app.runtime
            .execute(|engine| engine.upload(vec![draft(2)]))
            .unwrap();
        apply_command(State(app.clone()), Path("start".into()))
            .await
            .unwrap();
        for row in 3..=14 {
            app.runtime
                .execute(|engine| engine.upload(vec![draft(row)]))
                .unwrap();
        }

        let summary = get_records(State(app)).await.0;
        let recent: Vec<u64> = summary["recent_additions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record["row_number"].as_u64().unwrap())
            .collect();
        assert_eq!(recent, (5..=14).rev().collect::<Vec<u64>>());
        assert_eq!(summary["total"], 13);
    }
}
