use axum::extract::State;
use axum::Json;
use carecall_core::ingest::UploadReport;
use carecall_core::record::RecordDraft;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/records: one normalized row from the record source. A row
/// that is already queued comes back with `"admitted": false`.
pub async fn discover_record(
    State(app): State<AppState>,
    Json(draft): Json<RecordDraft>,
) -> Result<Json<serde_json::Value>, AppError> {
    let row_number = draft.row_number;
    let (admitted, status) = app.runtime.execute(|engine| {
        let step = engine.on_record_discovered(draft)?;
        Ok(step.map(|admitted| (admitted, engine.status())))
    })?;
    Ok(Json(serde_json::json!({
        "row_number": row_number,
        "admitted": admitted,
        "status": status,
    })))
}

#[derive(serde::Deserialize)]
pub struct UploadBody {
    pub records: Vec<RecordDraft>,
}

/// POST /api/records/upload: batch of rows, validated one by one.
pub async fn upload_records(
    State(app): State<AppState>,
    Json(body): Json<UploadBody>,
) -> Result<Json<UploadReport>, AppError> {
    if body.records.is_empty() {
        return Err(AppError::bad_request("upload contains no records"));
    }
    let report = app.runtime.execute(|engine| engine.upload(body.records))?;
    Ok(Json(report))
}
