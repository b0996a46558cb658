use axum::extract::{Path, State};
use axum::Json;
use carecall_core::status::QueueStatus;
use carecall_core::types::{ProviderEvent, RowNumber};

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/calls/{row_number}/events: status reported by the telephony or
/// conversation side for the active call, e.g.
/// `{"type": "completed", "outcome": "appointment_booked"}`.
pub async fn report_event(
    State(app): State<AppState>,
    Path(row_number): Path<RowNumber>,
    Json(event): Json<ProviderEvent>,
) -> Result<Json<QueueStatus>, AppError> {
    tracing::debug!(row_number, event = %event, "provider event");
    let status = app.runtime.execute(|engine| {
        let step = engine.report(row_number, event)?;
        Ok(step.map(|()| engine.status()))
    })?;
    Ok(Json(status))
}
