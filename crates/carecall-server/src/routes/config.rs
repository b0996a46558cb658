use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/config: the configuration the server is running with, plus the
/// active dispatcher and any validation warnings.
pub async fn get_config(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let mut json = serde_json::to_value(app.config.as_ref())?;
    if let Some(obj) = json.as_object_mut() {
        obj.insert(
            "dispatcher".to_string(),
            serde_json::Value::from(app.runtime.dispatcher_name()),
        );
        obj.insert(
            "warnings".to_string(),
            serde_json::to_value(app.config.validate())?,
        );
    }
    Ok(Json(json))
}
