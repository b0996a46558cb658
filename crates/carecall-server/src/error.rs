use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use carecall_core::error::CarecallError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 errors
// ---------------------------------------------------------------------------

/// Carries a 400 Bad Request through the `anyhow::Error` chain for input
/// problems that never reach the engine.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }
}

pub(crate) fn status_for(err: &CarecallError) -> StatusCode {
    match err {
        CarecallError::NotInitialized => StatusCode::BAD_REQUEST,
        CarecallError::UnknownRecord(_) | CarecallError::UnknownSession(_) => StatusCode::NOT_FOUND,
        CarecallError::DuplicateRecord(_)
        | CarecallError::SessionAlreadyActive(_)
        | CarecallError::InvalidStateTransition { .. }
        | CarecallError::NoActiveCall
        | CarecallError::CallInFlight(_) => StatusCode::CONFLICT,
        CarecallError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CarecallError::InvalidRecord { .. }
        | CarecallError::InvalidOutcome(_)
        | CarecallError::UnknownCommand(_) => StatusCode::BAD_REQUEST,
        CarecallError::CorruptStore(_)
        | CarecallError::Io(_)
        | CarecallError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequestError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if let Some(e) = self.0.downcast_ref::<CarecallError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
