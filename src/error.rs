//! Error handling
//!
//! Every request-scoped failure is converted to an `AppError` at the HTTP
//! boundary and rendered as the `{status: "error", message}` envelope.
//! Nothing here crashes the process; analyses can fail indefinitely while
//! the server keeps serving.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::analysis::orchestrator::AnalysisError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Upload errors
    UploadMissing,
    BadRequest(String),

    // Analysis errors
    EngineFailed(String),
    ParseFailed { log_file: String },

    // Audit log retrieval errors
    LogNotFound,

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::UploadMissing => (
                StatusCode::BAD_REQUEST,
                "No file uploaded (expected multipart field `apkFile`)".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::EngineFailed(msg) => {
                tracing::error!("Engine failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::ParseFailed { log_file } => {
                tracing::error!("Parse failure, raw output kept in {}", log_file);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Could not parse engine output; see log file {}", log_file),
                )
            }
            AppError::LogNotFound => (
                StatusCode::NOT_FOUND,
                "Log file not found".to_string(),
            ),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "status": "error",
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::ParseFailed { log_file, .. } => AppError::ParseFailed { log_file },
            other => AppError::EngineFailed(other.to_string()),
        }
    }
}
