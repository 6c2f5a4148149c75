//! Audit log handlers

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use crate::analysis::runlog::LogReadError;
use crate::{AppError, AppResult, AppState};

/// List audit logs, newest first
pub async fn list(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let logs = state
        .logger
        .list()
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to list logs: {}", e)))?;

    Ok(Json(json!({
        "status": "ok",
        "logs": logs,
    })))
}

/// Read one audit log by its server-generated filename
pub async fn read(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    match state.logger.read(&filename).await {
        Ok(content) => Ok(Json(json!({
            "status": "ok",
            "content": content,
        }))),
        Err(LogReadError::InvalidName) | Err(LogReadError::NotFound) => Err(AppError::LogNotFound),
        Err(LogReadError::Io(e)) => Err(AppError::InternalError(format!(
            "Failed to read log: {}",
            e
        ))),
    }
}
