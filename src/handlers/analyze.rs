//! Analyze handler
//!
//! `POST /analyze` accepts one multipart file field `apkFile`, stores it and
//! runs the full analysis. The run itself lives in a detached task: if the
//! client disconnects mid-run, axum drops this handler's future but the run
//! completes anyway, so the audit log and the artifact cleanup are never
//! left half-done.

use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::json;

use crate::analysis::orchestrator::{run_analysis, AnalysisOutcome};
use crate::{AppError, AppResult, AppState};

/// Multipart field carrying the uploaded artifact
const UPLOAD_FIELD: &str = "apkFile";

pub async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let original_name = field
                .file_name()
                .unwrap_or("upload.bin")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
            upload = Some((original_name, bytes));
            break;
        }
    }

    let (original_name, bytes) = upload.ok_or(AppError::UploadMissing)?;
    let artifact = state
        .store
        .store(&bytes, &original_name)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to store upload: {}", e)))?;

    let report = tokio::spawn(run_analysis(
        state.store.clone(),
        state.logger.clone(),
        state.engine.clone(),
        artifact,
    ))
    .await
    .map_err(|e| AppError::InternalError(format!("Analysis task failed: {}", e)))?;

    match report.result {
        Ok(AnalysisOutcome::Classified(result)) => Ok(Json(json!({
            "status": "ok",
            "data": result,
        }))),
        Ok(AnalysisOutcome::NoArtifact { log_file }) => Ok(Json(json!({
            "status": "ok",
            "data": {
                "error": "Engine found no artifact to analyze",
                "logFile": log_file,
            },
        }))),
        Err(e) => Err(e.into()),
    }
}
