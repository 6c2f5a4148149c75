//! Analysis Orchestrator
//!
//! Composes the process adapter, run logger and result parser into one
//! request-scoped state machine:
//!
//! ```text
//! Pending ──▶ Running ──▶ { Succeeded, EngineFailed, ParseFailed }
//! ```
//!
//! Leaving `Running` always releases the uploaded artifact, whatever the
//! terminal state.

use super::engine::{EngineAdapter, EngineError};
use super::parser::{self, ParseError};
use super::runlog::RunLogger;
use super::store::{ArtifactStore, StoredArtifact};
use super::types::{AnalysisRun, AnalysisVerdict, ClassificationResult, RunState};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("failed to create audit log: {0}")]
    LogCreate(std::io::Error),

    #[error("engine invocation failed: {0}")]
    Engine(#[from] EngineError),

    #[error("engine exited with code {code}: {stderr}")]
    EngineExit { code: String, stderr: String },

    #[error("could not parse engine output; see log file {log_file}")]
    ParseFailed {
        log_file: String,
        source: ParseError,
    },
}

/// Terminal payload of a successful run.
#[derive(Debug)]
pub enum AnalysisOutcome {
    /// The engine classified the artifact.
    Classified(ClassificationResult),

    /// The engine found nothing to analyze. Success-shaped, but there is no
    /// classification to return; the log file is the only trace.
    NoArtifact { log_file: String },
}

/// Everything a caller learns from one run.
#[derive(Debug)]
pub struct AnalysisReport {
    pub run: AnalysisRun,
    pub result: Result<AnalysisOutcome, AnalysisError>,
}

/// Run one end-to-end analysis for a stored artifact.
///
/// Owns the artifact for the duration of the run and releases it
/// unconditionally before returning, on every exit path.
pub async fn run_analysis(
    store: ArtifactStore,
    logger: RunLogger,
    engine: EngineAdapter,
    artifact: StoredArtifact,
) -> AnalysisReport {
    let run_id = logger.next_run_id();
    let artifact_name = artifact.file_name();
    tracing::info!(
        run_id,
        artifact = %artifact_name,
        received_at = %artifact.received_at,
        "analysis started"
    );

    let run = AnalysisRun::new(run_id, logger.log_path(run_id));
    let result = drive(&logger, &engine, &artifact, run_id, &artifact_name).await;

    let state = match &result {
        Ok(_) => RunState::Succeeded,
        Err(AnalysisError::ParseFailed { .. }) => RunState::ParseFailed,
        Err(_) => RunState::EngineFailed,
    };
    match &result {
        Ok(_) => tracing::info!(run_id, state = ?state, "analysis finished"),
        Err(e) => tracing::warn!(run_id, state = ?state, error = %e, "analysis failed"),
    }

    // Guaranteed side effect of leaving Running, not a transition itself.
    store.release(&artifact).await;

    AnalysisReport {
        run: run.complete(state),
        result,
    }
}

/// The Running phase: log record, engine run, exit classification, parse.
async fn drive(
    logger: &RunLogger,
    engine: &EngineAdapter,
    artifact: &StoredArtifact,
    run_id: i64,
    artifact_name: &str,
) -> Result<AnalysisOutcome, AnalysisError> {
    // Every run must leave exactly one audit record, so failing to open it
    // fails the run.
    let mut log = logger
        .begin(run_id, artifact_name)
        .await
        .map_err(AnalysisError::LogCreate)?;

    let output = match engine.invoke(&artifact.path, &mut log).await {
        Ok(output) => output,
        Err(e) => {
            if let Err(finish_err) = log.finish(None).await {
                tracing::error!(run_id, error = %finish_err, "failed to finalize audit log");
            }
            return Err(e.into());
        }
    };

    if let Err(e) = log.finish(output.exit_code).await {
        // The classification still stands on a degraded audit record.
        tracing::error!(run_id, error = %e, "failed to finalize audit log");
    }

    match output.exit_code {
        Some(0) => match parser::parse(&output.stdout) {
            Ok(AnalysisVerdict::Classification(result)) => {
                Ok(AnalysisOutcome::Classified(result))
            }
            Ok(AnalysisVerdict::NoArtifact) => Ok(AnalysisOutcome::NoArtifact {
                log_file: log.filename().to_string(),
            }),
            Err(source) => Err(AnalysisError::ParseFailed {
                log_file: log.filename().to_string(),
                source,
            }),
        },
        code => Err(AnalysisError::EngineExit {
            code: code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            stderr: output.stderr,
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        store: ArtifactStore,
        logger: RunLogger,
        _uploads: TempDir,
        logs_dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let uploads = TempDir::new().unwrap();
            let logs_dir = TempDir::new().unwrap();
            Self {
                store: ArtifactStore::new(uploads.path().to_path_buf()),
                logger: RunLogger::new(logs_dir.path().to_path_buf()),
                _uploads: uploads,
                logs_dir,
            }
        }

        async fn artifact(&self) -> StoredArtifact {
            self.store.store(b"fake apk", "sample.apk").await.unwrap()
        }

        fn log_count(&self) -> usize {
            std::fs::read_dir(self.logs_dir.path()).unwrap().count()
        }
    }

    fn shell_engine(script: &str) -> EngineAdapter {
        EngineAdapter::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_successful_classification() {
        let fx = Fixture::new();
        let artifact = fx.artifact().await;
        let artifact_path = artifact.path.clone();

        let engine = shell_engine(
            "echo 'Phân Loại: Adware'; echo 'Độ Tin Cậy: 92.00%'; \
             echo 'Xác Suất Các Lớp:'; echo 'Adware: 92.00%'; echo 'Lành Tính: 8.00%'",
        );
        let report =
            run_analysis(fx.store.clone(), fx.logger.clone(), engine, artifact).await;

        assert_eq!(report.run.state, RunState::Succeeded);
        let outcome = report.result.unwrap();
        let AnalysisOutcome::Classified(result) = outcome else {
            panic!("expected a classification");
        };
        assert_eq!(result.prediction, "Adware");
        assert_eq!(result.confidence, 0.92);

        // Cleanup and audit: artifact gone, exactly one log file.
        assert!(!artifact_path.exists());
        assert_eq!(fx.log_count(), 1);
    }

    #[tokio::test]
    async fn test_engine_exit_2_fails_and_still_cleans_up() {
        let fx = Fixture::new();
        let artifact = fx.artifact().await;
        let artifact_path = artifact.path.clone();

        let engine = shell_engine("echo 'partial output'; echo 'model exploded' >&2; exit 2");
        let report =
            run_analysis(fx.store.clone(), fx.logger.clone(), engine, artifact).await;

        assert_eq!(report.run.state, RunState::EngineFailed);
        let err = report.result.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("code 2"));
        assert!(message.contains("model exploded"));

        assert!(!artifact_path.exists());
        assert_eq!(fx.log_count(), 1);
        let content = std::fs::read_to_string(&report.run.log_path).unwrap();
        assert!(content.contains("partial output"));
        assert!(content.ends_with("=== exit code: 2 ===\n"));
    }

    #[tokio::test]
    async fn test_unintelligible_output_is_parse_failed() {
        let fx = Fixture::new();
        let artifact = fx.artifact().await;
        let artifact_path = artifact.path.clone();

        let engine = shell_engine("echo 'free-form chatter, no protocol'");
        let report =
            run_analysis(fx.store.clone(), fx.logger.clone(), engine, artifact).await;

        assert_eq!(report.run.state, RunState::ParseFailed);
        match report.result.unwrap_err() {
            AnalysisError::ParseFailed { log_file, .. } => {
                assert_eq!(log_file, fx.logger.log_filename(report.run.id));
            }
            other => panic!("expected ParseFailed, got {other:?}"),
        }
        assert!(!artifact_path.exists());
    }

    #[tokio::test]
    async fn test_no_artifact_sentinel_is_success_shaped() {
        let fx = Fixture::new();
        let artifact = fx.artifact().await;

        let engine = shell_engine("echo 'Không tìm thấy file APK để phân tích'");
        let report =
            run_analysis(fx.store.clone(), fx.logger.clone(), engine, artifact).await;

        assert_eq!(report.run.state, RunState::Succeeded);
        assert!(matches!(
            report.result.unwrap(),
            AnalysisOutcome::NoArtifact { .. }
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_engine_failed_with_cleanup() {
        let fx = Fixture::new();
        let artifact = fx.artifact().await;
        let artifact_path = artifact.path.clone();

        let engine = EngineAdapter::new("definitely-not-a-real-binary", vec![]);
        let report =
            run_analysis(fx.store.clone(), fx.logger.clone(), engine, artifact).await;

        assert_eq!(report.run.state, RunState::EngineFailed);
        assert!(!artifact_path.exists());
        // The log still exists, with an unknown exit trailer.
        let content = std::fs::read_to_string(&report.run.log_path).unwrap();
        assert!(content.ends_with("=== exit code: unknown ===\n"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_use_distinct_logs() {
        let fx = Fixture::new();
        let a = fx.artifact().await;
        let b = fx.artifact().await;

        let engine = shell_engine(
            "sleep 0.05; echo 'Phân Loại: Lành Tính'; echo 'Độ Tin Cậy: 99.00%'",
        );
        let (ra, rb) = tokio::join!(
            run_analysis(fx.store.clone(), fx.logger.clone(), engine.clone(), a),
            run_analysis(fx.store.clone(), fx.logger.clone(), engine.clone(), b),
        );

        assert_ne!(ra.run.log_path, rb.run.log_path);
        assert_eq!(ra.run.state, RunState::Succeeded);
        assert_eq!(rb.run.state, RunState::Succeeded);
        assert_eq!(fx.log_count(), 2);

        // Each log is a complete, uninterleaved record of its own run.
        for report in [&ra, &rb] {
            let content = std::fs::read_to_string(&report.run.log_path).unwrap();
            assert_eq!(content.matches("=== artifact:").count(), 1);
            assert_eq!(content.matches("=== exit code:").count(), 1);
        }
    }
}
