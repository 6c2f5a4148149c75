//! Classifier Process Adapter
//!
//! Wraps one invocation of the external classification engine. The adapter
//! never interprets the engine's output; it streams both standard streams
//! into the run's audit log and in-memory buffers as they arrive, then
//! observes termination.
//!
//! Invocations are serialized: the engine's observed behavior scans a shared
//! directory for input, so two concurrent runs would race on that ambient
//! state. The artifact path is still passed as an explicit trailing argument
//! so an engine that honors it never has to guess.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};

use super::runlog::RunLog;

/// Read granularity for the stream pumps
const CHUNK_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn engine `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("engine stream was not captured")]
    StreamMissing,

    #[error("failed to await engine exit: {0}")]
    Wait(std::io::Error),
}

/// Everything observed from one engine run.
#[derive(Debug)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the engine was killed by a signal
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineStream {
    Stdout,
    Stderr,
}

/// Spawns the external engine. Clones share the serialization lock.
#[derive(Debug, Clone)]
pub struct EngineAdapter {
    command: String,
    args: Vec<String>,
    lock: Arc<Mutex<()>>,
}

impl EngineAdapter {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run one analysis: spawn the engine, stream its output into the audit
    /// log and accumulation buffers, and report the captured text plus exit
    /// status. At most one invocation is in flight at a time.
    pub async fn invoke(
        &self,
        artifact_path: &Path,
        log: &mut RunLog,
    ) -> Result<EngineOutput, EngineError> {
        let _serial = self.lock.lock().await;

        tracing::debug!(
            command = %self.command,
            artifact = %artifact_path.display(),
            "spawning engine"
        );
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .arg(artifact_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        let stdout = child.stdout.take().ok_or(EngineError::StreamMissing)?;
        let stderr = child.stderr.take().ok_or(EngineError::StreamMissing)?;

        // Both streams are drained as the engine writes, so a verbose engine
        // never blocks on a full pipe. Each pump preserves its own stream's
        // order; interleaving between streams is arrival order.
        let (tx, mut rx) = mpsc::channel::<(EngineStream, Vec<u8>)>(64);
        let stdout_pump = tokio::spawn(pump(stdout, EngineStream::Stdout, tx.clone()));
        let stderr_pump = tokio::spawn(pump(stderr, EngineStream::Stderr, tx));

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        while let Some((stream, chunk)) = rx.recv().await {
            // A degraded audit record must not fail the run itself.
            if let Err(e) = log.append(&chunk).await {
                tracing::error!(error = %e, "failed to append engine output to audit log");
            }
            match stream {
                EngineStream::Stdout => stdout_buf.extend_from_slice(&chunk),
                EngineStream::Stderr => stderr_buf.extend_from_slice(&chunk),
            }
        }
        let _ = stdout_pump.await;
        let _ = stderr_pump.await;

        let status = child.wait().await.map_err(EngineError::Wait)?;
        tracing::debug!(exit_code = ?status.code(), "engine exited");

        Ok(EngineOutput {
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            exit_code: status.code(),
        })
    }
}

/// Forward one stream chunk by chunk until EOF.
async fn pump<R: AsyncRead + Unpin>(
    mut reader: R,
    stream: EngineStream,
    tx: mpsc::Sender<(EngineStream, Vec<u8>)>,
) {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send((stream, buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, stream = ?stream, "engine stream read failed");
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
