//! Run Logger
//!
//! One append-only audit record per analysis run, keyed by a monotonically
//! increasing identifier. Exposes listing (newest first) and retrieval with
//! path-traversal rejection.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::types::AuditLogEntry;

/// Audit log file extension
const LOG_EXT: &str = "log";

#[derive(Debug, thiserror::Error)]
pub enum LogReadError {
    #[error("log file name is invalid")]
    InvalidName,

    #[error("log file not found")]
    NotFound,

    #[error("failed to read log file: {0}")]
    Io(std::io::Error),
}

// ============================================================================
// RUN LOGGER
// ============================================================================

/// Creates and reads back per-run audit logs in a single directory.
///
/// Clones share the id counter, so run ids stay strictly increasing across
/// concurrent requests even when two land on the same millisecond.
#[derive(Debug, Clone)]
pub struct RunLogger {
    dir: PathBuf,
    last_id: Arc<AtomicI64>,
}

impl RunLogger {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            last_id: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Allocate the next run id: the current millisecond timestamp, bumped
    /// past the previously issued id when the clock has not advanced.
    pub fn next_run_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_id.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self.last_id.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Deterministic file name for a run id
    pub fn log_filename(&self, run_id: i64) -> String {
        format!("analysis_{}.{}", run_id, LOG_EXT)
    }

    /// Deterministic log path for a run id
    pub fn log_path(&self, run_id: i64) -> PathBuf {
        self.dir.join(self.log_filename(run_id))
    }

    /// Open a new audit record and write the header naming the artifact.
    pub async fn begin(&self, run_id: i64, artifact_name: &str) -> std::io::Result<RunLog> {
        let filename = self.log_filename(run_id);
        let path = self.dir.join(&filename);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("=== artifact: {} ===\n", artifact_name).as_bytes())
            .await?;

        tracing::debug!(run_id, log = %path.display(), "opened audit log");
        Ok(RunLog {
            path,
            filename,
            file,
        })
    }

    /// List audit logs newest first (strictly non-increasing timestamps,
    /// ties broken by filename so the order is total).
    pub async fn list(&self) -> std::io::Result<Vec<AuditLogEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |e| e == LOG_EXT) {
                let meta = entry.metadata().await?;
                let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
                entries.push(AuditLogEntry {
                    filename: entry.file_name().to_string_lossy().into_owned(),
                    timestamp: DateTime::<Utc>::from(modified),
                    size: meta.len(),
                });
            }
        }

        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(entries)
    }

    /// Read back one audit log by its server-generated name.
    ///
    /// Any name carrying path separators or `..` never reaches the
    /// filesystem; retrieval cannot escape the log directory.
    pub async fn read(&self, filename: &str) -> Result<String, LogReadError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(LogReadError::InvalidName);
        }

        match tokio::fs::read_to_string(self.dir.join(filename)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LogReadError::NotFound),
            Err(e) => Err(LogReadError::Io(e)),
        }
    }
}

// ============================================================================
// RUN LOG HANDLE
// ============================================================================

/// Open handle to one run's audit record.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    filename: String,
    file: File,
}

impl RunLog {
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Append a chunk of captured engine output as it arrives.
    pub async fn append(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes).await
    }

    /// Write the trailer recording the exit code and flush.
    ///
    /// `None` means the engine was killed by a signal or never produced a
    /// usable exit; the trailer records `unknown`.
    pub async fn finish(&mut self, exit_code: Option<i32>) -> std::io::Result<()> {
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        self.file
            .write_all(format!("=== exit code: {} ===\n", code).as_bytes())
            .await?;
        self.file.flush().await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn logger(dir: &TempDir) -> RunLogger {
        RunLogger::new(dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn test_log_format_header_body_trailer() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        let id = logger.next_run_id();
        let mut log = logger.begin(id, "123_abc.apk").await.unwrap();
        log.append(b"engine says hello\n").await.unwrap();
        log.append(b"and more\n").await.unwrap();
        log.finish(Some(0)).await.unwrap();

        let content = std::fs::read_to_string(logger.log_path(id)).unwrap();
        assert_eq!(
            content,
            "=== artifact: 123_abc.apk ===\nengine says hello\nand more\n=== exit code: 0 ===\n"
        );
    }

    #[tokio::test]
    async fn test_trailer_records_unknown_without_exit_code() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        let id = logger.next_run_id();
        let mut log = logger.begin(id, "a.apk").await.unwrap();
        log.finish(None).await.unwrap();

        let content = std::fs::read_to_string(logger.log_path(id)).unwrap();
        assert!(content.ends_with("=== exit code: unknown ===\n"));
    }

    #[tokio::test]
    async fn test_run_ids_strictly_increase() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        let mut prev = 0;
        for _ in 0..100 {
            let id = logger.next_run_id();
            assert!(id > prev);
            prev = id;
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        for _ in 0..3 {
            let id = logger.next_run_id();
            let mut log = logger.begin(id, "a.apk").await.unwrap();
            log.finish(Some(0)).await.unwrap();
            // mtime resolution on some filesystems is coarse
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let entries = logger.list().await.unwrap();
        assert_eq!(entries.len(), 3);
        for pair in entries.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let id = logger.next_run_id();
        let mut log = logger.begin(id, "a.apk").await.unwrap();
        log.finish(Some(0)).await.unwrap();

        let entries = logger.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, logger.log_filename(id));
    }

    #[tokio::test]
    async fn test_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        let id = logger.next_run_id();
        let mut log = logger.begin(id, "a.apk").await.unwrap();
        log.append(b"body\n").await.unwrap();
        log.finish(Some(2)).await.unwrap();

        let content = logger.read(&logger.log_filename(id)).await.unwrap();
        assert!(content.contains("body"));
        assert!(content.contains("exit code: 2"));
    }

    #[tokio::test]
    async fn test_read_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        for name in ["../secret.log", "..\\secret.log", "a/../b.log", "..", ""] {
            assert!(matches!(
                logger.read(name).await,
                Err(LogReadError::InvalidName)
            ));
        }
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        assert!(matches!(
            logger.read("analysis_999.log").await,
            Err(LogReadError::NotFound)
        ));
    }
}
