//! Artifact Store
//!
//! Holds uploaded artifacts under collision-resistant names until their
//! analysis run completes. Deletion is best-effort: a failed delete is an
//! operator concern, never a request error.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Fallback extension when the client's filename carries none
const DEFAULT_EXT: &str = "bin";

/// Maximum length of a client-supplied extension we will reproduce
const MAX_EXT_LEN: usize = 16;

/// A transient uploaded artifact, owned exclusively by the request that
/// created it. Deleted when the orchestrator completes, regardless of
/// outcome; never read after deletion.
#[derive(Debug)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub received_at: DateTime<Utc>,
}

impl StoredArtifact {
    /// Server-generated file name of the stored artifact
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Writes uploads into a single directory under server-generated names.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Persist the uploaded bytes under a collision-resistant name.
    ///
    /// The name is `<millis>_<random>.<ext>`. Millisecond resolution alone
    /// is not trusted to be unique under concurrent uploads, so a random
    /// suffix is always appended. Only a sanitized extension is taken from
    /// the client's filename; everything else is server-controlled.
    pub async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
    ) -> std::io::Result<StoredArtifact> {
        let received_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let filename = format!(
            "{}_{}.{}",
            received_at.timestamp_millis(),
            &suffix[..8],
            sanitize_extension(original_name),
        );
        let path = self.dir.join(filename);

        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(artifact = %path.display(), size = bytes.len(), "stored artifact");

        Ok(StoredArtifact { path, received_at })
    }

    /// Best-effort delete of a stored artifact.
    ///
    /// Failure must not fail an otherwise-successful analysis response, so
    /// the outcome is only logged.
    pub async fn release(&self, artifact: &StoredArtifact) {
        match tokio::fs::remove_file(&artifact.path).await {
            Ok(()) => {
                tracing::debug!(artifact = %artifact.path.display(), "artifact released");
            }
            Err(e) => {
                tracing::warn!(
                    artifact = %artifact.path.display(),
                    error = %e,
                    "failed to release artifact"
                );
            }
        }
    }
}

/// Reduce a client filename to a safe ASCII-alphanumeric extension.
fn sanitize_extension(original_name: &str) -> String {
    let ext: String = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(DEFAULT_EXT)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXT_LEN)
        .collect();

    if ext.is_empty() {
        DEFAULT_EXT.to_string()
    } else {
        ext
    }
}

// ============================================================================
// TESTS
// ============================================================================
