//! Analysis domain types

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

/// Structured classification produced by the engine.
///
/// Immutable once constructed. `probabilities` is the engine's own table,
/// not renormalized; drift away from sum 1.0 is logged, never corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Predicted class label, e.g. `Adware` or `Lành Tính`
    pub prediction: String,

    /// Confidence ratio in `[0, 1]`
    pub confidence: f64,

    /// Per-label probability table (not guaranteed normalized)
    pub probabilities: BTreeMap<String, f64>,
}

/// Terminal verdict of a successfully parsed engine run.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisVerdict {
    /// The engine found no artifact to analyze. A valid terminal outcome,
    /// success-shaped but carrying no classification.
    NoArtifact,

    /// The engine produced a classification.
    Classification(ClassificationResult),
}

// ============================================================================
// ANALYSIS RUN
// ============================================================================

/// Terminal and in-flight states of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Succeeded,
    EngineFailed,
    ParseFailed,
}

/// One end-to-end analysis attempt.
///
/// `id` and `log_path` are fixed at creation; `state` is written exactly
/// once when the run reaches a terminal state.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    /// Creation timestamp in milliseconds, strictly increasing across runs
    pub id: i64,

    /// Audit log file for this run, fixed at creation
    pub log_path: PathBuf,

    pub state: RunState,
}

impl AnalysisRun {
    pub fn new(id: i64, log_path: PathBuf) -> Self {
        Self {
            id,
            log_path,
            state: RunState::Running,
        }
    }

    /// Record the terminal state. Single assignment by contract.
    pub fn complete(mut self, state: RunState) -> Self {
        debug_assert_eq!(self.state, RunState::Running);
        self.state = state;
        self
    }
}

// ============================================================================
// AUDIT LOG LISTING
// ============================================================================

/// Directory-listing view of one audit log file.
///
/// Derived from filesystem metadata on each listing request, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}
