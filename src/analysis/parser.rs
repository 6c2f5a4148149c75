//! Result Parser
//!
//! Pure function from the engine's free-form diagnostic text to a structured
//! verdict. The engine prints a line-oriented Vietnamese protocol with no
//! formal grammar guarantee, so every violation is an explicit error rather
//! than a silent correction.
//!
//! Expected shape (order-independent except the probability block):
//!
//! ```text
//! Kết Quả Phân Tích:
//! Phân Loại: Adware
//! Độ Tin Cậy: 87.50%
//!
//! Xác Suất Các Lớp:
//! Adware: 87.50%
//! Lành Tính: 12.50%
//! ```

use std::collections::BTreeMap;

use super::types::{AnalysisVerdict, ClassificationResult};

/// Line announcing that the engine found nothing to analyze
const NO_ARTIFACT_SENTINEL: &str = "Không tìm thấy file APK để phân tích";

/// Prefix of the prediction line
const PREDICTION_KEY: &str = "Phân Loại:";

/// Prefix of the confidence line
const CONFIDENCE_KEY: &str = "Độ Tin Cậy:";

/// Line opening the probability block
const PROBABILITIES_KEY: &str = "Xác Suất Các Lớp:";

/// Tolerated drift of the probability sum away from 1.0 before a warning
const SUM_DRIFT_TOLERANCE: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("engine output is missing the prediction or confidence line")]
    MissingFields {
        /// Complete unparsed text, kept for diagnosis
        raw: String,
    },

    #[error("malformed percentage in line `{line}`")]
    BadPercent { line: String },

    #[error("ratio {ratio} from line `{line}` is outside [0, 1]")]
    OutOfRange { line: String, ratio: f64 },
}

/// Parse the engine's captured stdout into a verdict.
pub fn parse(raw: &str) -> Result<AnalysisVerdict, ParseError> {
    let mut prediction: Option<String> = None;
    let mut confidence: Option<f64> = None;
    let mut probabilities: BTreeMap<String, f64> = BTreeMap::new();
    let mut in_probabilities = false;

    for line in raw.lines() {
        let line = line.trim();

        if line.starts_with(NO_ARTIFACT_SENTINEL) {
            return Ok(AnalysisVerdict::NoArtifact);
        }

        if in_probabilities {
            if let Some((label, ratio)) = probability_line(line)? {
                probabilities.insert(label, ratio);
                continue;
            }
            // First non-matching line closes the block.
            in_probabilities = false;
        }

        if let Some(rest) = line.strip_prefix(PREDICTION_KEY) {
            prediction = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(CONFIDENCE_KEY) {
            confidence = Some(parse_percent(rest, line)?);
        } else if line == PROBABILITIES_KEY {
            in_probabilities = true;
        }
    }

    let (Some(prediction), Some(confidence)) = (prediction, confidence) else {
        return Err(ParseError::MissingFields {
            raw: raw.to_string(),
        });
    };

    // The table is producer-provided; log drift, do not renormalize.
    if !probabilities.is_empty() {
        let sum: f64 = probabilities.values().sum();
        if (sum - 1.0).abs() > SUM_DRIFT_TOLERANCE {
            tracing::warn!(sum, "probability table drifts from 1.0");
        }
    }

    Ok(AnalysisVerdict::Classification(ClassificationResult {
        prediction,
        confidence,
        probabilities,
    }))
}

/// Match a `<label>: <percent>%` line inside the probability block.
///
/// Returns `Ok(None)` when the line does not fit the pattern (which closes
/// the block); percent values that fit but violate the range still error.
fn probability_line(line: &str) -> Result<Option<(String, f64)>, ParseError> {
    let Some((label, value)) = line.rsplit_once(':') else {
        return Ok(None);
    };
    let label = label.trim();
    let value = value.trim();
    if label.is_empty() || !value.ends_with('%') {
        return Ok(None);
    }
    // A pattern match with an unparsable number is a grammar violation,
    // not a block terminator.
    let ratio = parse_percent(value, line)?;
    Ok(Some((label.to_string(), ratio)))
}

/// Parse `<decimal>%` into a ratio, range-checked but never clamped.
fn parse_percent(value: &str, line: &str) -> Result<f64, ParseError> {
    let percent = value
        .trim()
        .strip_suffix('%')
        .ok_or_else(|| ParseError::BadPercent {
            line: line.to_string(),
        })?
        .trim()
        .parse::<f64>()
        .map_err(|_| ParseError::BadPercent {
            line: line.to_string(),
        })?;

    let ratio = percent / 100.0;
    if !(0.0..=1.0).contains(&ratio) {
        return Err(ParseError::OutOfRange {
            line: line.to_string(),
            ratio,
        });
    }
    Ok(ratio)
}

// ============================================================================
// TESTS
// ============================================================================
