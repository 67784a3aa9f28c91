//! Turning raw model text into an [`AnalysisResult`].

use serde_json::Value;
use tracing::{debug, warn};

use super::mode::AnalysisMode;
use super::types::{AnalysisResult, OperationalAnalysis, ParseFailure, StandardAnalysis};

/// Remove Markdown code-fence markers and surrounding whitespace.
///
/// Idempotent: clean text passes through unchanged.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse model output for `mode`.
///
/// Never fails: text that is not a JSON object comes back as
/// [`AnalysisResult::Degraded`] with the cleaned text attached. An object
/// that does not fit the typed shape for `mode` is kept as
/// [`AnalysisResult::Unstructured`].
pub fn normalize(raw_text: &str, mode: AnalysisMode) -> AnalysisResult {
    let cleaned = strip_code_fences(raw_text);

    let value: Value = match serde_json::from_str(&cleaned) {
        Ok(value) => value,
        Err(e) => return degraded(mode, format!("invalid JSON: {e}"), cleaned),
    };

    let Value::Object(fields) = value else {
        return degraded(mode, "expected a JSON object".to_string(), cleaned);
    };

    let typed = Value::Object(fields.clone());
    let parsed = match mode {
        AnalysisMode::Standard => {
            serde_json::from_value::<StandardAnalysis>(typed).map(AnalysisResult::Standard)
        }
        AnalysisMode::Operational => {
            serde_json::from_value::<OperationalAnalysis>(typed).map(AnalysisResult::Operational)
        }
    };

    parsed.unwrap_or_else(|e| {
        debug!(%mode, error = %e, "model output does not fit the typed shape; keeping it verbatim");
        AnalysisResult::Unstructured { mode, fields }
    })
}

fn degraded(mode: AnalysisMode, parsing_error: String, raw_text: String) -> AnalysisResult {
    warn!(%mode, error = %parsing_error, "model output could not be parsed; keeping raw text");
    AnalysisResult::Degraded {
        mode,
        failure: ParseFailure {
            parsing_error,
            raw_text,
        },
    }
}
