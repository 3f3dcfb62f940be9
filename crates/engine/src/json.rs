//! Lenient JSON extraction from model output.
//!
//! Models asked for JSON routinely wrap it in markdown fences or surround it
//! with commentary. Call sites that parse model output go through here so
//! the leniency is uniform; what each component does on failure (fallback
//! decision, score 0, accept) stays at the call site.

use colloquy_core::{AppError, AppResult};
use serde::de::DeserializeOwned;

/// Parse a JSON value out of raw model output.
///
/// Strips markdown code fences, then falls back to the first `{`..`}` span
/// if the whole remainder still does not parse.
pub(crate) fn parse_model_json<T: DeserializeOwned>(raw: &str) -> AppResult<T> {
    let cleaned = raw
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
                if start < end {
                    if let Ok(value) = serde_json::from_str(&cleaned[start..=end]) {
                        return Ok(value);
                    }
                }
            }
            Err(AppError::Serialization(format!(
                "Model output is not valid JSON: {}",
                first_err
            )))
        }
    }
}
