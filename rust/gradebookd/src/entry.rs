//! Interpretation of score-entry cells.
//!
//! A cell is a JSON number, a numeric string, or a sentinel token meaning the
//! student has no score (absent / not applicable). No score is NULL, never 0.

use crate::calc::round_2dp;
use crate::error::{EngineError, EngineResult};
use serde_json::Value;

const ABSENT_TOKENS: &[&str] = &[
    "",
    "-",
    "a",
    "abs",
    "absent",
    "n/a",
    "na",
    "not applicable",
    "null",
];

/// Strict parse: unknown tokens are a `ValueParse` error.
pub fn parse_cell(raw: &Value) -> EngineResult<Option<f64>> {
    match raw {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| EngineError::ValueParse { raw: n.to_string() }),
        Value::String(s) => {
            let t = s.trim();
            if ABSENT_TOKENS.iter().any(|tok| t.eq_ignore_ascii_case(tok)) {
                return Ok(None);
            }
            // Comma decimal separators are common in typed-in marks.
            let normalized = t.replace(',', ".");
            match normalized.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Some(v)),
                _ => Err(EngineError::ValueParse { raw: s.clone() }),
            }
        }
        other => Err(EngineError::ValueParse {
            raw: other.to_string(),
        }),
    }
}

#[derive(Debug)]
pub struct ResolvedCell {
    pub score: Option<f64>,
    /// Set when the cell could not be read and was stored as no score.
    pub parse_error: Option<EngineError>,
}

/// Tolerant parse used by score entry. Unreadable cells become NULL with the
/// parse error attached; numeric values outside `[0, max_score]` are rejected.
pub fn resolve_cell(raw: &Value, max_score: f64) -> EngineResult<ResolvedCell> {
    let score = match parse_cell(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable score cell stored as no score");
            return Ok(ResolvedCell {
                score: None,
                parse_error: Some(e),
            });
        }
    };
    let score = match score {
        Some(v) => {
            let v = round_2dp(v);
            if v < 0.0 || v > max_score {
                return Err(EngineError::OutOfRange {
                    score: v,
                    max_score,
                });
            }
            Some(v)
        }
        None => None,
    };
    Ok(ResolvedCell {
        score,
        parse_error: None,
    })
}
