//! Error taxonomy for the grade engine.

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Score falls outside every configured band. Never defaulted.
    #[error("score {score} is not covered by any grading band")]
    Policy { score: f64 },

    #[error("grading policy is invalid: {0}")]
    InvalidPolicy(String),

    #[error("error calculating totals and average: {0}")]
    GradeCalculation(String),

    #[error("error calculating rank: {0}")]
    RankCalculation(String),

    #[error("class subject {class_subject_id} is full ({current}/{max})")]
    Capacity {
        class_subject_id: String,
        max: i64,
        current: i64,
    },

    #[error("could not interpret score value {raw:?}")]
    ValueParse { raw: String },

    #[error("score {score} is outside [0, {max_score}]")]
    OutOfRange { score: f64, max_score: f64 },

    #[error("{what} not found")]
    NotFound { what: &'static str, id: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Policy { .. } => "policy_error",
            EngineError::InvalidPolicy(_) => "bad_policy",
            EngineError::GradeCalculation(_) => "grade_calculation_failed",
            EngineError::RankCalculation(_) => "rank_calculation_failed",
            EngineError::Capacity { .. } => "capacity_full",
            EngineError::ValueParse { .. } => "value_parse_failed",
            EngineError::OutOfRange { .. } => "score_out_of_range",
            EngineError::NotFound { .. } => "not_found",
            EngineError::InvalidInput(_) => "bad_params",
            EngineError::Db(e) if is_busy(e) => "db_busy",
            EngineError::Db(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::Policy { score } => Some(json!({ "score": score })),
            EngineError::Capacity {
                class_subject_id,
                max,
                current,
            } => Some(json!({
                "classSubjectId": class_subject_id,
                "max": max,
                "current": current
            })),
            EngineError::ValueParse { raw } => Some(json!({ "raw": raw })),
            EngineError::OutOfRange { score, max_score } => {
                Some(json!({ "score": score, "maxScore": max_score }))
            }
            EngineError::NotFound { what, id } => Some(json!({ "entity": what, "id": id })),
            _ => None,
        }
    }

    /// Wrap a failure raised while computing totals. Policy errors stay as they are.
    pub fn into_grade_calculation(self) -> Self {
        match self {
            e @ (EngineError::Policy { .. }
            | EngineError::GradeCalculation(_)
            | EngineError::RankCalculation(_)) => e,
            other => EngineError::GradeCalculation(other.to_string()),
        }
    }

    pub fn into_rank_calculation(self) -> Self {
        match self {
            e @ (EngineError::Policy { .. }
            | EngineError::GradeCalculation(_)
            | EngineError::RankCalculation(_)) => e,
            other => EngineError::RankCalculation(other.to_string()),
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}
