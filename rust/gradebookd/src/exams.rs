//! Exam instances at every tier and the weight links between tiers.

use crate::error::{EngineError, EngineResult};
use crate::tier::Tier;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamInstance {
    pub id: String,
    pub tenant_id: String,
    pub academic_year: String,
    pub name: String,
    pub tier: Tier,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightLink {
    pub child_exam_id: String,
    pub weight: f64,
}

type ExamRow = (String, String, String, String, i64, f64);

fn exam_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ExamRow> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
}

fn build_exam(raw: ExamRow) -> EngineResult<ExamInstance> {
    let (id, tenant_id, academic_year, name, tier, max_score) = raw;
    Ok(ExamInstance {
        id,
        tenant_id,
        academic_year,
        name,
        tier: Tier::from_level(tier)?,
        max_score,
    })
}

pub fn load_exam(conn: &Connection, exam_id: &str) -> EngineResult<ExamInstance> {
    let raw = conn
        .query_row(
            "SELECT id, tenant_id, academic_year, name, tier, max_score FROM exams WHERE id = ?",
            [exam_id],
            exam_from_row,
        )
        .optional()?;
    match raw {
        Some(raw) => build_exam(raw),
        None => Err(EngineError::not_found("exam", exam_id)),
    }
}

pub fn create_exam(
    conn: &Connection,
    tenant_id: &str,
    academic_year: &str,
    name: &str,
    tier: Tier,
    max_score: f64,
) -> EngineResult<String> {
    if !max_score.is_finite() || max_score <= 0.0 {
        return Err(EngineError::InvalidInput("maxScore must be > 0".into()));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput("name must not be empty".into()));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, tenant_id, academic_year, name, tier, max_score)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, tenant_id, academic_year.trim(), name, tier.level(), max_score),
    )?;
    tracing::info!(exam_id = %id, tier = tier.as_str(), name, "exam instance created");
    Ok(id)
}

pub fn list_exams(
    conn: &Connection,
    tenant_id: &str,
    academic_year: Option<&str>,
) -> EngineResult<Vec<ExamInstance>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, academic_year, name, tier, max_score FROM exams
         WHERE tenant_id = ?1 AND (?2 IS NULL OR academic_year = ?2)
         ORDER BY tier, rowid",
    )?;
    let raws = stmt
        .query_map((tenant_id, academic_year), exam_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    raws.into_iter().map(build_exam).collect()
}

/// Links a child exam into a composite one tier above it. Re-linking updates
/// the weight.
pub fn link(
    conn: &Connection,
    parent_exam_id: &str,
    child_exam_id: &str,
    weight: f64,
) -> EngineResult<()> {
    if !(0.0..=1.0).contains(&weight) {
        return Err(EngineError::InvalidInput(format!(
            "weight must be within [0, 1] (got {})",
            weight
        )));
    }
    let parent = load_exam(conn, parent_exam_id)?;
    let child = load_exam(conn, child_exam_id)?;
    if parent.tier.child() != Some(child.tier) {
        return Err(EngineError::InvalidInput(format!(
            "a {} exam cannot include a {} exam",
            parent.tier.as_str(),
            child.tier.as_str()
        )));
    }
    if parent.tenant_id != child.tenant_id || parent.academic_year != child.academic_year {
        return Err(EngineError::InvalidInput(
            "linked exams must share school and academic year".into(),
        ));
    }
    conn.execute(
        "INSERT INTO weight_links(parent_exam_id, child_exam_id, weight) VALUES(?, ?, ?)
         ON CONFLICT(parent_exam_id, child_exam_id) DO UPDATE SET weight = excluded.weight",
        (parent_exam_id, child_exam_id, weight),
    )?;
    Ok(())
}

pub fn weight_links(conn: &Connection, parent_exam_id: &str) -> EngineResult<Vec<WeightLink>> {
    let mut stmt = conn.prepare(
        "SELECT child_exam_id, weight FROM weight_links WHERE parent_exam_id = ? ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([parent_exam_id], |r| {
            Ok(WeightLink {
                child_exam_id: r.get(0)?,
                weight: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Composite exams that read from `child_exam_id`.
pub fn parents_of(conn: &Connection, child_exam_id: &str) -> EngineResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT parent_exam_id FROM weight_links WHERE child_exam_id = ? ORDER BY rowid",
    )?;
    let ids = stmt
        .query_map([child_exam_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}
