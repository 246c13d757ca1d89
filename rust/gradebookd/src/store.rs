//! Grade sheet and score record rows. Rows are created lazily and
//! idempotently; derived columns are only written by the engine.

use crate::calc::SheetTotals;
use crate::error::{EngineError, EngineResult};
use crate::exams::{load_exam, ExamInstance};
use crate::roster::load_class;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

/// The (exam instance, class, academic year) triple bounding ranks and stats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub exam_id: String,
    pub class_id: String,
    pub academic_year: String,
}

impl Scope {
    pub fn new(exam: &ExamInstance, class_id: &str) -> Self {
        Self {
            exam_id: exam.id.clone(),
            class_id: class_id.to_string(),
            academic_year: exam.academic_year.clone(),
        }
    }
}

/// Loads the exam and checks the class belongs to the same school year.
pub fn resolve_scope(
    conn: &Connection,
    exam_id: &str,
    class_id: &str,
) -> EngineResult<(ExamInstance, Scope)> {
    let exam = load_exam(conn, exam_id)?;
    let class = load_class(conn, class_id)?;
    if class.tenant_id != exam.tenant_id || class.academic_year != exam.academic_year {
        return Err(EngineError::InvalidInput(format!(
            "class {} ({}) is not part of exam {} ({})",
            class.name, class.academic_year, exam.name, exam.academic_year
        )));
    }
    let scope = Scope::new(&exam, class_id);
    Ok((exam, scope))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheet {
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    pub class_id: String,
    pub academic_year: String,
    pub total_score: Option<f64>,
    pub credits_attempted: Option<f64>,
    pub credits_obtained: Option<f64>,
    pub average: Option<f64>,
    pub remark: String,
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: String,
    pub grade_sheet_id: String,
    pub class_subject_id: String,
    pub score: Option<f64>,
    pub rank: Option<i64>,
    pub exam_taken: bool,
    pub observation: String,
}

const SHEET_COLUMNS: &str = "id, student_id, exam_id, class_id, academic_year, total_score,
    credits_attempted, credits_obtained, average, remark, rank";

fn sheet_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<GradeSheet> {
    Ok(GradeSheet {
        id: r.get(0)?,
        student_id: r.get(1)?,
        exam_id: r.get(2)?,
        class_id: r.get(3)?,
        academic_year: r.get(4)?,
        total_score: r.get(5)?,
        credits_attempted: r.get(6)?,
        credits_obtained: r.get(7)?,
        average: r.get(8)?,
        remark: r.get(9)?,
        rank: r.get(10)?,
    })
}

fn record_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreRecord> {
    Ok(ScoreRecord {
        id: r.get(0)?,
        grade_sheet_id: r.get(1)?,
        class_subject_id: r.get(2)?,
        score: r.get(3)?,
        rank: r.get(4)?,
        exam_taken: r.get::<_, i64>(5)? != 0,
        observation: r.get(6)?,
    })
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn get_or_create_sheet(
    conn: &Connection,
    student_id: &str,
    scope: &Scope,
) -> EngineResult<String> {
    conn.execute(
        "INSERT INTO grade_sheets(id, student_id, exam_id, class_id, academic_year, remark)
         VALUES(?, ?, ?, ?, ?, '')
         ON CONFLICT(student_id, exam_id, class_id, academic_year) DO NOTHING",
        (
            Uuid::new_v4().to_string(),
            student_id,
            &scope.exam_id,
            &scope.class_id,
            &scope.academic_year,
        ),
    )?;
    let id = conn.query_row(
        "SELECT id FROM grade_sheets
         WHERE student_id = ? AND exam_id = ? AND class_id = ? AND academic_year = ?",
        (
            student_id,
            &scope.exam_id,
            &scope.class_id,
            &scope.academic_year,
        ),
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn load_sheet(conn: &Connection, sheet_id: &str) -> EngineResult<GradeSheet> {
    let sql = format!("SELECT {} FROM grade_sheets WHERE id = ?", SHEET_COLUMNS);
    conn.query_row(&sql, [sheet_id], sheet_from_row)
        .optional()?
        .ok_or_else(|| EngineError::not_found("grade sheet", sheet_id))
}

pub fn find_sheet(
    conn: &Connection,
    student_id: &str,
    scope: &Scope,
) -> EngineResult<Option<GradeSheet>> {
    let sql = format!(
        "SELECT {} FROM grade_sheets
         WHERE student_id = ? AND exam_id = ? AND class_id = ? AND academic_year = ?",
        SHEET_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            (
                student_id,
                &scope.exam_id,
                &scope.class_id,
                &scope.academic_year,
            ),
            sheet_from_row,
        )
        .optional()?)
}

/// Sheets in creation order; ranking relies on this for tie order.
pub fn sheets_in_scope(conn: &Connection, scope: &Scope) -> EngineResult<Vec<GradeSheet>> {
    let sql = format!(
        "SELECT {} FROM grade_sheets
         WHERE exam_id = ? AND class_id = ? AND academic_year = ?
         ORDER BY rowid",
        SHEET_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let sheets = stmt
        .query_map(
            (&scope.exam_id, &scope.class_id, &scope.academic_year),
            sheet_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sheets)
}

/// Every scope with at least one grade sheet for the tenant's exams.
pub fn scopes_for_tenant(conn: &Connection, tenant_id: &str) -> EngineResult<Vec<Scope>> {
    let mut stmt = conn.prepare(
        "SELECT gs.exam_id, gs.class_id, gs.academic_year
         FROM grade_sheets gs
         JOIN exams e ON e.id = gs.exam_id
         WHERE e.tenant_id = ?
         GROUP BY gs.exam_id, gs.class_id, gs.academic_year
         ORDER BY MIN(gs.rowid)",
    )?;
    let scopes = stmt
        .query_map([tenant_id], |r| {
            Ok(Scope {
                exam_id: r.get(0)?,
                class_id: r.get(1)?,
                academic_year: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scopes)
}

pub fn write_sheet_totals(
    conn: &Connection,
    sheet_id: &str,
    totals: &SheetTotals,
) -> EngineResult<()> {
    let changed = conn.execute(
        "UPDATE grade_sheets SET
           total_score = ?, credits_attempted = ?, credits_obtained = ?,
           average = ?, remark = ?, updated_at = ?
         WHERE id = ?",
        (
            totals.total_score,
            totals.credits_attempted,
            totals.credits_obtained,
            totals.average,
            totals.remark.as_str(),
            now_stamp(),
            sheet_id,
        ),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("grade sheet", sheet_id));
    }
    Ok(())
}

/// One prepared statement for the whole batch.
pub fn write_sheet_ranks(conn: &Connection, ranks: &[(String, Option<i64>)]) -> EngineResult<()> {
    let mut stmt = conn.prepare("UPDATE grade_sheets SET rank = ? WHERE id = ?")?;
    for (id, rank) in ranks {
        stmt.execute((rank, id))?;
    }
    Ok(())
}

pub fn get_or_create_record(
    conn: &Connection,
    sheet_id: &str,
    class_subject_id: &str,
) -> EngineResult<String> {
    conn.execute(
        "INSERT INTO score_records(id, grade_sheet_id, class_subject_id, exam_taken, observation)
         VALUES(?, ?, ?, 0, '')
         ON CONFLICT(grade_sheet_id, class_subject_id) DO NOTHING",
        (Uuid::new_v4().to_string(), sheet_id, class_subject_id),
    )?;
    let id = conn.query_row(
        "SELECT id FROM score_records WHERE grade_sheet_id = ? AND class_subject_id = ?",
        (sheet_id, class_subject_id),
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn records_for_sheet(conn: &Connection, sheet_id: &str) -> EngineResult<Vec<ScoreRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, grade_sheet_id, class_subject_id, score, rank, exam_taken, observation
         FROM score_records WHERE grade_sheet_id = ? ORDER BY rowid",
    )?;
    let records = stmt
        .query_map([sheet_id], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// One subject's records across the scope, in creation order.
pub fn records_in_scope(
    conn: &Connection,
    scope: &Scope,
    class_subject_id: &str,
) -> EngineResult<Vec<ScoreRecord>> {
    let mut stmt = conn.prepare(
        "SELECT sr.id, sr.grade_sheet_id, sr.class_subject_id, sr.score, sr.rank,
                sr.exam_taken, sr.observation
         FROM score_records sr
         JOIN grade_sheets gs ON gs.id = sr.grade_sheet_id
         WHERE gs.exam_id = ? AND gs.class_id = ? AND gs.academic_year = ?
           AND sr.class_subject_id = ?
         ORDER BY sr.rowid",
    )?;
    let records = stmt
        .query_map(
            (
                &scope.exam_id,
                &scope.class_id,
                &scope.academic_year,
                class_subject_id,
            ),
            record_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Stores the score and its observation. Never touches the parent sheet.
pub fn write_record_score(
    conn: &Connection,
    record_id: &str,
    score: Option<f64>,
    observation: &str,
) -> EngineResult<()> {
    let changed = conn.execute(
        "UPDATE score_records SET score = ?, exam_taken = ?, observation = ?, updated_at = ?
         WHERE id = ?",
        (
            score,
            score.is_some() as i64,
            observation,
            now_stamp(),
            record_id,
        ),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("score record", record_id));
    }
    Ok(())
}

pub fn write_record_ranks(
    conn: &Connection,
    ranks: &[(String, Option<i64>)],
) -> EngineResult<()> {
    let mut stmt = conn.prepare("UPDATE score_records SET rank = ? WHERE id = ?")?;
    for (id, rank) in ranks {
        stmt.execute((rank, id))?;
    }
    Ok(())
}

/// Every class subject of the class, active or not, in class order.
pub fn class_subject_ids(conn: &Connection, class_id: &str) -> EngineResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT id FROM class_subjects WHERE class_id = ? ORDER BY rowid")?;
    let ids = stmt
        .query_map([class_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}
