//! Read model for one class's results in one exam instance: subjects with
//! their statistics, each student's grades, and the overall row.

use crate::cache::{CachedStat, StatItem, StatKey, StatsCache};
use crate::context::EngineContext;
use crate::error::EngineResult;
use crate::exams::ExamInstance;
use crate::stats::{self, ClassOverallStat, ClassSubjectStat};
use crate::store::{self, GradeSheet, Scope};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectColumn {
    pub class_subject_id: String,
    pub code: String,
    pub name: String,
    pub credit: f64,
    pub stat: Option<ClassSubjectStat>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGrade {
    pub class_subject_id: String,
    pub score: Option<f64>,
    pub rank: Option<i64>,
    /// Band letter; empty when there is no score.
    pub grade: String,
    pub observation: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub student_id: String,
    pub display_name: String,
    pub sheet: GradeSheet,
    pub grades: Vec<SubjectGrade>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsSheet {
    pub scope: Scope,
    pub exam_name: String,
    pub tier: crate::tier::Tier,
    pub subjects: Vec<SubjectColumn>,
    /// Ordered by rank, unranked sheets last.
    pub students: Vec<StudentRow>,
    pub overall: Option<ClassOverallStat>,
}

pub fn build_results_sheet(
    ctx: &EngineContext<'_>,
    exam: &ExamInstance,
    scope: &Scope,
) -> EngineResult<ResultsSheet> {
    let policy = ctx.policy(exam)?;

    let mut stmt = ctx.conn.prepare(
        "SELECT cs.id, s.code, s.name, cs.credit
         FROM class_subjects cs JOIN subjects s ON s.id = cs.subject_id
         WHERE cs.class_id = ? AND cs.is_active = 1
         ORDER BY cs.rowid",
    )?;
    let columns = stmt
        .query_map([&scope.class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, f64>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut subjects = Vec::with_capacity(columns.len());
    for (class_subject_id, code, name, credit) in columns {
        let stat = stats::read_class_subject_stat(ctx.conn, scope, &class_subject_id)?;
        subjects.push(SubjectColumn {
            class_subject_id,
            code,
            name,
            credit,
            stat,
        });
    }

    let mut name_stmt = ctx.conn.prepare(
        "SELECT id, last_name, first_name FROM students
         WHERE id IN (SELECT student_id FROM grade_sheets WHERE exam_id = ? AND class_id = ?)",
    )?;
    let names: HashMap<String, String> = name_stmt
        .query_map((&scope.exam_id, &scope.class_id), |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok((r.get::<_, String>(0)?, format!("{}, {}", last, first)))
        })?
        .collect::<Result<_, _>>()?;

    let mut students = Vec::new();
    for sheet in store::sheets_in_scope(ctx.conn, scope)? {
        let mut grades = Vec::new();
        for r in store::records_for_sheet(ctx.conn, &sheet.id)? {
            let grade = match r.score {
                Some(v) => policy.letter(v)?.to_string(),
                None => String::new(),
            };
            grades.push(SubjectGrade {
                class_subject_id: r.class_subject_id,
                score: r.score,
                rank: r.rank,
                grade,
                observation: r.observation,
            });
        }
        students.push(StudentRow {
            display_name: names.get(&sheet.student_id).cloned().unwrap_or_default(),
            student_id: sheet.student_id.clone(),
            sheet,
            grades,
        });
    }
    students.sort_by_key(|s| s.sheet.rank.unwrap_or(i64::MAX));

    Ok(ResultsSheet {
        scope: scope.clone(),
        exam_name: exam.name.clone(),
        tier: exam.tier,
        subjects,
        students,
        overall: stats::read_class_overall_stat(ctx.conn, scope)?,
    })
}

fn key(exam: &ExamInstance, scope: &Scope, item: StatItem) -> StatKey {
    StatKey {
        scope: scope.clone(),
        tier: exam.tier,
        item,
    }
}

pub fn cached_results_sheet(
    ctx: &EngineContext<'_>,
    cache: &mut StatsCache,
    exam: &ExamInstance,
    scope: &Scope,
) -> EngineResult<ResultsSheet> {
    let k = key(exam, scope, StatItem::Results);
    if let Some(CachedStat::Results(sheet)) = cache.get(&k) {
        return Ok(*sheet);
    }
    let sheet = build_results_sheet(ctx, exam, scope)?;
    cache.put(k, CachedStat::Results(Box::new(sheet.clone())));
    Ok(sheet)
}

pub fn cached_subject_stat(
    ctx: &EngineContext<'_>,
    cache: &mut StatsCache,
    exam: &ExamInstance,
    scope: &Scope,
    class_subject_id: &str,
) -> EngineResult<Option<ClassSubjectStat>> {
    let k = key(exam, scope, StatItem::Subject(class_subject_id.to_string()));
    if let Some(CachedStat::Subject(stat)) = cache.get(&k) {
        return Ok(stat);
    }
    let stat = stats::read_class_subject_stat(ctx.conn, scope, class_subject_id)?;
    cache.put(k, CachedStat::Subject(stat.clone()));
    Ok(stat)
}

pub fn cached_overall_stat(
    ctx: &EngineContext<'_>,
    cache: &mut StatsCache,
    exam: &ExamInstance,
    scope: &Scope,
) -> EngineResult<Option<ClassOverallStat>> {
    let k = key(exam, scope, StatItem::Overall);
    if let Some(CachedStat::Overall(stat)) = cache.get(&k) {
        return Ok(stat);
    }
    let stat = stats::read_class_overall_stat(ctx.conn, scope)?;
    cache.put(k, CachedStat::Overall(stat.clone()));
    Ok(stat)
}
