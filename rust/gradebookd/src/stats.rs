//! Class-level statistics, rebuilt in full from the scope's records and
//! sheets whenever something underneath changes.

use crate::calc::{round_2dp, Remark};
use crate::context::EngineContext;
use crate::error::EngineResult;
use crate::exams::load_exam;
use crate::policy::is_passing;
use crate::store::{self, Scope};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubjectStat {
    pub exam_id: String,
    pub class_id: String,
    pub class_subject_id: String,
    pub academic_year: String,
    pub max_score: f64,
    pub min_score: f64,
    pub avg_score: f64,
    pub num_sat: i64,
    pub num_passed: i64,
    pub percentage_passed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverallStat {
    pub exam_id: String,
    pub class_id: String,
    pub academic_year: String,
    pub num_students: i64,
    pub num_passes: i64,
    pub class_average: f64,
    pub overall_percentage_pass: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectFigures {
    pub max_score: f64,
    pub min_score: f64,
    pub avg_score: f64,
    pub num_sat: i64,
    pub num_passed: i64,
    pub percentage_passed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverallFigures {
    pub num_students: i64,
    pub num_passes: i64,
    pub class_average: f64,
    pub overall_percentage_pass: f64,
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_2dp(part as f64 / whole as f64 * 100.0)
    }
}

/// Figures over the scores actually sat. `None` when nobody sat.
pub fn subject_figures(scores: &[f64], pass_mark: f64) -> Option<SubjectFigures> {
    if scores.is_empty() {
        return None;
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let sum: f64 = scores.iter().sum();
    let num_sat = scores.len() as i64;
    let num_passed = scores.iter().filter(|s| is_passing(**s, pass_mark)).count() as i64;
    Some(SubjectFigures {
        max_score: round_2dp(max),
        min_score: round_2dp(min),
        avg_score: round_2dp(sum / num_sat as f64),
        num_sat,
        num_passed,
        percentage_passed: percentage(num_passed, num_sat),
    })
}

/// `averages` holds one entry per sheet in scope; sheets not yet computed
/// count as students but not towards the class average.
pub fn overall_figures(averages: &[Option<f64>], passes: i64) -> OverallFigures {
    let num_students = averages.len() as i64;
    let computed: Vec<f64> = averages.iter().flatten().copied().collect();
    let class_average = if computed.is_empty() {
        0.0
    } else {
        round_2dp(computed.iter().sum::<f64>() / computed.len() as f64)
    };
    OverallFigures {
        num_students,
        num_passes: passes,
        class_average,
        overall_percentage_pass: percentage(passes, num_students),
    }
}

/// Rebuilds one subject's row. Returns `None` (and drops any stale row) when
/// no student in scope has a score for the subject.
pub fn update_class_subject_stat(
    ctx: &EngineContext<'_>,
    scope: &Scope,
    class_subject_id: &str,
) -> EngineResult<Option<ClassSubjectStat>> {
    let exam = load_exam(ctx.conn, &scope.exam_id)?;
    let pass_mark = ctx.pass_mark(&exam)?;
    let scores: Vec<f64> = store::records_in_scope(ctx.conn, scope, class_subject_id)?
        .into_iter()
        .filter_map(|r| r.score)
        .collect();

    let Some(f) = subject_figures(&scores, pass_mark) else {
        ctx.conn.execute(
            "DELETE FROM class_subject_stats
             WHERE exam_id = ? AND class_id = ? AND class_subject_id = ? AND academic_year = ?",
            (
                &scope.exam_id,
                &scope.class_id,
                class_subject_id,
                &scope.academic_year,
            ),
        )?;
        return Ok(None);
    };

    ctx.conn.execute(
        "INSERT INTO class_subject_stats(
           exam_id, class_id, class_subject_id, academic_year,
           max_score, min_score, avg_score, num_sat, num_passed, percentage_passed)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(exam_id, class_id, class_subject_id, academic_year) DO UPDATE SET
           max_score = excluded.max_score,
           min_score = excluded.min_score,
           avg_score = excluded.avg_score,
           num_sat = excluded.num_sat,
           num_passed = excluded.num_passed,
           percentage_passed = excluded.percentage_passed",
        (
            &scope.exam_id,
            &scope.class_id,
            class_subject_id,
            &scope.academic_year,
            f.max_score,
            f.min_score,
            f.avg_score,
            f.num_sat,
            f.num_passed,
            f.percentage_passed,
        ),
    )?;
    Ok(Some(ClassSubjectStat {
        exam_id: scope.exam_id.clone(),
        class_id: scope.class_id.clone(),
        class_subject_id: class_subject_id.to_string(),
        academic_year: scope.academic_year.clone(),
        max_score: f.max_score,
        min_score: f.min_score,
        avg_score: f.avg_score,
        num_sat: f.num_sat,
        num_passed: f.num_passed,
        percentage_passed: f.percentage_passed,
    }))
}

pub fn update_class_overall_stat(
    ctx: &EngineContext<'_>,
    scope: &Scope,
) -> EngineResult<ClassOverallStat> {
    let sheets = store::sheets_in_scope(ctx.conn, scope)?;
    let averages: Vec<Option<f64>> = sheets.iter().map(|s| s.average).collect();
    let passes = sheets
        .iter()
        .filter(|s| s.remark == Remark::Passed.as_str())
        .count() as i64;
    let f = overall_figures(&averages, passes);

    ctx.conn.execute(
        "INSERT INTO class_overall_stats(
           exam_id, class_id, academic_year,
           num_students, num_passes, class_average, overall_percentage_pass)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(exam_id, class_id, academic_year) DO UPDATE SET
           num_students = excluded.num_students,
           num_passes = excluded.num_passes,
           class_average = excluded.class_average,
           overall_percentage_pass = excluded.overall_percentage_pass",
        (
            &scope.exam_id,
            &scope.class_id,
            &scope.academic_year,
            f.num_students,
            f.num_passes,
            f.class_average,
            f.overall_percentage_pass,
        ),
    )?;
    Ok(ClassOverallStat {
        exam_id: scope.exam_id.clone(),
        class_id: scope.class_id.clone(),
        academic_year: scope.academic_year.clone(),
        num_students: f.num_students,
        num_passes: f.num_passes,
        class_average: f.class_average,
        overall_percentage_pass: f.overall_percentage_pass,
    })
}

/// Every class subject of the class plus the overall row.
pub fn update_class_stats(ctx: &EngineContext<'_>, scope: &Scope) -> EngineResult<()> {
    for cs_id in store::class_subject_ids(ctx.conn, &scope.class_id)? {
        update_class_subject_stat(ctx, scope, &cs_id)?;
    }
    update_class_overall_stat(ctx, scope)?;
    tracing::debug!(exam_id = %scope.exam_id, class_id = %scope.class_id, "class statistics rebuilt");
    Ok(())
}

pub fn read_class_subject_stat(
    conn: &Connection,
    scope: &Scope,
    class_subject_id: &str,
) -> EngineResult<Option<ClassSubjectStat>> {
    Ok(conn
        .query_row(
            "SELECT max_score, min_score, avg_score, num_sat, num_passed, percentage_passed
             FROM class_subject_stats
             WHERE exam_id = ? AND class_id = ? AND class_subject_id = ? AND academic_year = ?",
            (
                &scope.exam_id,
                &scope.class_id,
                class_subject_id,
                &scope.academic_year,
            ),
            |r| {
                Ok(ClassSubjectStat {
                    exam_id: scope.exam_id.clone(),
                    class_id: scope.class_id.clone(),
                    class_subject_id: class_subject_id.to_string(),
                    academic_year: scope.academic_year.clone(),
                    max_score: r.get(0)?,
                    min_score: r.get(1)?,
                    avg_score: r.get(2)?,
                    num_sat: r.get(3)?,
                    num_passed: r.get(4)?,
                    percentage_passed: r.get(5)?,
                })
            },
        )
        .optional()?)
}

pub fn read_class_overall_stat(
    conn: &Connection,
    scope: &Scope,
) -> EngineResult<Option<ClassOverallStat>> {
    Ok(conn
        .query_row(
            "SELECT num_students, num_passes, class_average, overall_percentage_pass
             FROM class_overall_stats
             WHERE exam_id = ? AND class_id = ? AND academic_year = ?",
            (&scope.exam_id, &scope.class_id, &scope.academic_year),
            |r| {
                Ok(ClassOverallStat {
                    exam_id: scope.exam_id.clone(),
                    class_id: scope.class_id.clone(),
                    academic_year: scope.academic_year.clone(),
                    num_students: r.get(0)?,
                    num_passes: r.get(1)?,
                    class_average: r.get(2)?,
                    overall_percentage_pass: r.get(3)?,
                })
            },
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{recompute_grade_sheet, score_record, Cascade};
    use crate::context::SqliteCollaborators;
    use crate::db::open_in_memory;
    use crate::exams::create_exam;
    use crate::roster::{add_class_subject, create_class, create_student, create_subject, enroll_in_class};
    use crate::tenant::create_tenant;
    use crate::tier::Tier;

    #[test]
    fn subject_figures_cover_scores_sat() {
        let f = subject_figures(&[12.0, 8.0, 15.5], 10.0).unwrap();
        assert_eq!(f.max_score, 15.5);
        assert_eq!(f.min_score, 8.0);
        assert_eq!(f.avg_score, 11.83);
        assert_eq!(f.num_sat, 3);
        assert_eq!(f.num_passed, 2);
        assert_eq!(f.percentage_passed, 66.67);
        assert!(subject_figures(&[], 10.0).is_none());
    }

    #[test]
    fn overall_figures_handle_empty_scope() {
        let f = overall_figures(&[], 0);
        assert_eq!(f.num_students, 0);
        assert_eq!(f.overall_percentage_pass, 0.0);
        assert_eq!(f.class_average, 0.0);

        let f = overall_figures(&[Some(12.0), None, Some(9.0)], 1);
        assert_eq!(f.num_students, 3);
        assert_eq!(f.class_average, 10.5);
        assert_eq!(f.overall_percentage_pass, 33.33);
    }

    #[test]
    fn subject_stat_round_trips_through_the_table() {
        let conn = open_in_memory();
        let t = create_tenant(&conn, "School", 10.0).unwrap();
        let class_id = create_class(&conn, &t, "F1", "2024-2025", 0).unwrap();
        let m = create_subject(&conn, &t, "MATH", "Mathematics", 2.0).unwrap();
        let cs = add_class_subject(&conn, &class_id, &m, None, None).unwrap();
        let exam_id = create_exam(&conn, &t, "2024-2025", "Seq 1", Tier::Base, 20.0).unwrap();
        let exam = load_exam(&conn, &exam_id).unwrap();
        let scope = Scope::new(&exam, &class_id);

        let collab = SqliteCollaborators::new(&conn);
        let ctx = collab.context(&conn);
        for (name, score) in [("A", Some(14.0)), ("B", Some(6.0)), ("C", None)] {
            let s = create_student(&conn, &t, None, name, name).unwrap();
            enroll_in_class(&conn, &s, &class_id).unwrap();
            let sheet = store::get_or_create_sheet(&conn, &s, &scope).unwrap();
            let record = store::get_or_create_record(&conn, &sheet, &cs).unwrap();
            score_record(&ctx, &exam, &record, score).unwrap();
            recompute_grade_sheet(&ctx, &sheet, Cascade::Suppressed).unwrap();
        }

        let written = update_class_subject_stat(&ctx, &scope, &cs).unwrap().unwrap();
        assert_eq!(written.num_sat, 2);
        assert_eq!(written.avg_score, 10.0);
        assert_eq!(written.percentage_passed, 50.0);
        assert_eq!(
            read_class_subject_stat(&conn, &scope, &cs).unwrap(),
            Some(written)
        );

        let overall = update_class_overall_stat(&ctx, &scope).unwrap();
        assert_eq!(overall.num_students, 3);
        // A averages 14 / 2 = 7.00 over its credits, below the pass mark.
        assert_eq!(overall.num_passes, 0);
        assert_eq!(overall.overall_percentage_pass, 0.0);
        assert_eq!(read_class_overall_stat(&conn, &scope).unwrap(), Some(overall));
    }

    #[test]
    fn nobody_sat_drops_the_stale_row() {
        let conn = open_in_memory();
        let t = create_tenant(&conn, "School", 10.0).unwrap();
        let class_id = create_class(&conn, &t, "F1", "2024-2025", 0).unwrap();
        let m = create_subject(&conn, &t, "MATH", "Mathematics", 2.0).unwrap();
        let cs = add_class_subject(&conn, &class_id, &m, None, None).unwrap();
        let exam_id = create_exam(&conn, &t, "2024-2025", "Seq 1", Tier::Base, 20.0).unwrap();
        let exam = load_exam(&conn, &exam_id).unwrap();
        let scope = Scope::new(&exam, &class_id);
        let collab = SqliteCollaborators::new(&conn);
        let ctx = collab.context(&conn);

        let s = create_student(&conn, &t, None, "A", "A").unwrap();
        let sheet = store::get_or_create_sheet(&conn, &s, &scope).unwrap();
        let record = store::get_or_create_record(&conn, &sheet, &cs).unwrap();
        score_record(&ctx, &exam, &record, Some(11.0)).unwrap();
        assert!(update_class_subject_stat(&ctx, &scope, &cs).unwrap().is_some());

        score_record(&ctx, &exam, &record, None).unwrap();
        assert!(update_class_subject_stat(&ctx, &scope, &cs).unwrap().is_none());
        assert!(read_class_subject_stat(&conn, &scope, &cs).unwrap().is_none());
    }
}
