//! Grade sheet recompute and tier-to-tier roll-up.

use crate::calc::{sheet_totals, weighted_score, Contribution, SheetLine, SheetTotals};
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::exams::{load_exam, weight_links};
use crate::rank;
use crate::stats;
use crate::store::{self, Scope};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Whether a recompute also rebuilds the scope-wide aggregates (sheet ranks
/// and statistics). Callers that batch several recomputes pass `Suppressed`
/// and rebuild the scope once at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cascade {
    Full,
    Suppressed,
}

/// Recomputes totals, credits, average and remark for one grade sheet from
/// its score records. Score records are read, never written.
pub fn recompute_grade_sheet(
    ctx: &EngineContext<'_>,
    sheet_id: &str,
    cascade: Cascade,
) -> EngineResult<SheetTotals> {
    let (totals, scope) =
        compute_and_store_totals(ctx, sheet_id).map_err(EngineError::into_grade_calculation)?;
    tracing::debug!(
        sheet_id,
        average = totals.average,
        remark = totals.remark.as_str(),
        "grade sheet recomputed"
    );

    if cascade == Cascade::Full {
        rank::rank_grade_sheets(ctx.conn, &scope)?;
        stats::update_class_stats(ctx, &scope)?;
    }
    Ok(totals)
}

fn compute_and_store_totals(
    ctx: &EngineContext<'_>,
    sheet_id: &str,
) -> EngineResult<(SheetTotals, Scope)> {
    let sheet = store::load_sheet(ctx.conn, sheet_id)?;
    let exam = load_exam(ctx.conn, &sheet.exam_id)?;
    let pass_mark = ctx.pass_mark(&exam)?;

    let records = store::records_for_sheet(ctx.conn, sheet_id)?;
    let mut lines = Vec::with_capacity(records.len());
    for r in &records {
        lines.push(SheetLine {
            score: r.score,
            credit: ctx.enrollment.class_subject_credit(&r.class_subject_id)?,
        });
    }

    let totals = sheet_totals(lines, pass_mark);
    store::write_sheet_totals(ctx.conn, sheet_id, &totals)?;
    Ok((totals, Scope::new(&exam, &sheet.class_id)))
}

/// Scores one record and sets its observation from the grading policy.
/// An unclassifiable score is a `Policy` error.
pub fn score_record(
    ctx: &EngineContext<'_>,
    exam: &crate::exams::ExamInstance,
    record_id: &str,
    score: Option<f64>,
) -> EngineResult<()> {
    let observation = match score {
        Some(v) => ctx.policy(exam)?.classify(v)?.to_string(),
        None => String::new(),
    };
    store::write_record_score(ctx.conn, record_id, score, &observation)
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollUpOutcome {
    pub sheets: usize,
    pub records: usize,
    /// Scopes whose ranks and statistics must be rebuilt.
    #[serde(skip)]
    pub scopes: Vec<Scope>,
    /// Subjects touched per scope, for record ranking.
    #[serde(skip)]
    pub subjects: HashMap<Scope, Vec<String>>,
}

type SubjectKey = (String, String, String);

/// Builds one composite exam's score records and grade sheets from the
/// linked lower-tier exam. Sheets are recomputed with `Cascade::Suppressed`;
/// the caller rebuilds the returned scopes.
pub fn roll_up(ctx: &EngineContext<'_>, parent_exam_id: &str) -> EngineResult<RollUpOutcome> {
    let parent = load_exam(ctx.conn, parent_exam_id)?;
    if !parent.tier.is_rolled_up() {
        return Err(EngineError::InvalidInput(format!(
            "{} is a {} exam; only composite exams can be rolled up",
            parent.name,
            parent.tier.as_str()
        )));
    }
    let links = weight_links(ctx.conn, &parent.id)?;

    // (student, class) pairs in first-seen order, and per-subject contributions.
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut contributions: HashMap<SubjectKey, Vec<Contribution>> = HashMap::new();

    for link in &links {
        let mut sheet_stmt = ctx.conn.prepare(
            "SELECT student_id, class_id FROM grade_sheets
             WHERE exam_id = ? AND academic_year = ? ORDER BY rowid",
        )?;
        let child_pairs = sheet_stmt
            .query_map((&link.child_exam_id, &parent.academic_year), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for pair in child_pairs {
            if seen.insert(pair.clone()) {
                pairs.push(pair);
            }
        }

        let mut score_stmt = ctx.conn.prepare(
            "SELECT gs.student_id, gs.class_id, sr.class_subject_id, sr.score
             FROM score_records sr
             JOIN grade_sheets gs ON gs.id = sr.grade_sheet_id
             WHERE gs.exam_id = ? AND gs.academic_year = ?",
        )?;
        let rows = score_stmt.query_map((&link.child_exam_id, &parent.academic_year), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<f64>>(3)?,
            ))
        })?;
        for row in rows {
            let (student_id, class_id, cs_id, score) = row?;
            contributions
                .entry((student_id, class_id, cs_id))
                .or_default()
                .push(Contribution {
                    score,
                    weight: link.weight,
                });
        }
    }

    let policy = ctx.policy(&parent)?;
    let mut outcome = RollUpOutcome::default();
    let mut scopes_seen: HashSet<Scope> = HashSet::new();

    for (student_id, class_id) in pairs {
        let scope = Scope::new(&parent, &class_id);
        let sheet_id = store::get_or_create_sheet(ctx.conn, &student_id, &scope)?;
        let subjects =
            ctx.enrollment
                .enrolled_class_subjects(&student_id, &class_id, &parent.academic_year)?;

        for cs_id in &subjects {
            let key = (student_id.clone(), class_id.clone(), cs_id.clone());
            let score = contributions
                .get(&key)
                .and_then(|c| weighted_score(c.iter().copied()));
            let observation = match score {
                Some(v) => policy.classify(v)?.to_string(),
                None => String::new(),
            };
            let record_id = store::get_or_create_record(ctx.conn, &sheet_id, cs_id)?;
            store::write_record_score(ctx.conn, &record_id, score, &observation)?;
            outcome.records += 1;
        }

        // Left over from a subject the student has since been unenrolled from.
        let mut dropped: Vec<String> = Vec::new();
        for r in store::records_for_sheet(ctx.conn, &sheet_id)? {
            if r.score.is_some() && !subjects.contains(&r.class_subject_id) {
                store::write_record_score(ctx.conn, &r.id, None, "")?;
                dropped.push(r.class_subject_id);
            }
        }

        recompute_grade_sheet(ctx, &sheet_id, Cascade::Suppressed)?;
        outcome.sheets += 1;

        let touched = outcome.subjects.entry(scope.clone()).or_default();
        for cs_id in subjects.into_iter().chain(dropped) {
            if !touched.contains(&cs_id) {
                touched.push(cs_id);
            }
        }
        if scopes_seen.insert(scope.clone()) {
            outcome.scopes.push(scope);
        }
    }

    tracing::info!(
        exam_id = %parent.id,
        tier = parent.tier.as_str(),
        sheets = outcome.sheets,
        records = outcome.records,
        "roll-up complete"
    );
    Ok(outcome)
}
