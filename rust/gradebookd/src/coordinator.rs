//! Recompute coordination. Every mutation runs in one `BEGIN IMMEDIATE`
//! transaction: the SQLite write lock serialises writers touching a scope, a
//! failure anywhere rolls the whole chain back, and the statistics cache is
//! only invalidated once the commit has gone through.
//!
//! Per-sheet recomputes inside a batch run with `Cascade::Suppressed`; the
//! scope-wide steps (sheet ranks, statistics) run once at the end.

use crate::aggregate::{self, Cascade, RollUpOutcome};
use crate::cache::StatsCache;
use crate::calc::SheetTotals;
use crate::context::{EngineContext, SqliteCollaborators};
use crate::entry::resolve_cell;
use crate::error::{EngineError, EngineResult};
use crate::exams::{load_exam, parents_of, ExamInstance};
use crate::policy::GradingPolicy;
use crate::rank;
use crate::roster;
use crate::stats::{self, ClassOverallStat, ClassSubjectStat};
use crate::store::{self, resolve_scope, Scope};
use crate::tenant;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

pub const MAX_BULK_CELLS: usize = 5000;

fn write_txn<T, F>(conn: &Connection, f: F) -> EngineResult<T>
where
    F: FnOnce(&EngineContext<'_>) -> EngineResult<T>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let out = {
        let collab = SqliteCollaborators::new(&tx);
        let ctx = collab.context(&tx);
        match f(&ctx) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "recompute chain rolled back");
                return Err(e);
            }
        }
    };
    tx.commit()?;
    Ok(out)
}

/// Rebuilds the scope-wide aggregates after the per-sheet work is done.
fn finish_scope(ctx: &EngineContext<'_>, scope: &Scope) -> EngineResult<()> {
    rank::rank_grade_sheets(ctx.conn, scope)?;
    stats::update_class_stats(ctx, scope)
}

#[derive(Debug, Clone)]
pub struct CellInput {
    pub student_id: String,
    pub class_subject_id: String,
    pub value: Value,
}

struct AppliedCell {
    sheet_id: String,
    record_id: String,
    score: Option<f64>,
    parse_error: Option<EngineError>,
}

fn require_entry_exam(exam: &ExamInstance) -> EngineResult<()> {
    if exam.tier.is_rolled_up() {
        return Err(EngineError::InvalidInput(format!(
            "{} is a {} exam; its scores come from roll-up",
            exam.name,
            exam.tier.as_str()
        )));
    }
    Ok(())
}

/// Stores one cell and recomputes its grade sheet. The subject's record
/// ranks and the scope-wide aggregates are left to the caller.
fn apply_cell(
    ctx: &EngineContext<'_>,
    exam: &ExamInstance,
    scope: &Scope,
    cell: &CellInput,
) -> EngineResult<AppliedCell> {
    let owner = roster::class_subject_class(ctx.conn, &cell.class_subject_id)?;
    if owner != scope.class_id {
        return Err(EngineError::InvalidInput(format!(
            "class subject {} does not belong to class {}",
            cell.class_subject_id, scope.class_id
        )));
    }
    if !ctx
        .enrollment
        .is_enrolled(&cell.student_id, &cell.class_subject_id, &scope.academic_year)?
    {
        return Err(EngineError::InvalidInput(format!(
            "student {} is not enrolled in class subject {}",
            cell.student_id, cell.class_subject_id
        )));
    }
    let resolved = resolve_cell(&cell.value, exam.max_score)?;

    let sheet_id = store::get_or_create_sheet(ctx.conn, &cell.student_id, scope)?;
    let record_id = store::get_or_create_record(ctx.conn, &sheet_id, &cell.class_subject_id)?;
    aggregate::score_record(ctx, exam, &record_id, resolved.score)?;
    aggregate::recompute_grade_sheet(ctx, &sheet_id, Cascade::Suppressed)?;

    Ok(AppliedCell {
        sheet_id,
        record_id,
        score: resolved.score,
        parse_error: resolved.parse_error,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub sheet_id: String,
    pub record_id: String,
    pub score: Option<f64>,
    /// Set when the cell was unreadable and stored as no score.
    pub warning: Option<String>,
    /// Composite exams reading from this one; they need a roll-up.
    pub stale_parents: Vec<String>,
}

/// Saves one base-tier score and brings the scope up to date.
pub fn save_score(
    conn: &Connection,
    cache: &mut StatsCache,
    exam_id: &str,
    class_id: &str,
    cell: &CellInput,
) -> EngineResult<SaveOutcome> {
    let (outcome, scope) = write_txn(conn, |ctx| {
        let (exam, scope) = resolve_scope(ctx.conn, exam_id, class_id)?;
        require_entry_exam(&exam)?;

        let applied = apply_cell(ctx, &exam, &scope, cell)?;
        rank::rank_score_records(ctx.conn, &scope, &cell.class_subject_id)?;
        finish_scope(ctx, &scope)?;

        let outcome = SaveOutcome {
            sheet_id: applied.sheet_id,
            record_id: applied.record_id,
            score: applied.score,
            warning: applied.parse_error.map(|e| e.to_string()),
            stale_parents: parents_of(ctx.conn, &exam.id)?,
        };
        Ok((outcome, scope))
    })?;
    cache.invalidate_scope(&scope);
    tracing::info!(exam_id, class_id, sheet_id = %outcome.sheet_id, "score saved");
    Ok(outcome)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NullCell {
    pub student_id: String,
    pub class_subject_id: String,
    pub raw: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellError {
    pub student_id: String,
    pub class_subject_id: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub updated: usize,
    /// Unreadable cells that were stored as no score.
    pub nulls: Vec<NullCell>,
    pub rejected: usize,
    pub errors: Vec<CellError>,
    pub stale_parents: Vec<String>,
}

/// Cell-level problems that skip the cell without failing the batch.
fn is_cell_rejection(e: &EngineError) -> bool {
    matches!(
        e,
        EngineError::OutOfRange { .. } | EngineError::InvalidInput(_) | EngineError::NotFound { .. }
    )
}

/// Saves many base-tier cells in one transaction. Unreadable cells are
/// stored as no score and reported; out-of-range or unenrolled cells are
/// skipped and reported. Any recompute failure fails the whole call.
pub fn bulk_save_scores(
    conn: &Connection,
    cache: &mut StatsCache,
    exam_id: &str,
    class_id: &str,
    cells: &[CellInput],
) -> EngineResult<BulkOutcome> {
    if cells.len() > MAX_BULK_CELLS {
        return Err(EngineError::InvalidInput(format!(
            "too many cells ({} > {})",
            cells.len(),
            MAX_BULK_CELLS
        )));
    }

    let (outcome, scope) = write_txn(conn, |ctx| {
        let (exam, scope) = resolve_scope(ctx.conn, exam_id, class_id)?;
        require_entry_exam(&exam)?;

        let mut outcome = BulkOutcome {
            updated: 0,
            nulls: Vec::new(),
            rejected: 0,
            errors: Vec::new(),
            stale_parents: Vec::new(),
        };
        let mut touched: BTreeSet<&str> = BTreeSet::new();

        for cell in cells {
            match apply_cell(ctx, &exam, &scope, cell) {
                Ok(applied) => {
                    outcome.updated += 1;
                    touched.insert(cell.class_subject_id.as_str());
                    if applied.parse_error.is_some() {
                        outcome.nulls.push(NullCell {
                            student_id: cell.student_id.clone(),
                            class_subject_id: cell.class_subject_id.clone(),
                            raw: cell.value.clone(),
                        });
                    }
                }
                Err(e) if is_cell_rejection(&e) => {
                    outcome.rejected += 1;
                    outcome.errors.push(CellError {
                        student_id: cell.student_id.clone(),
                        class_subject_id: cell.class_subject_id.clone(),
                        code: e.code(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        for cs_id in touched {
            rank::rank_score_records(ctx.conn, &scope, cs_id)?;
        }
        finish_scope(ctx, &scope)?;
        outcome.stale_parents = parents_of(ctx.conn, &exam.id)?;
        Ok((outcome, scope))
    })?;
    cache.invalidate_scope(&scope);
    tracing::info!(
        exam_id,
        class_id,
        updated = outcome.updated,
        nulls = outcome.nulls.len(),
        rejected = outcome.rejected,
        "bulk score update committed"
    );
    Ok(outcome)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeOutcome {
    pub sheet_id: String,
    pub totals: SheetTotals,
}

pub fn recompute_grade_sheet(
    conn: &Connection,
    cache: &mut StatsCache,
    sheet_id: &str,
) -> EngineResult<RecomputeOutcome> {
    let (totals, scope) = write_txn(conn, |ctx| {
        let sheet = store::load_sheet(ctx.conn, sheet_id)?;
        let totals = aggregate::recompute_grade_sheet(ctx, sheet_id, Cascade::Full)?;
        let scope = Scope {
            exam_id: sheet.exam_id,
            class_id: sheet.class_id,
            academic_year: sheet.academic_year,
        };
        Ok((totals, scope))
    })?;
    cache.invalidate_scope(&scope);
    Ok(RecomputeOutcome {
        sheet_id: sheet_id.to_string(),
        totals,
    })
}

/// Rolls a composite exam up from its linked children, then re-ranks and
/// rebuilds statistics for every scope it touched.
pub fn roll_up(
    conn: &Connection,
    cache: &mut StatsCache,
    parent_exam_id: &str,
) -> EngineResult<RollUpOutcome> {
    let outcome = write_txn(conn, |ctx| {
        let outcome = aggregate::roll_up(ctx, parent_exam_id)?;
        for scope in &outcome.scopes {
            if let Some(subjects) = outcome.subjects.get(scope) {
                for cs_id in subjects {
                    rank::rank_score_records(ctx.conn, scope, cs_id)?;
                }
            }
            finish_scope(ctx, scope)?;
        }
        Ok(outcome)
    })?;
    for scope in &outcome.scopes {
        cache.invalidate_scope(scope);
    }
    Ok(outcome)
}

pub fn rank_grade_sheets(
    conn: &Connection,
    cache: &mut StatsCache,
    exam_id: &str,
    class_id: &str,
) -> EngineResult<usize> {
    let (ranked, scope) = write_txn(conn, |ctx| {
        let (_, scope) = resolve_scope(ctx.conn, exam_id, class_id)?;
        Ok((rank::rank_grade_sheets(ctx.conn, &scope)?, scope))
    })?;
    cache.invalidate_scope(&scope);
    Ok(ranked)
}

pub fn rank_score_records(
    conn: &Connection,
    cache: &mut StatsCache,
    exam_id: &str,
    class_id: &str,
    class_subject_id: &str,
) -> EngineResult<usize> {
    let (ranked, scope) = write_txn(conn, |ctx| {
        let (_, scope) = resolve_scope(ctx.conn, exam_id, class_id)?;
        Ok((
            rank::rank_score_records(ctx.conn, &scope, class_subject_id)?,
            scope,
        ))
    })?;
    cache.invalidate_scope(&scope);
    Ok(ranked)
}

pub fn update_class_subject_stat(
    conn: &Connection,
    cache: &mut StatsCache,
    exam_id: &str,
    class_id: &str,
    class_subject_id: &str,
) -> EngineResult<Option<ClassSubjectStat>> {
    let (stat, scope) = write_txn(conn, |ctx| {
        let (_, scope) = resolve_scope(ctx.conn, exam_id, class_id)?;
        Ok((
            stats::update_class_subject_stat(ctx, &scope, class_subject_id)?,
            scope,
        ))
    })?;
    cache.invalidate_scope(&scope);
    Ok(stat)
}

pub fn update_class_overall_stat(
    conn: &Connection,
    cache: &mut StatsCache,
    exam_id: &str,
    class_id: &str,
) -> EngineResult<ClassOverallStat> {
    let (stat, scope) = write_txn(conn, |ctx| {
        let (_, scope) = resolve_scope(ctx.conn, exam_id, class_id)?;
        Ok((stats::update_class_overall_stat(ctx, &scope)?, scope))
    })?;
    cache.invalidate_scope(&scope);
    Ok(stat)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub sheets: usize,
    pub subjects: usize,
}

/// Recomputes every sheet in the scope from its records, then re-ranks every
/// subject and the sheets and rebuilds statistics.
fn refresh_in(
    ctx: &EngineContext<'_>,
    exam: &ExamInstance,
    scope: &Scope,
) -> EngineResult<RefreshOutcome> {
    let policy = ctx.policy(exam)?;
    let sheets = store::sheets_in_scope(ctx.conn, scope)?;
    for sheet in &sheets {
        // Observations follow the current bands.
        for r in store::records_for_sheet(ctx.conn, &sheet.id)? {
            if let Some(v) = r.score {
                let observation = policy.classify(v)?;
                if observation != r.observation {
                    store::write_record_score(ctx.conn, &r.id, r.score, observation)?;
                }
            }
        }
        aggregate::recompute_grade_sheet(ctx, &sheet.id, Cascade::Suppressed)?;
    }
    let subjects = store::class_subject_ids(ctx.conn, &scope.class_id)?;
    for cs_id in &subjects {
        rank::rank_score_records(ctx.conn, scope, cs_id)?;
    }
    finish_scope(ctx, scope)?;
    Ok(RefreshOutcome {
        sheets: sheets.len(),
        subjects: subjects.len(),
    })
}

/// Brings one scope back in line with its records. Used after credits change.
pub fn refresh_scope(
    conn: &Connection,
    cache: &mut StatsCache,
    exam_id: &str,
    class_id: &str,
) -> EngineResult<RefreshOutcome> {
    let (outcome, scope) = write_txn(conn, |ctx| {
        let (exam, scope) = resolve_scope(ctx.conn, exam_id, class_id)?;
        Ok((refresh_in(ctx, &exam, &scope)?, scope))
    })?;
    cache.invalidate_scope(&scope);
    tracing::info!(exam_id, class_id, sheets = outcome.sheets, "scope refreshed");
    Ok(outcome)
}

/// Refreshes every scope holding grade sheets for the tenant.
fn refresh_tenant(ctx: &EngineContext<'_>, tenant_id: &str) -> EngineResult<usize> {
    let scopes = store::scopes_for_tenant(ctx.conn, tenant_id)?;
    for scope in &scopes {
        let exam = load_exam(ctx.conn, &scope.exam_id)?;
        refresh_in(ctx, &exam, scope)?;
    }
    Ok(scopes.len())
}

/// Stores a new pass mark and re-derives every remark, credit count and
/// statistic that depends on it. Nothing changes if any scope fails.
pub fn set_pass_mark(
    conn: &Connection,
    cache: &mut StatsCache,
    tenant_id: &str,
    pass_mark: f64,
) -> EngineResult<usize> {
    let refreshed = write_txn(conn, |ctx| {
        tenant::set_pass_mark(ctx.conn, tenant_id, pass_mark)?;
        refresh_tenant(ctx, tenant_id)
    })?;
    cache.clear();
    tracing::info!(tenant_id, pass_mark, scopes = refreshed, "pass mark changed");
    Ok(refreshed)
}

/// Stores new bands and reclassifies every stored score. A score the new
/// bands cannot classify fails the call with `policy_error` and the old
/// bands stay.
pub fn set_grading_policy(
    conn: &Connection,
    cache: &mut StatsCache,
    tenant_id: &str,
    raw: &Value,
    max_score: f64,
) -> EngineResult<(GradingPolicy, usize)> {
    let out = write_txn(conn, |ctx| {
        let policy = tenant::set_grading_policy(ctx.conn, tenant_id, raw, max_score)?;
        let refreshed = refresh_tenant(ctx, tenant_id)?;
        Ok((policy, refreshed))
    })?;
    cache.clear();
    tracing::info!(tenant_id, scopes = out.1, "grading policy changed");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::exams::{create_exam, link};
    use crate::roster::{
        add_class_subject, create_class, create_student, create_subject, enroll, enroll_in_class,
    };
    use crate::tenant::create_tenant;
    use crate::tier::Tier;
    use serde_json::json;
    use std::time::Duration;

    struct School {
        tenant: String,
        class_id: String,
        math: String,
        physics: String,
        seq1: String,
    }

    fn school(conn: &Connection) -> School {
        let tenant = create_tenant(conn, "School", 10.0).unwrap();
        let class_id = create_class(conn, &tenant, "F1", "2024-2025", 0).unwrap();
        let m = create_subject(conn, &tenant, "MATH", "Mathematics", 4.0).unwrap();
        let p = create_subject(conn, &tenant, "PHY", "Physics", 3.0).unwrap();
        let math = add_class_subject(conn, &class_id, &m, None, None).unwrap();
        let physics = add_class_subject(conn, &class_id, &p, None, None).unwrap();
        let seq1 = create_exam(conn, &tenant, "2024-2025", "Seq 1", Tier::Base, 20.0).unwrap();
        School {
            tenant,
            class_id,
            math,
            physics,
            seq1,
        }
    }

    fn student(conn: &Connection, s: &School, name: &str) -> String {
        let id = create_student(conn, &s.tenant, None, name, "X").unwrap();
        enroll_in_class(conn, &id, &s.class_id).unwrap();
        id
    }

    fn cell(student_id: &str, cs: &str, value: Value) -> CellInput {
        CellInput {
            student_id: student_id.to_string(),
            class_subject_id: cs.to_string(),
            value,
        }
    }

    #[test]
    fn save_score_updates_sheet_ranks_and_stats() {
        let conn = open_in_memory();
        let s = school(&conn);
        let mut cache = StatsCache::new(Duration::from_secs(3600));
        let a = student(&conn, &s, "A");
        let b = student(&conn, &s, "B");

        save_score(&conn, &mut cache, &s.seq1, &s.class_id, &cell(&a, &s.math, json!(15))).unwrap();
        let out =
            save_score(&conn, &mut cache, &s.seq1, &s.class_id, &cell(&b, &s.math, json!("18,5")))
                .unwrap();
        assert_eq!(out.score, Some(18.5));
        assert!(out.warning.is_none());

        let sheet_b = store::load_sheet(&conn, &out.sheet_id).unwrap();
        assert_eq!(sheet_b.rank, Some(1));
        let record_b = store::records_for_sheet(&conn, &out.sheet_id)
            .unwrap()
            .into_iter()
            .find(|r| r.id == out.record_id)
            .unwrap();
        assert_eq!(record_b.rank, Some(1));
        assert_eq!(record_b.observation, "Excellent");

        let (_, scope) = resolve_scope(&conn, &s.seq1, &s.class_id).unwrap();
        let stat = stats::read_class_subject_stat(&conn, &scope, &s.math).unwrap().unwrap();
        assert_eq!(stat.num_sat, 2);
        assert_eq!(stat.max_score, 18.5);
        assert!(stats::read_class_subject_stat(&conn, &scope, &s.physics).unwrap().is_none());
    }

    #[test]
    fn unclassifiable_score_rolls_everything_back() {
        let conn = open_in_memory();
        let s = school(&conn);
        let mut cache = StatsCache::new(Duration::from_secs(3600));
        let a = student(&conn, &s, "A");
        // Valid over [0, 10] only: a 15 out of 20 falls outside every band.
        crate::tenant::set_grading_policy(
            &conn,
            &s.tenant,
            &json!({"P": {"min": 5, "max": 10}, "F": {"min": 0, "max": 4.99}}),
            10.0,
        )
        .unwrap();

        let e = save_score(&conn, &mut cache, &s.seq1, &s.class_id, &cell(&a, &s.math, json!(15)))
            .unwrap_err();
        assert_eq!(e.code(), "policy_error");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM grade_sheets", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn bulk_tolerates_bad_cells_and_reports_them() {
        let conn = open_in_memory();
        let s = school(&conn);
        let mut cache = StatsCache::new(Duration::from_secs(3600));
        let a = student(&conn, &s, "A");
        let outsider = create_student(&conn, &s.tenant, None, "Z", "Z").unwrap();

        let out = bulk_save_scores(
            &conn,
            &mut cache,
            &s.seq1,
            &s.class_id,
            &[
                cell(&a, &s.math, json!(12)),
                cell(&a, &s.physics, json!("??")),
                cell(&a, &s.physics, json!(25)),
                cell(&outsider, &s.math, json!(10)),
            ],
        )
        .unwrap();
        assert_eq!(out.updated, 2);
        assert_eq!(out.nulls.len(), 1);
        assert_eq!(out.rejected, 2);
        assert_eq!(out.errors[0].code, "score_out_of_range");
        assert_eq!(out.errors[1].code, "bad_params");

        let (_, scope) = resolve_scope(&conn, &s.seq1, &s.class_id).unwrap();
        let sheet = store::find_sheet(&conn, &a, &scope).unwrap().unwrap();
        assert_eq!(sheet.credits_attempted, Some(4.0));
        assert_eq!(sheet.average, Some(3.0));
    }

    #[test]
    fn composite_exams_reject_direct_entry_and_roll_up_instead() {
        let conn = open_in_memory();
        let s = school(&conn);
        let mut cache = StatsCache::new(Duration::from_secs(3600));
        let a = student(&conn, &s, "A");
        let term = create_exam(&conn, &s.tenant, "2024-2025", "Term 1", Tier::General, 20.0).unwrap();
        link(&conn, &term, &s.seq1, 1.0).unwrap();

        let e = save_score(&conn, &mut cache, &term, &s.class_id, &cell(&a, &s.math, json!(12)))
            .unwrap_err();
        assert_eq!(e.code(), "bad_params");

        let out = save_score(&conn, &mut cache, &s.seq1, &s.class_id, &cell(&a, &s.math, json!(12)))
            .unwrap();
        assert_eq!(out.stale_parents, vec![term.clone()]);

        let rolled = roll_up(&conn, &mut cache, &term).unwrap();
        assert_eq!(rolled.sheets, 1);
        let (_, scope) = resolve_scope(&conn, &term, &s.class_id).unwrap();
        let overall = stats::read_class_overall_stat(&conn, &scope).unwrap().unwrap();
        assert_eq!(overall.num_students, 1);
        assert_eq!(overall.class_average, 3.0);
    }

    #[test]
    fn refresh_picks_up_credit_changes() {
        let conn = open_in_memory();
        let s = school(&conn);
        let mut cache = StatsCache::new(Duration::from_secs(3600));
        let a = student(&conn, &s, "A");
        let out = save_score(&conn, &mut cache, &s.seq1, &s.class_id, &cell(&a, &s.math, json!(12)))
            .unwrap();

        conn.execute("UPDATE class_subjects SET credit = 2 WHERE id = ?", [&s.math])
            .unwrap();
        let refreshed = refresh_scope(&conn, &mut cache, &s.seq1, &s.class_id).unwrap();
        assert_eq!(refreshed.sheets, 1);
        assert_eq!(store::load_sheet(&conn, &out.sheet_id).unwrap().average, Some(6.0));
    }

    #[test]
    fn subjects_of_another_class_are_refused() {
        let conn = open_in_memory();
        let s = school(&conn);
        let mut cache = StatsCache::new(Duration::from_secs(3600));
        let a = student(&conn, &s, "A");
        let other = create_class(&conn, &s.tenant, "F2", "2024-2025", 0).unwrap();
        let art = create_subject(&conn, &s.tenant, "ART", "Art", 1.0).unwrap();
        let art_other = add_class_subject(&conn, &other, &art, None, None).unwrap();
        enroll(&conn, &a, &art_other, "2024-2025").unwrap();

        let e = save_score(&conn, &mut cache, &s.seq1, &s.class_id, &cell(&a, &art_other, json!(20)))
            .unwrap_err();
        assert_eq!(e.code(), "bad_params");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM score_records", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let out = bulk_save_scores(
            &conn,
            &mut cache,
            &s.seq1,
            &s.class_id,
            &[cell(&a, &s.math, json!(12)), cell(&a, &art_other, json!(20))],
        )
        .unwrap();
        assert_eq!(out.updated, 1);
        assert_eq!(out.rejected, 1);
        assert_eq!(out.errors[0].class_subject_id, art_other);
        assert_eq!(out.errors[0].code, "bad_params");

        let (_, scope) = resolve_scope(&conn, &s.seq1, &s.class_id).unwrap();
        let sheet = store::find_sheet(&conn, &a, &scope).unwrap().unwrap();
        assert_eq!(sheet.total_score, Some(12.0));
        assert_eq!(sheet.credits_attempted, Some(4.0));
        assert_eq!(store::records_for_sheet(&conn, &sheet.id).unwrap().len(), 1);
    }

    #[test]
    fn pass_mark_change_rederives_remarks_and_stats() {
        let conn = open_in_memory();
        let s = school(&conn);
        let mut cache = StatsCache::new(Duration::from_secs(3600));
        let art = create_subject(&conn, &s.tenant, "ART", "Art", 1.0).unwrap();
        let art = add_class_subject(&conn, &s.class_id, &art, None, None).unwrap();
        let a = student(&conn, &s, "A");

        let out = save_score(&conn, &mut cache, &s.seq1, &s.class_id, &cell(&a, &art, json!(11)))
            .unwrap();
        let before = store::load_sheet(&conn, &out.sheet_id).unwrap();
        assert_eq!(before.average, Some(11.0));
        assert_eq!(before.remark, "PASSED");

        let (exam, scope) = resolve_scope(&conn, &s.seq1, &s.class_id).unwrap();
        let collab = SqliteCollaborators::new(&conn);
        crate::results::cached_overall_stat(&collab.context(&conn), &mut cache, &exam, &scope)
            .unwrap();
        assert_eq!(cache.entry_count(), 1);

        assert_eq!(set_pass_mark(&conn, &mut cache, &s.tenant, 12.0).unwrap(), 1);
        assert_eq!(cache.entry_count(), 0);

        let after = store::load_sheet(&conn, &out.sheet_id).unwrap();
        assert_eq!(after.average, Some(11.0));
        assert_eq!(after.remark, "FAILED");
        assert_eq!(after.credits_obtained, Some(0.0));
        let subject = stats::read_class_subject_stat(&conn, &scope, &art).unwrap().unwrap();
        assert_eq!(subject.num_passed, 0);
        let overall = stats::read_class_overall_stat(&conn, &scope).unwrap().unwrap();
        assert_eq!(overall.num_passes, 0);
        assert_eq!(overall.overall_percentage_pass, 0.0);
    }

    #[test]
    fn policy_change_reclassifies_or_is_refused() {
        let conn = open_in_memory();
        let s = school(&conn);
        let mut cache = StatsCache::new(Duration::from_secs(3600));
        let a = student(&conn, &s, "A");
        let out = save_score(&conn, &mut cache, &s.seq1, &s.class_id, &cell(&a, &s.math, json!(13)))
            .unwrap();
        let observation = |conn: &Connection| {
            store::records_for_sheet(conn, &out.sheet_id).unwrap()[0]
                .observation
                .clone()
        };
        assert_eq!(observation(&conn), "Good");

        let (_, refreshed) = set_grading_policy(
            &conn,
            &mut cache,
            &s.tenant,
            &json!({"P": {"min": 10, "max": 20, "description": "Pass"},
                    "F": {"min": 0, "max": 9.99, "description": "Fail"}}),
            20.0,
        )
        .unwrap();
        assert_eq!(refreshed, 1);
        assert_eq!(observation(&conn), "Pass");

        // Valid over [0, 10] but leaves the stored 13 unclassifiable.
        let e = set_grading_policy(
            &conn,
            &mut cache,
            &s.tenant,
            &json!({"P": {"min": 5, "max": 10}, "F": {"min": 0, "max": 4.99}}),
            10.0,
        )
        .unwrap_err();
        assert_eq!(e.code(), "policy_error");
        assert_eq!(observation(&conn), "Pass");
        let bands = crate::tenant::get_tenant(&conn, &s.tenant).unwrap().grading_system;
        assert!(bands.get("P").is_some());
        assert!(bands.get("A").is_none());
    }
}
