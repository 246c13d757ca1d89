//! Sequential ranking within a scope.
//!
//! Ranks are sequential: ties are broken by creation order, so equal values
//! get consecutive ranks (15, 15, 12 ranks as 1, 2, 3).

use crate::error::{EngineError, EngineResult};
use crate::store::{self, Scope};
use rusqlite::Connection;
use std::cmp::Ordering;

/// What to do with an entry that has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unscored {
    /// Placed after every valued entry, still in creation order.
    RankLast,
    /// Left without a rank.
    Unranked,
}

/// Ranks `values` (given in creation order) highest first. The result is
/// index-aligned with the input.
pub fn assign_ranks(values: &[Option<f64>], unscored: Unscored) -> Vec<Option<i64>> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    // sort_by is stable: equal values keep creation order.
    order.sort_by(|&a, &b| match (values[a], values[b]) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let mut ranks = vec![None; values.len()];
    let mut next = 1_i64;
    for idx in order {
        if values[idx].is_none() && unscored == Unscored::Unranked {
            continue;
        }
        ranks[idx] = Some(next);
        next += 1;
    }
    ranks
}

/// Re-ranks every grade sheet in the scope by average. Sheets that were never
/// computed rank last.
pub fn rank_grade_sheets(conn: &Connection, scope: &Scope) -> EngineResult<usize> {
    rank_sheets_inner(conn, scope).map_err(EngineError::into_rank_calculation)
}

fn rank_sheets_inner(conn: &Connection, scope: &Scope) -> EngineResult<usize> {
    let sheets = store::sheets_in_scope(conn, scope)?;
    let averages: Vec<Option<f64>> = sheets.iter().map(|s| s.average).collect();
    if averages.iter().flatten().any(|v| !v.is_finite()) {
        return Err(EngineError::RankCalculation(
            "non-finite average in scope".into(),
        ));
    }
    let ranks = assign_ranks(&averages, Unscored::RankLast);
    let updates: Vec<(String, Option<i64>)> = sheets
        .into_iter()
        .map(|s| s.id)
        .zip(ranks)
        .collect();
    store::write_sheet_ranks(conn, &updates)?;
    tracing::debug!(exam_id = %scope.exam_id, class_id = %scope.class_id, sheets = updates.len(), "grade sheets ranked");
    Ok(updates.len())
}

/// Re-ranks one subject's score records across the scope. Records without a
/// score get no rank.
pub fn rank_score_records(
    conn: &Connection,
    scope: &Scope,
    class_subject_id: &str,
) -> EngineResult<usize> {
    rank_records_inner(conn, scope, class_subject_id).map_err(EngineError::into_rank_calculation)
}

fn rank_records_inner(
    conn: &Connection,
    scope: &Scope,
    class_subject_id: &str,
) -> EngineResult<usize> {
    let records = store::records_in_scope(conn, scope, class_subject_id)?;
    let scores: Vec<Option<f64>> = records.iter().map(|r| r.score).collect();
    let ranks = assign_ranks(&scores, Unscored::Unranked);
    let updates: Vec<(String, Option<i64>)> = records
        .into_iter()
        .map(|r| r.id)
        .zip(ranks)
        .collect();
    store::write_record_ranks(conn, &updates)?;
    Ok(updates.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_get_sequential_ranks_in_creation_order() {
        let ranks = assign_ranks(&[Some(15.0), Some(15.0), Some(12.0)], Unscored::RankLast);
        assert_eq!(ranks, vec![Some(1), Some(2), Some(3)]);

        let ranks = assign_ranks(&[Some(12.0), Some(15.0), Some(15.0)], Unscored::RankLast);
        assert_eq!(ranks, vec![Some(3), Some(1), Some(2)]);
    }

    #[test]
    fn missing_values_rank_last_or_not_at_all() {
        let values = [None, Some(8.0), None, Some(14.5)];
        assert_eq!(
            assign_ranks(&values, Unscored::RankLast),
            vec![Some(3), Some(2), Some(4), Some(1)]
        );
        assert_eq!(
            assign_ranks(&values, Unscored::Unranked),
            vec![None, Some(2), None, Some(1)]
        );
        assert!(assign_ranks(&[], Unscored::RankLast).is_empty());
    }

    #[test]
    fn ranks_are_a_permutation() {
        let values: Vec<Option<f64>> = (0..25).map(|i| Some(((i * 7) % 11) as f64)).collect();
        let mut ranks: Vec<i64> = assign_ranks(&values, Unscored::RankLast)
            .into_iter()
            .flatten()
            .collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (1..=25).collect::<Vec<_>>());
    }

    #[test]
    fn higher_values_always_rank_ahead() {
        let values: Vec<Option<f64>> = (0..25).map(|i| Some(((i * 7) % 11) as f64)).collect();
        let ranks = assign_ranks(&values, Unscored::RankLast);
        for i in 0..values.len() {
            for j in 0..values.len() {
                if values[i] > values[j] {
                    assert!(ranks[i] < ranks[j], "{:?} vs {:?}", values[i], values[j]);
                }
            }
        }
    }
}
