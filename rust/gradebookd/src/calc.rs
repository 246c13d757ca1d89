use crate::policy::is_passing;
use serde::Serialize;

/// Half-up rounding onto the two-decimal grid used for every stored value.
/// The nudge absorbs binary representation error (12.345 * 100 = 1234.4999..).
pub fn round_2dp(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    sign * ((x.abs() * 100.0) + 0.5 + 1e-7).floor() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Remark {
    #[serde(rename = "PASSED")]
    Passed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl Remark {
    pub fn as_str(self) -> &'static str {
        match self {
            Remark::Passed => "PASSED",
            Remark::Failed => "FAILED",
        }
    }

    pub fn for_average(average: f64, pass_mark: f64) -> Self {
        if is_passing(average, pass_mark) {
            Remark::Passed
        } else {
            Remark::Failed
        }
    }
}

/// One score record as seen by the grade sheet: its score and subject credit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetLine {
    pub score: Option<f64>,
    pub credit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetTotals {
    pub total_score: f64,
    pub credits_attempted: f64,
    pub credits_obtained: f64,
    pub average: f64,
    pub remark: Remark,
}

/// Totals for a grade sheet. `average` is the literal `total / credits
/// attempted`; a subject counts as attempted once it has any score, and as
/// obtained when that score reaches the pass mark.
pub fn sheet_totals<I>(lines: I, pass_mark: f64) -> SheetTotals
where
    I: IntoIterator<Item = SheetLine>,
{
    let mut total = 0.0_f64;
    let mut attempted = 0.0_f64;
    let mut obtained = 0.0_f64;

    for line in lines {
        let Some(score) = line.score else {
            continue;
        };
        total += score;
        attempted += line.credit;
        if is_passing(score, pass_mark) {
            obtained += line.credit;
        }
    }

    let average = if attempted > 0.0 {
        round_2dp(total / attempted)
    } else {
        0.0
    };

    SheetTotals {
        total_score: round_2dp(total),
        credits_attempted: round_2dp(attempted),
        credits_obtained: round_2dp(obtained),
        average,
        remark: Remark::for_average(average, pass_mark),
    }
}

/// One lower-tier score feeding a roll-up, with its link weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub score: Option<f64>,
    pub weight: f64,
}

/// Weighted mean over contributions that actually carry a score. Children
/// with no score or a non-positive weight are left out of the denominator.
pub fn weighted_score<I>(contributions: I) -> Option<f64>
where
    I: IntoIterator<Item = Contribution>,
{
    let mut sum = 0.0_f64;
    let mut denom = 0.0_f64;
    for c in contributions {
        let Some(score) = c.score else {
            continue;
        };
        if c.weight <= 0.0 {
            continue;
        }
        sum += score * c.weight;
        denom += c.weight;
    }
    if denom > 0.0 {
        Some(round_2dp(sum / denom))
    } else {
        None
    }
}
