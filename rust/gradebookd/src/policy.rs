//! Tenant grading policy: score bands and the pass mark.
//!
//! Bands are stored as tenant JSON keyed by letter:
//! `{"A": {"min": 16, "max": 20, "description": "Excellent"}, ...}`.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Scores are kept on a two-decimal grid, so `[0, 9.99]` followed by
/// `[10, 11.99]` leaves no gap.
const BAND_STEP: f64 = 0.01;
const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandDef {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub letter: String,
    pub min: f64,
    pub max: f64,
    pub description: String,
}

impl Band {
    fn contains(&self, score: f64) -> bool {
        self.min <= score && score <= self.max
    }

    pub fn label(&self) -> &str {
        if self.description.is_empty() {
            &self.letter
        } else {
            &self.description
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradingPolicy {
    bands: Vec<Band>,
}

impl GradingPolicy {
    pub fn new(mut bands: Vec<Band>) -> Self {
        bands.sort_by(|a, b| a.min.partial_cmp(&b.min).unwrap_or(Ordering::Equal));
        Self { bands }
    }

    pub fn from_json(raw: &serde_json::Value) -> EngineResult<Self> {
        let defs: BTreeMap<String, BandDef> = serde_json::from_value(raw.clone())
            .map_err(|e| EngineError::InvalidPolicy(e.to_string()))?;
        Ok(Self::new(
            defs.into_iter()
                .map(|(letter, d)| Band {
                    letter,
                    min: d.min,
                    max: d.max,
                    description: d.description,
                })
                .collect(),
        ))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map: BTreeMap<&str, BandDef> = self
            .bands
            .iter()
            .map(|b| {
                (
                    b.letter.as_str(),
                    BandDef {
                        min: b.min,
                        max: b.max,
                        description: b.description.clone(),
                    },
                )
            })
            .collect();
        serde_json::to_value(map).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// The five-band scale installed for new tenants.
    pub fn standard() -> Self {
        let band = |letter: &str, min: f64, max: f64, description: &str| Band {
            letter: letter.to_string(),
            min,
            max,
            description: description.to_string(),
        };
        Self::new(vec![
            band("A", 16.0, 20.0, "Excellent"),
            band("B", 14.0, 15.99, "Very Good"),
            band("C", 12.0, 13.99, "Good"),
            band("D", 10.0, 11.99, "Average"),
            band("E", 0.0, 9.99, "Fail"),
        ])
    }

    fn band_for(&self, score: f64) -> EngineResult<&Band> {
        self.bands
            .iter()
            .find(|b| b.contains(score))
            .ok_or(EngineError::Policy { score })
    }

    pub fn classify(&self, score: f64) -> EngineResult<&str> {
        Ok(self.band_for(score)?.label())
    }

    pub fn letter(&self, score: f64) -> EngineResult<&str> {
        Ok(self.band_for(score)?.letter.as_str())
    }

    /// Bands must partition `[0, max_score]`.
    pub fn validate(&self, max_score: f64) -> EngineResult<()> {
        let Some(first) = self.bands.first() else {
            return Err(EngineError::InvalidPolicy(
                "at least one band is required".into(),
            ));
        };
        for b in &self.bands {
            if !b.min.is_finite() || !b.max.is_finite() || b.min > b.max {
                return Err(EngineError::InvalidPolicy(format!(
                    "band {} has an empty range [{}, {}]",
                    b.letter, b.min, b.max
                )));
            }
        }
        if first.min.abs() > EPS {
            return Err(EngineError::InvalidPolicy(format!(
                "lowest band {} starts at {} instead of 0",
                first.letter, first.min
            )));
        }
        for pair in self.bands.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if hi.min <= lo.max {
                return Err(EngineError::InvalidPolicy(format!(
                    "bands {} and {} overlap",
                    lo.letter, hi.letter
                )));
            }
            if hi.min - lo.max > BAND_STEP + EPS {
                return Err(EngineError::InvalidPolicy(format!(
                    "gap between bands {} and {} ({} .. {})",
                    lo.letter, hi.letter, lo.max, hi.min
                )));
            }
        }
        let last = &self.bands[self.bands.len() - 1];
        if (last.max - max_score).abs() > EPS {
            return Err(EngineError::InvalidPolicy(format!(
                "highest band {} ends at {} instead of {}",
                last.letter, last.max, max_score
            )));
        }
        Ok(())
    }
}

pub fn is_passing(score: f64, pass_mark: f64) -> bool {
    score >= pass_mark
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_returns_band_description() {
        let p = GradingPolicy::standard();
        assert_eq!(p.classify(17.5).unwrap(), "Excellent");
        assert_eq!(p.classify(10.0).unwrap(), "Average");
        assert_eq!(p.classify(9.99).unwrap(), "Fail");
        assert_eq!(p.classify(0.0).unwrap(), "Fail");
        assert_eq!(p.letter(14.0).unwrap(), "B");
    }

    #[test]
    fn classify_fails_outside_configured_bands() {
        let p = GradingPolicy::standard();
        let e = p.classify(20.5).unwrap_err();
        assert_eq!(e.code(), "policy_error");
    }

    #[test]
    fn json_roundtrip_preserves_bands() {
        let raw = json!({
            "P": {"min": 10, "max": 20, "description": "Pass"},
            "F": {"min": 0, "max": 9.99}
        });
        let p = GradingPolicy::from_json(&raw).unwrap();
        assert_eq!(p.bands[0].letter, "F");
        assert_eq!(p.classify(5.0).unwrap(), "F");
        assert_eq!(GradingPolicy::from_json(&p.to_json()).unwrap(), p);
        p.validate(20.0).unwrap();
    }

    #[test]
    fn validate_rejects_overlaps_gaps_and_short_coverage() {
        let overlap = GradingPolicy::from_json(&json!({
            "A": {"min": 10, "max": 20},
            "B": {"min": 0, "max": 10}
        }))
        .unwrap();
        assert!(overlap.validate(20.0).unwrap_err().to_string().contains("overlap"));

        let gap = GradingPolicy::from_json(&json!({
            "A": {"min": 12, "max": 20},
            "B": {"min": 0, "max": 9.99}
        }))
        .unwrap();
        assert!(gap.validate(20.0).unwrap_err().to_string().contains("gap"));

        let short = GradingPolicy::from_json(&json!({
            "A": {"min": 0, "max": 15}
        }))
        .unwrap();
        assert_eq!(short.validate(20.0).unwrap_err().code(), "bad_policy");

        assert!(GradingPolicy::new(vec![]).validate(20.0).is_err());
        GradingPolicy::standard().validate(20.0).unwrap();
    }

    #[test]
    fn passing_is_inclusive() {
        assert!(is_passing(10.0, 10.0));
        assert!(!is_passing(9.99, 10.0));
    }
}
