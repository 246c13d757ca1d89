//! The exam hierarchy. Every tier shares one set of sheet, record and stat
//! tables; an instance's tier decides where its scores come from.

use crate::error::{EngineError, EngineResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Base,
    General,
    Annual,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Base, Tier::General, Tier::Annual];

    pub fn level(self) -> i64 {
        match self {
            Tier::Base => 0,
            Tier::General => 1,
            Tier::Annual => 2,
        }
    }

    pub fn from_level(level: i64) -> EngineResult<Self> {
        Tier::ALL
            .into_iter()
            .find(|t| t.level() == level)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown exam tier {}", level)))
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" | "exam" | "0" => Ok(Tier::Base),
            "general" | "1" => Ok(Tier::General),
            "annual" | "2" => Ok(Tier::Annual),
            other => Err(EngineError::InvalidInput(format!(
                "tier must be one of: base, general, annual (got {})",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Base => "base",
            Tier::General => "general",
            Tier::Annual => "annual",
        }
    }

    /// The tier a roll-up into `self` reads from. Base scores are entered.
    pub fn child(self) -> Option<Tier> {
        match self {
            Tier::Base => None,
            Tier::General => Some(Tier::Base),
            Tier::Annual => Some(Tier::General),
        }
    }

    pub fn is_rolled_up(self) -> bool {
        self.child().is_some()
    }
}
