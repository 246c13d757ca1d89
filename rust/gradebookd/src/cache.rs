//! In-process read cache for statistics and results sheets.
//!
//! Entries are keyed by scope and tier and dropped for a whole scope after a
//! successful commit. The TTL only bounds staleness if an invalidation is
//! ever missed.

use crate::results::ResultsSheet;
use crate::stats::{ClassOverallStat, ClassSubjectStat};
use crate::store::Scope;
use crate::tier::Tier;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatItem {
    Subject(String),
    Overall,
    Results,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatKey {
    pub scope: Scope,
    pub tier: Tier,
    pub item: StatItem,
}

#[derive(Debug, Clone)]
pub enum CachedStat {
    Subject(Option<ClassSubjectStat>),
    Overall(Option<ClassOverallStat>),
    Results(Box<ResultsSheet>),
}

#[derive(Debug)]
pub struct StatsCache {
    ttl: Duration,
    entries: HashMap<StatKey, (Instant, CachedStat)>,
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &StatKey) -> Option<CachedStat> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&mut self, key: &StatKey, now: Instant) -> Option<CachedStat> {
        let (stored, value) = self.entries.get(key)?;
        if now.saturating_duration_since(*stored) >= self.ttl {
            self.entries.remove(key);
            return None;
        }
        Some(value.clone())
    }

    pub fn put(&mut self, key: StatKey, value: CachedStat) {
        self.put_at(key, value, Instant::now());
    }

    fn put_at(&mut self, key: StatKey, value: CachedStat, now: Instant) {
        self.entries.insert(key, (now, value));
    }

    /// Drops every entry for the scope, at any tier.
    pub fn invalidate_scope(&mut self, scope: &Scope) {
        self.entries.retain(|k, _| &k.scope != scope);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
