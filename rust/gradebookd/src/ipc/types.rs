use std::path::PathBuf;

use crate::cache::StatsCache;
use crate::config::EngineConfig;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: EngineConfig,
    pub cache: StatsCache,
}

impl AppState {
    pub fn new() -> Self {
        let config = EngineConfig::default();
        Self {
            workspace: None,
            db: None,
            cache: StatsCache::new(config.cache_ttl()),
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
