//! Process-level engine settings.
//!
//! Precedence, lowest first: built-in defaults, `gradebookd.json` in the
//! workspace directory, `GRADEBOOKD_*` environment variables. Tenant-level
//! settings (grading policy, pass mark) live in the `tenants` table instead.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "gradebookd.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub cache_ttl_secs: u64,
    pub busy_timeout_ms: u64,
    pub default_pass_mark: f64,
    pub default_max_score: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            busy_timeout_ms: 5000,
            default_pass_mark: 10.0,
            default_max_score: 20.0,
        }
    }
}

impl EngineConfig {
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE_NAME);
        let mut cfg = if path.is_file() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str::<EngineConfig>(&text)?
        } else {
            EngineConfig::default()
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("GRADEBOOKD_CACHE_TTL_SECS").and_then(|s| s.trim().parse().ok()) {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = get("GRADEBOOKD_BUSY_TIMEOUT_MS").and_then(|s| s.trim().parse().ok()) {
            self.busy_timeout_ms = v;
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
