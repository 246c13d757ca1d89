use crate::cache::StatsCache;
use crate::config::EngineConfig;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "cachedEntries": state.cache.entry_count()
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    if let Err(e) = std::fs::create_dir_all(&path) {
        return err(&req.id, "db_open_failed", e.to_string(), None);
    }
    let config = match EngineConfig::load(&path) {
        Ok(c) => c,
        Err(e) => {
            return err(
                &req.id,
                "bad_config",
                format!("{e:?}"),
                Some(json!({ "file": crate::config::CONFIG_FILE_NAME })),
            )
        }
    };

    match db::open_db(&path, config.busy_timeout()) {
        Ok(conn) => {
            tracing::info!(workspace = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.cache = StatsCache::new(config.cache_ttl());
            state.config = config;
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "config": state.config
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
