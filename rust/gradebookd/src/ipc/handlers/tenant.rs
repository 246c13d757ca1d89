use crate::coordinator;
use crate::ipc::error::{engine_err, no_workspace, ok};
use crate::ipc::helpers::{get_optional_f64, get_required_f64, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::tenant;
use serde_json::json;

fn handle_tenant_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let pass_mark =
        get_optional_f64(&req.params, "passMark").unwrap_or(state.config.default_pass_mark);

    match tenant::create_tenant(conn, &name, pass_mark) {
        Ok(id) => ok(&req.id, json!({ "tenantId": id })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_tenant_set_grading_policy(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let tenant_id = match get_required_str(&req.params, "tenantId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(bands) = req.params.get("bands") else {
        return HandlerErr::bad_params("missing bands").response(&req.id);
    };
    let max_score =
        get_optional_f64(&req.params, "maxScore").unwrap_or(state.config.default_max_score);

    match coordinator::set_grading_policy(conn, &mut state.cache, &tenant_id, bands, max_score) {
        Ok((policy, refreshed)) => ok(
            &req.id,
            json!({ "bands": policy.to_json(), "refreshedScopes": refreshed }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_tenant_set_pass_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let tenant_id = match get_required_str(&req.params, "tenantId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let pass_mark = match get_required_f64(&req.params, "passMark") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match coordinator::set_pass_mark(conn, &mut state.cache, &tenant_id, pass_mark) {
        Ok(refreshed) => ok(&req.id, json!({ "ok": true, "refreshedScopes": refreshed })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_tenant_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let tenant_id = match get_required_str(&req.params, "tenantId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match tenant::get_tenant(conn, &tenant_id) {
        Ok(t) => ok(&req.id, json!({ "tenant": t })),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tenant.create" => Some(handle_tenant_create(state, req)),
        "tenant.setGradingPolicy" => Some(handle_tenant_set_grading_policy(state, req)),
        "tenant.setPassMark" => Some(handle_tenant_set_pass_mark(state, req)),
        "tenant.get" => Some(handle_tenant_get(state, req)),
        _ => None,
    }
}
