use crate::exams;
use crate::ipc::error::no_workspace;
use crate::ipc::helpers::{get_optional_f64, get_optional_str, get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::tier::Tier;
use rusqlite::Connection;
use serde_json::{json, Value};

fn create(conn: &Connection, params: &Value, default_max: f64) -> Result<Value, HandlerErr> {
    let tenant_id = get_required_str(params, "tenantId")?;
    let year = get_required_str(params, "academicYear")?;
    let name = get_required_str(params, "name")?;
    let tier = Tier::parse(&get_optional_str(params, "tier").unwrap_or_else(|| "base".into()))?;
    let max_score = get_optional_f64(params, "maxScore").unwrap_or(default_max);
    let id = exams::create_exam(conn, &tenant_id, &year, &name, tier, max_score)?;
    Ok(json!({ "examId": id, "tier": tier }))
}

fn link(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let parent = get_required_str(params, "parentExamId")?;
    let child = get_required_str(params, "childExamId")?;
    let weight = get_optional_f64(params, "weight").unwrap_or(1.0);
    exams::link(conn, &parent, &child, weight)?;
    Ok(json!({ "links": exams::weight_links(conn, &parent)? }))
}

fn list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let tenant_id = get_required_str(params, "tenantId")?;
    let year = get_optional_str(params, "academicYear");
    let list = exams::list_exams(conn, &tenant_id, year.as_deref())?;
    Ok(json!({ "exams": list }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if !req.method.starts_with("exams.") {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(no_workspace(&req.id));
    };
    let result = match req.method.as_str() {
        "exams.create" => create(conn, &req.params, state.config.default_max_score),
        "exams.link" => link(conn, &req.params),
        "exams.list" => list(conn, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
