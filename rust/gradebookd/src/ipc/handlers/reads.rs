use crate::cache::StatsCache;
use crate::context::SqliteCollaborators;
use crate::error::EngineError;
use crate::ipc::error::no_workspace;
use crate::ipc::helpers::{get_optional_str, get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::results;
use crate::store::{self, resolve_scope};
use rusqlite::Connection;
use serde_json::{json, Value};

type ReadHandler = fn(&Connection, &mut StatsCache, &Value) -> Result<Value, HandlerErr>;

fn class_subject_stat(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let cs_id = get_required_str(params, "classSubjectId")?;
    let (exam, scope) = resolve_scope(conn, &exam_id, &class_id)?;
    let collab = SqliteCollaborators::new(conn);
    let stat = results::cached_subject_stat(&collab.context(conn), cache, &exam, &scope, &cs_id)?;
    Ok(json!({ "stat": stat }))
}

fn overall_stat(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let (exam, scope) = resolve_scope(conn, &exam_id, &class_id)?;
    let collab = SqliteCollaborators::new(conn);
    let stat = results::cached_overall_stat(&collab.context(conn), cache, &exam, &scope)?;
    Ok(json!({ "stat": stat }))
}

fn results_get(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let (exam, scope) = resolve_scope(conn, &exam_id, &class_id)?;
    let collab = SqliteCollaborators::new(conn);
    let sheet = results::cached_results_sheet(&collab.context(conn), cache, &exam, &scope)?;
    Ok(json!(sheet))
}

/// By `sheetId`, or by `examId` + `classId` + `studentId`.
fn sheet_get(conn: &Connection, _: &mut StatsCache, params: &Value) -> Result<Value, HandlerErr> {
    let sheet = match get_optional_str(params, "sheetId") {
        Some(id) => store::load_sheet(conn, &id)?,
        None => {
            let exam_id = get_required_str(params, "examId")?;
            let class_id = get_required_str(params, "classId")?;
            let student_id = get_required_str(params, "studentId")?;
            let (_, scope) = resolve_scope(conn, &exam_id, &class_id)?;
            store::find_sheet(conn, &student_id, &scope)?
                .ok_or_else(|| EngineError::not_found("grade sheet", student_id))?
        }
    };
    let records = store::records_for_sheet(conn, &sheet.id)?;
    Ok(json!({ "sheet": sheet, "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: ReadHandler = match req.method.as_str() {
        "stats.classSubject" => class_subject_stat,
        "stats.overall" => overall_stat,
        "results.get" => results_get,
        "sheets.get" => sheet_get,
        _ => return None,
    };
    let Some(conn) = state.db.as_ref() else {
        return Some(no_workspace(&req.id));
    };
    Some(respond(&req.id, handler(conn, &mut state.cache, &req.params)))
}
