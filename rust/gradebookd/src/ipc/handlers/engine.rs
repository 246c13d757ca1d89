use crate::cache::StatsCache;
use crate::coordinator;
use crate::ipc::error::no_workspace;
use crate::ipc::helpers::{get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

type EngineHandler = fn(&Connection, &mut StatsCache, &Value) -> Result<Value, HandlerErr>;

fn recompute_grade_sheet(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let sheet_id = get_required_str(params, "sheetId")?;
    let outcome = coordinator::recompute_grade_sheet(conn, cache, &sheet_id)?;
    Ok(json!(outcome))
}

fn roll_up(conn: &Connection, cache: &mut StatsCache, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let outcome = coordinator::roll_up(conn, cache, &exam_id)?;
    Ok(json!({
        "sheets": outcome.sheets,
        "records": outcome.records,
        "scopes": outcome.scopes
    }))
}

fn rank_grade_sheets(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let ranked = coordinator::rank_grade_sheets(conn, cache, &exam_id, &class_id)?;
    Ok(json!({ "ranked": ranked }))
}

fn rank_score_records(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let cs_id = get_required_str(params, "classSubjectId")?;
    let ranked = coordinator::rank_score_records(conn, cache, &exam_id, &class_id, &cs_id)?;
    Ok(json!({ "ranked": ranked }))
}

fn update_class_subject_stat(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let cs_id = get_required_str(params, "classSubjectId")?;
    let stat =
        coordinator::update_class_subject_stat(conn, cache, &exam_id, &class_id, &cs_id)?;
    Ok(json!({ "stat": stat }))
}

fn update_class_overall_stat(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let stat = coordinator::update_class_overall_stat(conn, cache, &exam_id, &class_id)?;
    Ok(json!({ "stat": stat }))
}

fn refresh_scope(
    conn: &Connection,
    cache: &mut StatsCache,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let outcome = coordinator::refresh_scope(conn, cache, &exam_id, &class_id)?;
    Ok(json!(outcome))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: EngineHandler = match req.method.as_str() {
        "engine.recomputeGradeSheet" => recompute_grade_sheet,
        "engine.rollUp" => roll_up,
        "engine.rankGradeSheets" => rank_grade_sheets,
        "engine.rankScoreRecords" => rank_score_records,
        "engine.updateClassSubjectStat" => update_class_subject_stat,
        "engine.updateClassOverallStat" => update_class_overall_stat,
        "engine.refreshScope" => refresh_scope,
        _ => return None,
    };
    let Some(conn) = state.db.as_ref() else {
        return Some(no_workspace(&req.id));
    };
    Some(respond(&req.id, handler(conn, &mut state.cache, &req.params)))
}
