use crate::coordinator::{self, CellError, CellInput, MAX_BULK_CELLS};
use crate::ipc::error::{engine_err, err, no_workspace, ok};
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn cell_from(params: &Value) -> Result<CellInput, HandlerErr> {
    Ok(CellInput {
        student_id: get_required_str(params, "studentId")?,
        class_subject_id: get_required_str(params, "classSubjectId")?,
        value: params.get("value").cloned().unwrap_or(Value::Null),
    })
}

fn handle_scores_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let exam_id = match get_required_str(&req.params, "examId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match get_required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let cell = match cell_from(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match coordinator::save_score(conn, &mut state.cache, &exam_id, &class_id, &cell) {
        Ok(outcome) => ok(&req.id, json!(outcome)),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_scores_bulk_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let exam_id = match get_required_str(&req.params, "examId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match get_required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(cells_arr) = req.params.get("cells").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing cells[]", None);
    };

    if cells_arr.len() > MAX_BULK_CELLS {
        let rejected = cells_arr.len();
        return ok(
            &req.id,
            json!({
                "ok": true,
                "updated": 0,
                "nulls": [],
                "rejected": rejected,
                "limitExceeded": true,
                "errors": [{
                    "code": "too_many_cells",
                    "message": format!(
                        "bulk payload exceeds max cells: {} > {}",
                        rejected, MAX_BULK_CELLS
                    )
                }]
            }),
        );
    }

    // Malformed entries are reported alongside the engine's per-cell errors.
    let mut cells = Vec::with_capacity(cells_arr.len());
    let mut malformed: Vec<CellError> = Vec::new();
    for entry in cells_arr {
        match cell_from(entry) {
            Ok(c) => cells.push(c),
            Err(e) => malformed.push(CellError {
                student_id: entry
                    .get("studentId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                class_subject_id: entry
                    .get("classSubjectId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                code: e.code,
                message: e.message,
            }),
        }
    }

    match coordinator::bulk_save_scores(conn, &mut state.cache, &exam_id, &class_id, &cells) {
        Ok(mut outcome) => {
            outcome.rejected += malformed.len();
            outcome.errors.extend(malformed);
            ok(
                &req.id,
                json!({
                    "ok": true,
                    "updated": outcome.updated,
                    "nulls": outcome.nulls,
                    "rejected": outcome.rejected,
                    "errors": outcome.errors,
                    "staleParents": outcome.stale_parents
                }),
            )
        }
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.set" => Some(handle_scores_set(state, req)),
        "scores.bulkSet" => Some(handle_scores_bulk_set(state, req)),
        _ => None,
    }
}
