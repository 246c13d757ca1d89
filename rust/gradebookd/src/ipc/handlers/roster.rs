use crate::ipc::error::no_workspace;
use crate::ipc::helpers::{
    get_optional_f64, get_optional_i64, get_optional_str, get_required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use rusqlite::Connection;
use serde_json::{json, Value};

fn create_class(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let tenant_id = get_required_str(params, "tenantId")?;
    let name = get_required_str(params, "name")?;
    let year = get_required_str(params, "academicYear")?;
    let capacity = get_optional_i64(params, "capacity").unwrap_or(0);
    let id = roster::create_class(conn, &tenant_id, &name, &year, capacity)?;
    Ok(json!({ "classId": id }))
}

fn create_subject(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let tenant_id = get_required_str(params, "tenantId")?;
    let code = get_required_str(params, "code")?;
    let name = get_optional_str(params, "name").unwrap_or_else(|| code.clone());
    let credit = get_optional_f64(params, "defaultCredit").unwrap_or(1.0);
    let id = roster::create_subject(conn, &tenant_id, &code, &name, credit)?;
    Ok(json!({ "subjectId": id }))
}

fn add_class_subject(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let id = roster::add_class_subject(
        conn,
        &class_id,
        &subject_id,
        get_optional_f64(params, "credit"),
        get_optional_i64(params, "maxStudents"),
    )?;
    Ok(json!({ "classSubjectId": id }))
}

fn create_student(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let tenant_id = get_required_str(params, "tenantId")?;
    let last = get_required_str(params, "lastName")?;
    let first = get_required_str(params, "firstName")?;
    let class_id = get_optional_str(params, "classId");
    let id = roster::create_student(conn, &tenant_id, class_id.as_deref(), &last, &first)?;
    Ok(json!({ "studentId": id }))
}

/// `academicYear` defaults to the year of the class the subject belongs to.
fn enrollment_year(
    conn: &Connection,
    params: &Value,
    class_subject_id: &str,
) -> Result<String, HandlerErr> {
    if let Some(year) = get_optional_str(params, "academicYear") {
        return Ok(year);
    }
    Ok(roster::class_subject_year(conn, class_subject_id)?)
}

fn enroll(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let cs_id = get_required_str(params, "classSubjectId")?;
    let year = enrollment_year(conn, params, &cs_id)?;
    roster::enroll(conn, &student_id, &cs_id, &year)?;
    Ok(json!({ "ok": true }))
}

fn unenroll(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let cs_id = get_required_str(params, "classSubjectId")?;
    let year = enrollment_year(conn, params, &cs_id)?;
    let changed = roster::unenroll(conn, &student_id, &cs_id, &year)?;
    Ok(json!({ "changed": changed }))
}

fn enroll_in_class(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_id = get_required_str(params, "classId")?;
    let outcome = roster::enroll_in_class(conn, &student_id, &class_id)?;
    Ok(json!(outcome))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "roster.createClass" => create_class,
        "roster.createSubject" => create_subject,
        "roster.addClassSubject" => add_class_subject,
        "roster.createStudent" => create_student,
        "roster.enroll" => enroll,
        "roster.unenroll" => unenroll,
        "roster.enrollInClass" => enroll_in_class,
        _ => return None,
    };
    let Some(conn) = state.db.as_ref() else {
        return Some(no_workspace(&req.id));
    };
    Some(respond(&req.id, handler(conn, &req.params)))
}
