#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    /// Spawns the binary and selects a fresh workspace.
    pub fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Sidecar {
            _child: child,
            stdin,
            reader,
            next_id: 0,
        };
        s.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        s
    }

    pub fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let resp = self.call(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
        resp.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Returns the error code of a call expected to fail.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let resp = self.call(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            resp
        );
        resp.pointer("/error/code")
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    pub fn id(&mut self, method: &str, params: serde_json::Value, key: &str) -> String {
        self.ok(method, params)
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_else(|| panic!("{} missing {}", method, key))
            .to_string()
    }
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub const YEAR: &str = "2024-2025";

/// One school, one class with Mathematics (credit 4) and Physics (credit 3),
/// and one base exam.
pub struct School {
    pub tenant_id: String,
    pub class_id: String,
    pub math: String,
    pub physics: String,
    pub seq1: String,
}

pub fn setup_school(s: &mut Sidecar) -> School {
    let tenant_id = s.id("tenant.create", json!({ "name": "Lycee", "passMark": 10 }), "tenantId");
    let class_id = s.id(
        "roster.createClass",
        json!({ "tenantId": tenant_id, "name": "Form 1", "academicYear": YEAR }),
        "classId",
    );
    let m = s.id(
        "roster.createSubject",
        json!({ "tenantId": tenant_id, "code": "MATH", "name": "Mathematics", "defaultCredit": 4 }),
        "subjectId",
    );
    let p = s.id(
        "roster.createSubject",
        json!({ "tenantId": tenant_id, "code": "PHY", "name": "Physics", "defaultCredit": 3 }),
        "subjectId",
    );
    let math = s.id(
        "roster.addClassSubject",
        json!({ "classId": class_id, "subjectId": m }),
        "classSubjectId",
    );
    let physics = s.id(
        "roster.addClassSubject",
        json!({ "classId": class_id, "subjectId": p }),
        "classSubjectId",
    );
    let seq1 = s.id(
        "exams.create",
        json!({ "tenantId": tenant_id, "academicYear": YEAR, "name": "Sequence 1", "tier": "base" }),
        "examId",
    );
    School {
        tenant_id,
        class_id,
        math,
        physics,
        seq1,
    }
}

pub fn add_student(s: &mut Sidecar, school: &School, last: &str) -> String {
    let id = s.id(
        "roster.createStudent",
        json!({ "tenantId": school.tenant_id, "lastName": last, "firstName": "Test" }),
        "studentId",
    );
    s.ok(
        "roster.enrollInClass",
        json!({ "studentId": id, "classId": school.class_id }),
    );
    id
}

pub fn set_score(
    s: &mut Sidecar,
    exam_id: &str,
    class_id: &str,
    student_id: &str,
    class_subject_id: &str,
    value: serde_json::Value,
) -> serde_json::Value {
    s.ok(
        "scores.set",
        json!({
            "examId": exam_id,
            "classId": class_id,
            "studentId": student_id,
            "classSubjectId": class_subject_id,
            "value": value
        }),
    )
}
