mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, spawn_sidecar, temp_dir, Sidecar};

#[test]
fn methods_needing_a_workspace_fail_before_selection() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert_eq!(health["result"]["workspacePath"], json!(null));

    for (i, method) in ["tenant.create", "scores.set", "engine.rollUp", "results.get"]
        .iter()
        .enumerate()
    {
        let id = format!("nw-{}", i);
        let resp = request(&mut stdin, &mut reader, &id, method, json!({ "name": "x" }));
        assert_eq!(resp["ok"], json!(false), "{}", method);
        assert_eq!(resp["error"]["code"], json!("no_workspace"), "{}", method);
    }
}

#[test]
fn unknown_method_and_bad_json_are_reported() {
    let mut s = Sidecar::open("gradebook-ipc-smoke");
    let resp = s.call("grades.teleport", json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("not_implemented"));

    assert_eq!(s.err_code("tenant.create", json!({})), "bad_params");
    assert_eq!(
        s.err_code("sheets.get", json!({ "sheetId": "missing" })),
        "not_found"
    );

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(v["error"]["code"], json!("bad_json"));
}

#[test]
fn workspace_config_file_is_applied() {
    let workspace = temp_dir("gradebook-ipc-config");
    std::fs::write(
        workspace.join("gradebookd.json"),
        r#"{ "defaultPassMark": 12, "defaultMaxScore": 100 }"#,
    )
    .expect("write config");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], json!(true));
    assert_eq!(selected["result"]["config"]["defaultPassMark"], json!(12.0));
    assert_eq!(selected["result"]["config"]["cacheTtlSecs"], json!(3600));

    let tenant = request(&mut stdin, &mut reader, "2", "tenant.create", json!({ "name": "Lycee" }));
    let tenant_id = tenant["result"]["tenantId"].as_str().expect("tenantId").to_string();
    let got = request(&mut stdin, &mut reader, "3", "tenant.get", json!({ "tenantId": tenant_id }));
    assert_eq!(got["result"]["tenant"]["passMark"], json!(12.0));

    let broken = temp_dir("gradebook-ipc-bad-config");
    std::fs::write(broken.join("gradebookd.json"), "{ nope").expect("write config");
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": broken.to_string_lossy() }),
    );
    assert_eq!(resp["error"]["code"], json!("bad_config"));
}
