mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

const METHODS: &[&str] = &[
    "setup.get",
    "setup.update",
    "colleges.list",
    "colleges.get",
    "colleges.create",
    "colleges.update",
    "colleges.delete",
    "courses.list",
    "courses.get",
    "courses.create",
    "courses.update",
    "courses.delete",
    "courses.structure",
    "branches.list",
    "branches.create",
    "branches.update",
    "branches.delete",
    "academicYears.list",
    "academicYears.create",
    "students.list",
    "students.get",
    "students.create",
    "students.update",
    "students.delete",
    "students.bulkUpload.preview",
    "students.bulkUpload.commit",
    "templates.metadata",
    "templates.exportCsv",
    "fees.headers.list",
    "fees.headers.create",
    "fees.student.upsert",
    "fees.student.list",
];

#[test]
fn every_method_is_routed() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "h", "health", json!({}));
    assert!(health["version"].as_str().is_some());
    assert!(health["workspacePath"].is_null());

    // Without a workspace every data method answers no_workspace.
    for (i, method) in METHODS.iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("n{i}"), method, json!({}));
        assert_eq!(error_code(&resp), Some("no_workspace"), "{method}: {resp}");
    }

    let workspace = temp_dir("collegeadmin-smoke");
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("collegeadmin.sqlite3").is_file());

    for (i, method) in METHODS.iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("m{i}"), method, json!({}));
        assert_ne!(error_code(&resp), Some("not_implemented"), "{method}: {resp}");
        assert_ne!(error_code(&resp), Some("no_workspace"), "{method}: {resp}");
    }

    let unknown = request(&mut stdin, &mut reader, "u", "grades.compute", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));
}

#[test]
fn garbage_lines_get_bad_json() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(error_code(&value), Some("bad_json"));

    let missing_path = request(&mut stdin, &mut reader, "1", "workspace.select", json!({}));
    assert_eq!(error_code(&missing_path), Some("bad_params"));
}
