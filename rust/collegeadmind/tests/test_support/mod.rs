#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
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

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, contents).expect("write fixture");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_collegeadmind");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn collegeadmind");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
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

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/error/code").and_then(|v| v.as_str())
}

pub struct Catalog {
    pub college_id: String,
    pub btech_id: String,
    pub mtech_id: String,
    pub cse_id: String,
    pub mtech_cse_id: String,
}

/// Opens a fresh workspace with "Tech U" offering B.Tech/CSE and M.Tech/CSE
/// and the 2023-2027 batch.
pub fn open_with_catalog(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> (PathBuf, Catalog) {
    let workspace = temp_dir(prefix);
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let college = request_ok(
        stdin,
        reader,
        "c1",
        "colleges.create",
        json!({ "name": "Tech U", "code": "TU" }),
    );
    let college_id = college["college"]["id"].as_str().expect("college id").to_string();
    let mut course = |id: &str, name: &str| {
        let res = request_ok(
            stdin,
            reader,
            id,
            "courses.create",
            json!({ "collegeId": college_id, "name": name, "totalYears": 4, "semestersPerYear": 2 }),
        );
        res["course"]["id"].as_str().expect("course id").to_string()
    };
    let btech_id = course("k1", "B.Tech");
    let mtech_id = course("k2", "M.Tech");
    let mut branch = |id: &str, course_id: &str| {
        let res = request_ok(
            stdin,
            reader,
            id,
            "branches.create",
            json!({ "courseId": course_id, "name": "CSE", "code": "CSE" }),
        );
        res["branch"]["id"].as_str().expect("branch id").to_string()
    };
    let cse_id = branch("b1", &btech_id);
    let mtech_cse_id = branch("b2", &mtech_id);
    request_ok(
        stdin,
        reader,
        "y1",
        "academicYears.create",
        json!({ "label": "2023-2027" }),
    );
    (
        workspace,
        Catalog {
            college_id,
            btech_id,
            mtech_id,
            cse_id,
            mtech_cse_id,
        },
    )
}

pub fn student_json(admission: &str, name: &str, course: &str, branch: &str) -> serde_json::Value {
    json!({
        "admissionNumber": admission,
        "studentName": name,
        "gender": "F",
        "college": "Tech U",
        "course": course,
        "branch": branch,
        "batch": "2023-2027",
        "studentMobile": "9876543210",
    })
}

pub fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student: serde_json::Value,
) -> String {
    let res = request_ok(stdin, reader, id, "students.create", json!({ "student": student }));
    res["student"]["id"].as_str().expect("student id").to_string()
}
