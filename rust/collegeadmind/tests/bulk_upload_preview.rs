mod test_support;

use serde_json::json;
use test_support::{error_code, open_with_catalog, request, request_ok, spawn_sidecar, write_file};

const THREE_ROWS: &str = "Admission No,Student Name,Gender,College,Course,Branch,Batch,Mobile,Blood Group\n\
A1,Asha,F,Tech U,B.Tech,CSE,2023-2027,9876543210,O+\n\
A2,Ravi,M,Tech U,B.Tech,ECE,2023-2027,9876543211,B+\n\
A1,Kiran,M,Tech U,B.Tech,CSE,2023-2027,9876543212,A+\n";

#[test]
fn three_row_csv_reports_branch_and_duplicate_issues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (workspace, catalog) = open_with_catalog(&mut stdin, &mut reader, "collegeadmin-preview");
    let csv = write_file(&workspace, "students.csv", THREE_ROWS);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "students.bulkUpload.preview",
        json!({
            "inPath": csv.to_string_lossy(),
            "mimeType": "text/csv",
            "formId": "students",
            "collegeId": catalog.college_id,
        }),
    );
    assert_eq!(preview.pointer("/summary/totalRows"), Some(&json!(3)));
    assert_eq!(preview.pointer("/summary/validCount"), Some(&json!(1)));
    assert_eq!(preview.pointer("/summary/invalidCount"), Some(&json!(2)));
    assert_eq!(preview["formId"], "students");
    assert_eq!(preview["unmappedHeaders"], json!(["Blood Group"]));

    let valid = &preview["validRecords"][0];
    assert_eq!(valid["rowNumber"], 1);
    assert_eq!(valid["sanitizedData"]["admissionNumber"], "A1");
    assert_eq!(valid["sanitizedData"]["gender"], "Female");
    assert!(valid["seal"].as_str().is_some());

    let invalid = preview["invalidRecords"].as_array().expect("invalid rows");
    let row2 = invalid.iter().find(|r| r["rowNumber"] == 2).expect("row 2");
    assert!(row2["issues"]
        .as_array()
        .expect("issues")
        .iter()
        .any(|i| i.as_str().unwrap_or("").contains("Branch 'ECE' not found")));
    let row3 = invalid.iter().find(|r| r["rowNumber"] == 3).expect("row 3");
    assert!(row3["issueDetails"]
        .as_array()
        .expect("details")
        .iter()
        .any(|i| i["kind"] == "duplicate_in_file"));
}

#[test]
fn preview_is_repeatable_and_side_effect_free() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (workspace, _) = open_with_catalog(&mut stdin, &mut reader, "collegeadmin-preview-idem");
    let csv = write_file(&workspace, "students.csv", THREE_ROWS);
    let params = json!({ "inPath": csv.to_string_lossy() });

    let first = request_ok(&mut stdin, &mut reader, "p1", "students.bulkUpload.preview", params.clone());
    let second = request_ok(&mut stdin, &mut reader, "p2", "students.bulkUpload.preview", params);
    assert_eq!(first["validRecords"], second["validRecords"]);
    assert_eq!(first["invalidRecords"], second["invalidRecords"]);

    let listed = request_ok(&mut stdin, &mut reader, "l1", "students.list", json!({}));
    assert_eq!(listed["total"], 0);
}

#[test]
fn unreadable_uploads_fail_the_request() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (workspace, _) = open_with_catalog(&mut stdin, &mut reader, "collegeadmin-preview-bad");

    let pdf = write_file(&workspace, "students.pdf", "%PDF-1.4");
    let resp = request(
        &mut stdin,
        &mut reader,
        "p1",
        "students.bulkUpload.preview",
        json!({ "inPath": pdf.to_string_lossy(), "mimeType": "application/pdf" }),
    );
    assert_eq!(error_code(&resp), Some("invalid_upload"));

    let header_only = write_file(&workspace, "empty.csv", "Student Name,Gender\n");
    let resp = request(
        &mut stdin,
        &mut reader,
        "p2",
        "students.bulkUpload.preview",
        json!({ "inPath": header_only.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), Some("invalid_upload"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "p3",
        "students.bulkUpload.preview",
        json!({ "inPath": workspace.join("missing.csv").to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), Some("io_error"));
}

#[test]
fn rows_outside_the_caller_scope_are_invalid() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (workspace, _) = open_with_catalog(&mut stdin, &mut reader, "collegeadmin-preview-scope");
    let csv = write_file(&workspace, "students.csv", THREE_ROWS);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "students.bulkUpload.preview",
        json!({
            "inPath": csv.to_string_lossy(),
            "scope": { "collegeNames": ["Tech U"], "courseNames": ["M.Tech"], "allBranches": true },
        }),
    );
    assert_eq!(preview.pointer("/summary/validCount"), Some(&json!(0)));
    let row1 = &preview["invalidRecords"][0];
    assert!(row1["issues"]
        .as_array()
        .expect("issues")
        .iter()
        .any(|i| i.as_str().unwrap_or("").contains("outside your access scope")));
}
