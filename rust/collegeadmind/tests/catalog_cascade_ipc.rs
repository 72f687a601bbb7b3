mod test_support;

use serde_json::json;
use test_support::{
    create_student, error_code, open_with_catalog, request, request_ok, spawn_sidecar,
    student_json,
};

#[test]
fn course_and_branch_renames_repoint_students() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, catalog) = open_with_catalog(&mut stdin, &mut reader, "collegeadmin-rename");
    let asha = create_student(&mut stdin, &mut reader, "s1", student_json("A1", "Asha", "B.Tech", "CSE"));
    create_student(&mut stdin, &mut reader, "s2", student_json("A2", "Ravi", "B.Tech", "CSE"));
    let kiran = create_student(&mut stdin, &mut reader, "s3", student_json("A3", "Kiran", "M.Tech", "CSE"));

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "courses.update",
        json!({ "courseId": catalog.btech_id, "name": "B.E." }),
    );
    assert_eq!(renamed["studentsUpdated"], 2);
    assert_eq!(renamed["course"]["name"], "B.E.");

    let asha_now = request_ok(&mut stdin, &mut reader, "g1", "students.get", json!({ "studentId": asha }));
    assert_eq!(asha_now["student"]["course"], "B.E.");
    let kiran_now = request_ok(&mut stdin, &mut reader, "g2", "students.get", json!({ "studentId": kiran }));
    assert_eq!(kiran_now["student"]["course"], "M.Tech");

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "branches.update",
        json!({ "branchId": catalog.mtech_cse_id, "name": "Computer Science" }),
    );
    assert_eq!(renamed["studentsUpdated"], 1);
    let kiran_now = request_ok(&mut stdin, &mut reader, "g3", "students.get", json!({ "studentId": kiran }));
    assert_eq!(kiran_now["student"]["branch"], "Computer Science");
    let asha_now = request_ok(&mut stdin, &mut reader, "g4", "students.get", json!({ "studentId": asha }));
    assert_eq!(asha_now["student"]["branch"], "CSE");

    // A rename that collides is rejected and leaves students alone.
    let resp = request(
        &mut stdin,
        &mut reader,
        "r3",
        "courses.update",
        json!({ "courseId": catalog.btech_id, "name": "M.Tech" }),
    );
    assert_eq!(error_code(&resp), Some("conflict"));
    let asha_now = request_ok(&mut stdin, &mut reader, "g5", "students.get", json!({ "studentId": asha }));
    assert_eq!(asha_now["student"]["course"], "B.E.");
}

#[test]
fn deletes_are_soft_blocked_or_cascading() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, catalog) = open_with_catalog(&mut stdin, &mut reader, "collegeadmin-delete");
    create_student(&mut stdin, &mut reader, "s1", student_json("A1", "Asha", "B.Tech", "CSE"));
    create_student(&mut stdin, &mut reader, "s2", student_json("A2", "Kiran", "M.Tech", "CSE"));

    let soft = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "branches.delete",
        json!({ "branchId": catalog.cse_id }),
    );
    assert_eq!(soft["mode"], "soft");
    let branches = request_ok(
        &mut stdin,
        &mut reader,
        "l1",
        "branches.list",
        json!({ "courseId": catalog.btech_id, "includeInactive": true }),
    );
    assert_eq!(branches["branches"][0]["isActive"], false);

    let blocked = request(
        &mut stdin,
        &mut reader,
        "d2",
        "courses.delete",
        json!({ "courseId": catalog.btech_id, "hard": true }),
    );
    assert_eq!(error_code(&blocked), Some("conflict"));
    assert_eq!(blocked.pointer("/error/details/blockers/branches"), Some(&json!(1)));
    assert_eq!(blocked.pointer("/error/details/blockers/students"), Some(&json!(1)));

    let cascaded = request_ok(
        &mut stdin,
        &mut reader,
        "d3",
        "colleges.delete",
        json!({ "collegeId": catalog.college_id, "cascade": "true" }),
    );
    assert_eq!(cascaded["mode"], "cascade");
    assert_eq!(cascaded["deletedStudents"], 2);
    assert_eq!(cascaded["deletedBranches"], 2);
    assert_eq!(cascaded["deletedCourses"], 2);

    let listed = request_ok(&mut stdin, &mut reader, "l2", "students.list", json!({}));
    assert_eq!(listed["total"], 0);
    let colleges = request_ok(
        &mut stdin,
        &mut reader,
        "l3",
        "colleges.list",
        json!({ "includeInactive": true }),
    );
    assert_eq!(colleges["colleges"], json!([]));
    let missing = request(
        &mut stdin,
        &mut reader,
        "g1",
        "courses.get",
        json!({ "courseId": catalog.mtech_id }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));
}

#[test]
fn per_year_branch_upgrades_the_generic_row() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, catalog) = open_with_catalog(&mut stdin, &mut reader, "collegeadmin-upgrade");
    let years = request_ok(&mut stdin, &mut reader, "y", "academicYears.list", json!({}));
    let year_id = years["academicYears"][0]["id"].as_str().expect("year id").to_string();

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "b1",
        "branches.create",
        json!({ "courseId": catalog.btech_id, "name": "CSE", "code": "CSE", "academicYearId": year_id }),
    );
    assert_eq!(created["upgraded"], true);
    assert_eq!(created["branch"]["id"], catalog.cse_id.as_str());

    let structure = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "courses.structure",
        json!({ "courseId": catalog.btech_id, "branchId": catalog.cse_id }),
    );
    assert_eq!(structure.pointer("/structure/totalYears"), Some(&json!(4)));
    assert_eq!(
        structure
            .pointer("/structure/years")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(4)
    );

    let wrong = request(
        &mut stdin,
        &mut reader,
        "s2",
        "courses.structure",
        json!({ "courseId": catalog.mtech_id, "branchId": catalog.cse_id }),
    );
    assert_eq!(error_code(&wrong), Some("bad_params"));
}
