//! Student rows. College, course and branch are stored by name; the cascade
//! engines keep them in step with the catalog.

use crate::catalog::AcademicSnapshot;
use crate::db::now_rfc3339;
use crate::error::{conflict_on_unique, AdminError, AdminResult};
use crate::scope::{AccessScope, ScopeTarget};
use crate::setup::UploadSettings;
use crate::upload::validate::{values_from_json, RowValidator, ValidationContext};
use crate::upload::{AdmissionNumbers, StudentDraft, StudentField, StudentStatus};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub admission_number: String,
    pub pin_no: Option<String>,
    pub student_name: String,
    pub gender: Option<String>,
    pub college: String,
    pub course: String,
    pub branch: String,
    pub batch: String,
    pub current_year: i64,
    pub current_semester: i64,
    pub student_status: String,
    pub student_mobile: Option<String>,
    pub parent_mobile: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const STUDENT_COLUMNS: &str = "id, admission_number, pin_no, student_name, gender, college, course, branch, batch, current_year, current_semester, student_status, student_mobile, parent_mobile, email, date_of_birth, father_name, mother_name, address, category, created_at, updated_at";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: r.get(0)?,
        admission_number: r.get(1)?,
        pin_no: r.get(2)?,
        student_name: r.get(3)?,
        gender: r.get(4)?,
        college: r.get(5)?,
        course: r.get(6)?,
        branch: r.get(7)?,
        batch: r.get(8)?,
        current_year: r.get(9)?,
        current_semester: r.get(10)?,
        student_status: r.get(11)?,
        student_mobile: r.get(12)?,
        parent_mobile: r.get(13)?,
        email: r.get(14)?,
        date_of_birth: r.get(15)?,
        father_name: r.get(16)?,
        mother_name: r.get(17)?,
        address: r.get(18)?,
        category: r.get(19)?,
        created_at: r.get(20)?,
        updated_at: r.get(21)?,
    })
}

fn owned(v: &Option<String>) -> String {
    v.as_deref().map(str::trim).unwrap_or_default().to_string()
}

/// Inserts one student from a draft whose required fields are present.
pub fn insert_student(
    conn: &Connection,
    d: &StudentDraft,
    admission_number: &str,
) -> rusqlite::Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    let status = d
        .student_status
        .clone()
        .unwrap_or_else(|| StudentStatus::Regular.as_str().to_string());
    conn.execute(
        "INSERT INTO students(
            id, admission_number, pin_no, student_name, gender, college, course, branch, batch,
            current_year, current_semester, student_status, student_mobile, parent_mobile, email,
            date_of_birth, father_name, mother_name, address, category, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &id,
            admission_number.trim(),
            &d.pin_no,
            owned(&d.student_name),
            &d.gender,
            owned(&d.college),
            owned(&d.course),
            owned(&d.branch),
            owned(&d.batch),
            d.current_year.unwrap_or(1),
            d.current_semester.unwrap_or(1),
            status,
            &d.student_mobile,
            &d.parent_mobile,
            &d.email,
            &d.date_of_birth,
            &d.father_name,
            &d.mother_name,
            &d.address,
            &d.category,
            &now,
            &now,
        ],
    )?;
    Ok(id)
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub college: Option<String>,
    pub course: Option<String>,
    pub branch: Option<String>,
    pub batch: Option<String>,
    /// Matches name, admission number or pin number.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPage {
    pub students: Vec<StudentRecord>,
    pub total: i64,
}

pub fn list_students(
    conn: &Connection,
    scope: &AccessScope,
    filter: &StudentFilter,
) -> rusqlite::Result<StudentPage> {
    let pred = scope.predicate(ScopeTarget::Students, "s");
    let mut conditions = vec![pred.sql()];
    let mut params: Vec<SqlValue> = pred.params.clone();
    for (column, value) in [
        ("college", &filter.college),
        ("course", &filter.course),
        ("branch", &filter.branch),
        ("batch", &filter.batch),
    ] {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            conditions.push(format!("s.{column} = ?"));
            params.push(SqlValue::Text(v.to_string()));
        }
    }
    if let Some(q) = filter.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        conditions.push(
            "(s.student_name LIKE ? OR s.admission_number LIKE ? OR IFNULL(s.pin_no, '') LIKE ?)"
                .to_string(),
        );
        let like = format!("%{q}%");
        for _ in 0..3 {
            params.push(SqlValue::Text(like.clone()));
        }
    }
    let where_sql = conditions.join(" AND ");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM students s WHERE {where_sql}"),
        params_from_iter(params.iter()),
        |r| r.get(0),
    )?;

    let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
    let offset = filter.offset.unwrap_or(0).max(0);
    params.push(SqlValue::Integer(limit));
    params.push(SqlValue::Integer(offset));
    let sql = format!(
        "SELECT {} FROM students s WHERE {where_sql}
         ORDER BY s.student_name, s.admission_number LIMIT ? OFFSET ?",
        crate::catalog::prefixed(STUDENT_COLUMNS, "s")
    );
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params_from_iter(params.iter()), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StudentPage { students, total })
}

/// Loads a student the scope can see. Out-of-scope rows read as missing.
pub fn get_student(conn: &Connection, scope: &AccessScope, id: &str) -> AdminResult<StudentRecord> {
    let pred = scope.predicate(ScopeTarget::Students, "s");
    let mut params: Vec<SqlValue> = vec![SqlValue::Text(id.to_string())];
    params.extend(pred.params.iter().cloned());
    let sql = format!(
        "SELECT {} FROM students s WHERE s.id = ? AND {}",
        crate::catalog::prefixed(STUDENT_COLUMNS, "s"),
        pred.sql()
    );
    conn.query_row(&sql, params_from_iter(params.iter()), student_from_row)
        .optional()?
        .ok_or_else(|| AdminError::not_found("student", id))
}

fn validate_single(
    conn: &Connection,
    scope: &AccessScope,
    values: &Map<String, Value>,
    exclude_id: Option<&str>,
) -> AdminResult<(StudentDraft, UploadSettings)> {
    let settings = UploadSettings::load(conn)?;
    let snapshot = AcademicSnapshot::load(conn)?;
    let values = values_from_json(values);

    let mut existing = HashSet::new();
    if let Some(adm) = values.get(&StudentField::AdmissionNumber) {
        let owner: Option<String> = conn
            .query_row(
                "SELECT id FROM students WHERE admission_number = ?",
                [adm],
                |r| r.get(0),
            )
            .optional()?;
        if owner.is_some() && owner.as_deref() != exclude_id {
            existing.insert(adm.to_lowercase());
        }
    }

    let mut validator = RowValidator::new(ValidationContext {
        snapshot: &snapshot,
        selected_college: None,
        scope,
        existing_admission_numbers: &existing,
        auto_generate_admission_numbers: settings.auto_generate_admission_numbers,
        default_status: settings.default_student_status,
    });
    let (draft, issues) = validator.validate_values(1, &values);
    if !issues.is_empty() {
        return Err(AdminError::Invalid {
            issues: issues.into_iter().map(|i| i.message).collect(),
        });
    }
    Ok((draft, settings))
}

/// Creates one student after running it through the row validator.
pub fn create_student(
    conn: &Connection,
    scope: &AccessScope,
    values: &Map<String, Value>,
) -> AdminResult<StudentRecord> {
    let (draft, settings) = validate_single(conn, scope, values, None)?;
    let admission = match draft.admission() {
        Some(a) => a.to_string(),
        None => AdmissionNumbers::new(&settings.admission_number_prefix)
            .next(conn, draft.batch.as_deref())?,
    };
    let id = insert_student(conn, &draft, &admission).map_err(|e| {
        conflict_on_unique(e, format!("Admission number '{admission}' already exists"))
    })?;
    info!(student_id = %id, admission = %admission, "student created");
    get_student(conn, &AccessScope::unrestricted(), &id)
}

/// Applies a partial update. The merged record is validated as a whole, so a
/// stage change is checked against the student's course and branch.
pub fn update_student(
    conn: &Connection,
    scope: &AccessScope,
    id: &str,
    patch: &Map<String, Value>,
) -> AdminResult<StudentRecord> {
    let current = get_student(conn, scope, id)?;
    let mut merged = match serde_json::to_value(&current) {
        Ok(Value::Object(m)) => m,
        _ => Map::new(),
    };
    for field in StudentField::ALL {
        if let Some(v) = patch.get(field.json_key()) {
            merged.insert(field.json_key().to_string(), v.clone());
        }
    }
    let (draft, _) = validate_single(conn, scope, &merged, Some(id))?;
    let Some(admission) = draft.admission().map(str::to_string) else {
        return Err(AdminError::bad_params("admissionNumber must not be empty"));
    };

    conn.execute(
        "UPDATE students SET
            admission_number = ?, pin_no = ?, student_name = ?, gender = ?, college = ?,
            course = ?, branch = ?, batch = ?, current_year = ?, current_semester = ?,
            student_status = ?, student_mobile = ?, parent_mobile = ?, email = ?,
            date_of_birth = ?, father_name = ?, mother_name = ?, address = ?, category = ?,
            updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            &admission,
            &draft.pin_no,
            owned(&draft.student_name),
            &draft.gender,
            owned(&draft.college),
            owned(&draft.course),
            owned(&draft.branch),
            owned(&draft.batch),
            draft.current_year.unwrap_or(1),
            draft.current_semester.unwrap_or(1),
            owned(&draft.student_status),
            &draft.student_mobile,
            &draft.parent_mobile,
            &draft.email,
            &draft.date_of_birth,
            &draft.father_name,
            &draft.mother_name,
            &draft.address,
            &draft.category,
            now_rfc3339(),
            id,
        ],
    )
    .map_err(|e| conflict_on_unique(e, format!("Admission number '{admission}' already exists")))?;
    get_student(conn, &AccessScope::unrestricted(), id)
}

/// Deletes a student and its fee rows. Returns the number of fee rows removed.
pub fn delete_student(conn: &Connection, scope: &AccessScope, id: &str) -> AdminResult<usize> {
    let student = get_student(conn, scope, id)?;
    let tx = conn.unchecked_transaction()?;
    let fees = tx.execute("DELETE FROM student_fees WHERE student_id = ?", [&student.id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [&student.id])?;
    tx.commit()?;
    info!(student_id = %student.id, fees_deleted = fees, "student deleted");
    Ok(fees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        create_academic_year, create_branch, create_college, create_course, NewBranch,
        NewCollege, NewCourse,
    };
    use crate::db;
    use serde_json::json;

    fn seed(conn: &Connection) {
        let college = create_college(
            conn,
            &NewCollege {
                name: "Tech U".into(),
                code: None,
                metadata: None,
            },
        )
        .expect("college");
        let course = create_course(
            conn,
            &NewCourse {
                college_id: college.id,
                name: "B.Tech".into(),
                code: None,
                total_years: 4,
                semesters_per_year: 2,
                year_semester_config: None,
                metadata: None,
            },
        )
        .expect("course");
        for name in ["CSE", "ECE"] {
            create_branch(
                conn,
                &NewBranch {
                    course_id: course.id.clone(),
                    name: name.into(),
                    code: name.into(),
                    total_years: None,
                    semesters_per_year: None,
                    year_semester_config: None,
                    academic_year_id: None,
                    metadata: None,
                },
            )
            .expect("branch");
        }
        create_academic_year(conn, "2023-2027").expect("year");
    }

    fn student(adm: &str, branch: &str) -> Map<String, Value> {
        match json!({
            "admissionNumber": adm,
            "studentName": "Asha",
            "gender": "F",
            "college": "Tech U",
            "course": "B.Tech",
            "branch": branch,
            "batch": "2023-2027",
            "studentMobile": "9876543210"
        }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn create_runs_validation_and_rejects_duplicates() {
        let conn = db::open_memory();
        seed(&conn);
        let scope = AccessScope::unrestricted();
        let s = create_student(&conn, &scope, &student("A1", "cse")).expect("create");
        assert_eq!(s.branch, "CSE");
        assert_eq!(s.current_year, 1);

        let err = create_student(&conn, &scope, &student("a1", "CSE")).expect_err("dup");
        assert_eq!(err.code(), "validation_failed");
        let err = create_student(&conn, &scope, &student("A2", "MECH")).expect_err("branch");
        assert!(err.to_string().contains("Branch 'MECH' not found"));
    }

    #[test]
    fn update_rechecks_stage_bounds_and_keeps_own_admission() {
        let conn = db::open_memory();
        seed(&conn);
        let scope = AccessScope::unrestricted();
        let s = create_student(&conn, &scope, &student("A1", "CSE")).expect("create");

        let mut patch = Map::new();
        patch.insert("currentYear".into(), json!(3));
        patch.insert("currentSemester".into(), json!(2));
        let updated = update_student(&conn, &scope, &s.id, &patch).expect("update");
        assert_eq!((updated.current_year, updated.current_semester), (3, 2));

        let mut patch = Map::new();
        patch.insert("currentSemester".into(), json!(3));
        assert!(matches!(
            update_student(&conn, &scope, &s.id, &patch),
            Err(AdminError::Invalid { .. })
        ));
    }

    #[test]
    fn list_and_get_respect_scope() {
        let conn = db::open_memory();
        seed(&conn);
        let all = AccessScope::unrestricted();
        let a = create_student(&conn, &all, &student("A1", "CSE")).expect("a");
        create_student(&conn, &all, &student("A2", "ECE")).expect("b");

        let cse_only = AccessScope {
            college_names: vec!["Tech U".into()],
            all_courses: true,
            branch_names: vec!["CSE".into()],
            ..AccessScope::default()
        };
        let page = list_students(&conn, &cse_only, &StudentFilter::default()).expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.students[0].id, a.id);

        let filtered = list_students(
            &conn,
            &all,
            &StudentFilter {
                search: Some("a2".into()),
                ..StudentFilter::default()
            },
        )
        .expect("search");
        assert_eq!(filtered.total, 1);

        let nothing = list_students(&conn, &AccessScope::default(), &StudentFilter::default())
            .expect("closed");
        assert_eq!(nothing.total, 0);
        assert!(matches!(
            get_student(&conn, &AccessScope::default(), &a.id),
            Err(AdminError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_removes_fee_rows() {
        let conn = db::open_memory();
        seed(&conn);
        let scope = AccessScope::unrestricted();
        let s = create_student(&conn, &scope, &student("A1", "CSE")).expect("create");
        let now = db::now_rfc3339();
        conn.execute(
            "INSERT INTO fee_headers(id, name, created_at) VALUES('h1', 'Tuition', ?1)",
            [&now],
        )
        .expect("header");
        conn.execute(
            "INSERT INTO student_fees(id, student_id, fee_header_id, year, semester, amount, status, updated_at)
             VALUES('f1', ?1, 'h1', 1, 1, 1000, 'due', ?2)",
            (&s.id, &now),
        )
        .expect("fee");
        assert_eq!(delete_student(&conn, &scope, &s.id).expect("delete"), 1);
        assert!(get_student(&conn, &scope, &s.id).is_err());
    }
}
