//! Fee headers and per-student fee rows, keyed by student, header, year and
//! semester.

use crate::catalog::{required_name, stage_structure, AcademicSnapshot};
use crate::db::now_rfc3339;
use crate::error::{conflict_on_unique, AdminError, AdminResult};
use crate::scope::AccessScope;
use crate::students::get_student;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeHeader {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFee {
    pub id: String,
    pub student_id: String,
    pub fee_header_id: String,
    pub fee_header_name: String,
    pub year: i64,
    pub semester: i64,
    pub amount: f64,
    pub paid_amount: f64,
    pub status: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct FeeUpsert {
    pub student_id: String,
    pub fee_header_id: String,
    pub year: i64,
    pub semester: i64,
    pub amount: f64,
    pub paid_amount: f64,
}

fn fee_status(amount: f64, paid: f64) -> &'static str {
    if paid <= 0.0 {
        "pending"
    } else if paid < amount {
        "partial"
    } else {
        "paid"
    }
}

fn header_from_row(r: &Row<'_>) -> rusqlite::Result<FeeHeader> {
    Ok(FeeHeader {
        id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        is_active: r.get::<_, i64>(3)? != 0,
    })
}

pub fn list_fee_headers(conn: &Connection) -> rusqlite::Result<Vec<FeeHeader>> {
    let mut stmt =
        conn.prepare("SELECT id, name, description, is_active FROM fee_headers ORDER BY name")?;
    let rows = stmt.query_map([], header_from_row)?;
    rows.collect()
}

pub fn create_fee_header(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> AdminResult<FeeHeader> {
    let name = required_name(name, "name")?;
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO fee_headers(id, name, description, is_active, created_at) VALUES(?, ?, ?, 1, ?)",
        (&id, &name, &description, now_rfc3339()),
    )
    .map_err(|e| conflict_on_unique(e, format!("Fee header '{name}' already exists")))?;
    Ok(FeeHeader {
        id,
        name,
        description,
        is_active: true,
    })
}

/// Inserts or replaces the amounts of one `(student, header, year, semester)`
/// row. The stage must exist in the student's course structure.
pub fn upsert_student_fee(
    conn: &Connection,
    scope: &AccessScope,
    fee: &FeeUpsert,
) -> AdminResult<StudentFee> {
    let student = get_student(conn, scope, &fee.student_id)?;
    let header: Option<String> = conn
        .query_row(
            "SELECT id FROM fee_headers WHERE id = ?",
            [&fee.fee_header_id],
            |r| r.get(0),
        )
        .optional()?;
    if header.is_none() {
        return Err(AdminError::not_found("fee header", fee.fee_header_id.as_str()));
    }
    if !fee.amount.is_finite() || fee.amount < 0.0 {
        return Err(AdminError::bad_params("amount must be a non-negative number"));
    }
    if !fee.paid_amount.is_finite() || fee.paid_amount < 0.0 {
        return Err(AdminError::bad_params("paidAmount must be a non-negative number"));
    }

    let snapshot = AcademicSnapshot::load(conn)?;
    if let Some(course) = snapshot.course_named_anywhere(&student.course) {
        let branches = snapshot.branches_named(&course.id, &student.branch);
        let year_id = snapshot
            .academic_year_by_label(&student.batch)
            .map(|y| y.id.as_str());
        let branch = branches
            .iter()
            .find(|b| year_id.is_some() && b.academic_year_id.as_deref() == year_id)
            .or_else(|| branches.iter().find(|b| b.is_generic()))
            .copied();
        if !stage_structure(course, branch).contains(fee.year, fee.semester) {
            return Err(AdminError::bad_params(format!(
                "year {} semester {} is not a stage of course '{}'",
                fee.year, fee.semester, course.name
            )));
        }
    } else if fee.year < 1 || fee.semester < 1 {
        return Err(AdminError::bad_params("year and semester must be at least 1"));
    }

    let status = fee_status(fee.amount, fee.paid_amount);
    conn.execute(
        "INSERT INTO student_fees(id, student_id, fee_header_id, year, semester, amount, paid_amount, status, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, fee_header_id, year, semester) DO UPDATE SET
           amount = excluded.amount,
           paid_amount = excluded.paid_amount,
           status = excluded.status,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            &student.id,
            &fee.fee_header_id,
            fee.year,
            fee.semester,
            fee.amount,
            fee.paid_amount,
            status,
            now_rfc3339(),
        ),
    )?;
    info!(student_id = %student.id, year = fee.year, semester = fee.semester, status, "student fee saved");

    list_student_fees(conn, &AccessScope::unrestricted(), &student.id)?
        .into_iter()
        .find(|f| {
            f.fee_header_id == fee.fee_header_id && f.year == fee.year && f.semester == fee.semester
        })
        .ok_or_else(|| AdminError::not_found("student fee", student.id.as_str()))
}

pub fn list_student_fees(
    conn: &Connection,
    scope: &AccessScope,
    student_id: &str,
) -> AdminResult<Vec<StudentFee>> {
    let student = get_student(conn, scope, student_id)?;
    let mut stmt = conn.prepare(
        "SELECT f.id, f.student_id, f.fee_header_id, h.name, f.year, f.semester, f.amount,
                f.paid_amount, f.status, f.updated_at
         FROM student_fees f
         JOIN fee_headers h ON h.id = f.fee_header_id
         WHERE f.student_id = ?
         ORDER BY f.year, f.semester, h.name",
    )?;
    let rows = stmt.query_map([&student.id], |r| {
        Ok(StudentFee {
            id: r.get(0)?,
            student_id: r.get(1)?,
            fee_header_id: r.get(2)?,
            fee_header_name: r.get(3)?,
            year: r.get(4)?,
            semester: r.get(5)?,
            amount: r.get(6)?,
            paid_amount: r.get(7)?,
            status: r.get(8)?,
            updated_at: r.get(9)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::{seed, student};
    use crate::db;

    #[test]
    fn status_follows_paid_amount() {
        assert_eq!(fee_status(1000.0, 0.0), "pending");
        assert_eq!(fee_status(1000.0, 400.0), "partial");
        assert_eq!(fee_status(1000.0, 1000.0), "paid");
    }

    #[test]
    fn upsert_replaces_the_same_stage_row() {
        let conn = db::open_memory();
        seed(&conn);
        student(&conn, "S1", "Tech U", "B.Tech", "CSE", "2023-2027");
        let header = create_fee_header(&conn, "Tuition", Some("per semester")).expect("header");
        assert!(matches!(
            create_fee_header(&conn, "tuition", None),
            Err(AdminError::Conflict { .. })
        ));

        let scope = AccessScope::unrestricted();
        let mut fee = FeeUpsert {
            student_id: "S1".into(),
            fee_header_id: header.id.clone(),
            year: 1,
            semester: 2,
            amount: 50000.0,
            paid_amount: 0.0,
        };
        upsert_student_fee(&conn, &scope, &fee).expect("insert");
        fee.paid_amount = 20000.0;
        let saved = upsert_student_fee(&conn, &scope, &fee).expect("update");
        assert_eq!(saved.status, "partial");
        assert_eq!(list_student_fees(&conn, &scope, "S1").expect("list").len(), 1);

        fee.semester = 3;
        assert!(matches!(
            upsert_student_fee(&conn, &scope, &fee),
            Err(AdminError::BadParams(_))
        ));
    }

    #[test]
    fn fees_of_out_of_scope_students_are_hidden() {
        let conn = db::open_memory();
        seed(&conn);
        student(&conn, "S1", "Tech U", "B.Tech", "CSE", "2023-2027");
        let err = list_student_fees(&conn, &AccessScope::default(), "S1").expect_err("hidden");
        assert!(matches!(err, AdminError::NotFound { .. }));
    }
}
