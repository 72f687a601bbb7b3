use super::branch_students;
use crate::catalog::{
    branch_from_row, course_from_row, require_branch, require_college, require_course,
    BranchRecord, CourseRecord, BRANCH_COLUMNS, COURSE_COLUMNS,
};
use crate::db::now_rfc3339;
use crate::error::{AdminError, AdminResult};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde::Serialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Deactivate the row; dependents are left alone.
    Soft,
    /// Remove the row, refused while dependents exist.
    Hard,
    /// Remove the row and every dependent row.
    Cascade,
}

impl DeleteMode {
    pub fn from_flags(hard: bool, cascade: bool) -> Self {
        if cascade {
            Self::Cascade
        } else if hard {
            Self::Hard
        } else {
            Self::Soft
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub mode: DeleteMode,
    pub deleted_students: usize,
    pub deleted_branches: usize,
    pub deleted_courses: usize,
    pub deleted_fee_records: usize,
}

impl DeleteOutcome {
    fn new(mode: DeleteMode) -> Self {
        Self {
            mode,
            deleted_students: 0,
            deleted_branches: 0,
            deleted_courses: 0,
            deleted_fee_records: 0,
        }
    }
}

fn count(conn: &Connection, sql: &str, params: &[SqlValue]) -> rusqlite::Result<i64> {
    conn.query_row(sql, params_from_iter(params.iter()), |r| r.get(0))
}

fn count_students(conn: &Connection, cond: &str, params: &[SqlValue]) -> rusqlite::Result<i64> {
    count(
        conn,
        &format!("SELECT COUNT(*) FROM students WHERE {cond}"),
        params,
    )
}

/// Deletes matching students and their fee rows. Fee rows go first.
fn delete_students_where(
    conn: &Connection,
    cond: &str,
    params: &[SqlValue],
    out: &mut DeleteOutcome,
) -> rusqlite::Result<()> {
    out.deleted_fee_records += conn.execute(
        &format!("DELETE FROM student_fees WHERE student_id IN (SELECT id FROM students WHERE {cond})"),
        params_from_iter(params.iter()),
    )?;
    out.deleted_students += conn.execute(
        &format!("DELETE FROM students WHERE {cond}"),
        params_from_iter(params.iter()),
    )?;
    Ok(())
}

fn text(v: &str) -> SqlValue {
    SqlValue::Text(v.to_string())
}

fn blocked(what: &str, name: &str, blockers: serde_json::Value) -> AdminError {
    let parts: Vec<String> = blockers
        .as_object()
        .map(|m| {
            m.iter()
                .filter(|(_, n)| n.as_i64().unwrap_or(0) > 0)
                .map(|(k, n)| format!("{n} {k}"))
                .collect()
        })
        .unwrap_or_default();
    AdminError::conflict_with(
        format!(
            "Cannot delete {what} '{name}': it still has {}. Deactivate it or delete with cascade.",
            parts.join(", ")
        ),
        json!({ "blockers": blockers }),
    )
}

fn has_blockers(blockers: &serde_json::Value) -> bool {
    blockers
        .as_object()
        .is_some_and(|m| m.values().any(|n| n.as_i64().unwrap_or(0) > 0))
}

fn deactivate(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<()> {
    conn.execute(
        &format!("UPDATE {table} SET is_active = 0, updated_at = ? WHERE id = ?"),
        (now_rfc3339(), id),
    )?;
    Ok(())
}

fn branches_of(conn: &Connection, course_id: &str) -> rusqlite::Result<Vec<BranchRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BRANCH_COLUMNS} FROM branches WHERE course_id = ?"
    ))?;
    let rows = stmt.query_map([course_id], branch_from_row)?;
    rows.collect()
}

fn courses_of(conn: &Connection, college_id: &str) -> rusqlite::Result<Vec<CourseRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE college_id = ?"
    ))?;
    let rows = stmt.query_map([college_id], course_from_row)?;
    rows.collect()
}

/// Branch students, then the branch rows, then the course's remaining
/// students, then the course row.
fn cascade_course(
    conn: &Connection,
    course: &CourseRecord,
    college_name: Option<&str>,
    out: &mut DeleteOutcome,
) -> rusqlite::Result<()> {
    let branches = branches_of(conn, &course.id)?;
    for branch in &branches {
        let (cond, params) = branch_students(conn, branch, course)?;
        delete_students_where(conn, &cond, &params, out)?;
    }
    out.deleted_branches += conn.execute("DELETE FROM branches WHERE course_id = ?", [&course.id])?;

    match college_name {
        Some(college) => delete_students_where(
            conn,
            "course = ? AND college = ?",
            &[text(&course.name), text(college)],
            out,
        )?,
        None => delete_students_where(conn, "course = ?", &[text(&course.name)], out)?,
    }
    out.deleted_courses += conn.execute("DELETE FROM courses WHERE id = ?", [&course.id])?;
    Ok(())
}

pub fn delete_college(conn: &Connection, id: &str, mode: DeleteMode) -> AdminResult<DeleteOutcome> {
    let college = require_college(conn, id)?;
    let mut out = DeleteOutcome::new(mode);
    match mode {
        DeleteMode::Soft => deactivate(conn, "colleges", id)?,
        DeleteMode::Hard => {
            let blockers = json!({
                "courses": count(conn, "SELECT COUNT(*) FROM courses WHERE college_id = ?", &[text(id)])?,
                "branches": count(
                    conn,
                    "SELECT COUNT(*) FROM branches b JOIN courses k ON k.id = b.course_id WHERE k.college_id = ?",
                    &[text(id)],
                )?,
                "students": count_students(conn, "college = ?", &[text(&college.name)])?,
            });
            if has_blockers(&blockers) {
                return Err(blocked("college", &college.name, blockers));
            }
            conn.execute("DELETE FROM colleges WHERE id = ?", [id])?;
        }
        DeleteMode::Cascade => {
            let tx = conn.unchecked_transaction()?;
            for course in courses_of(&tx, id)? {
                cascade_course(&tx, &course, Some(&college.name), &mut out)?;
            }
            delete_students_where(&tx, "college = ?", &[text(&college.name)], &mut out)?;
            tx.execute("DELETE FROM colleges WHERE id = ?", [id])?;
            tx.commit()?;
        }
    }
    info!(
        college_id = %id,
        name = %college.name,
        mode = ?mode,
        students = out.deleted_students,
        branches = out.deleted_branches,
        courses = out.deleted_courses,
        "college deleted"
    );
    Ok(out)
}

pub fn delete_course(conn: &Connection, id: &str, mode: DeleteMode) -> AdminResult<DeleteOutcome> {
    let course = require_course(conn, id)?;
    let mut out = DeleteOutcome::new(mode);
    match mode {
        DeleteMode::Soft => deactivate(conn, "courses", id)?,
        DeleteMode::Hard => {
            let blockers = json!({
                "branches": count(conn, "SELECT COUNT(*) FROM branches WHERE course_id = ?", &[text(id)])?,
                "students": count_students(conn, "course = ?", &[text(&course.name)])?,
            });
            if has_blockers(&blockers) {
                return Err(blocked("course", &course.name, blockers));
            }
            conn.execute("DELETE FROM courses WHERE id = ?", [id])?;
        }
        DeleteMode::Cascade => {
            let tx = conn.unchecked_transaction()?;
            cascade_course(&tx, &course, None, &mut out)?;
            tx.commit()?;
        }
    }
    info!(
        course_id = %id,
        name = %course.name,
        mode = ?mode,
        students = out.deleted_students,
        branches = out.deleted_branches,
        "course deleted"
    );
    Ok(out)
}

pub fn delete_branch(conn: &Connection, id: &str, mode: DeleteMode) -> AdminResult<DeleteOutcome> {
    let branch = require_branch(conn, id)?;
    let course = require_course(conn, &branch.course_id)?;
    let mut out = DeleteOutcome::new(mode);
    match mode {
        DeleteMode::Soft => deactivate(conn, "branches", id)?,
        DeleteMode::Hard => {
            let (cond, params) = branch_students(conn, &branch, &course)?;
            let blockers = json!({ "students": count_students(conn, &cond, &params)? });
            if has_blockers(&blockers) {
                return Err(blocked("branch", &branch.name, blockers));
            }
            conn.execute("DELETE FROM branches WHERE id = ?", [id])?;
        }
        DeleteMode::Cascade => {
            let tx = conn.unchecked_transaction()?;
            let (cond, params) = branch_students(&tx, &branch, &course)?;
            delete_students_where(&tx, &cond, &params, &mut out)?;
            out.deleted_branches += tx.execute("DELETE FROM branches WHERE id = ?", [id])?;
            tx.commit()?;
        }
    }
    info!(
        branch_id = %id,
        course = %course.name,
        name = %branch.name,
        mode = ?mode,
        students = out.deleted_students,
        "branch deleted"
    );
    Ok(out)
}
