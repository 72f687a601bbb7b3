use super::branch_students;
use crate::catalog::{
    check_semesters_per_year, check_total_years, check_year_semester_config, find_academic_year,
    metadata_text, optional_code, require_branch, require_college, require_course, required_name,
    BranchRecord, CollegeRecord, CourseRecord,
};
use crate::db::now_rfc3339;
use crate::error::{conflict_on_unique, AdminError, AdminResult};
use crate::structure::YearSemesterOverride;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde_json::Value;
use tracing::info;

/// `None` leaves a field unchanged; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct CollegePatch {
    pub name: Option<String>,
    pub code: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CoursePatch {
    pub name: Option<String>,
    pub code: Option<Option<String>>,
    pub total_years: Option<i64>,
    pub semesters_per_year: Option<i64>,
    pub year_semester_config: Option<Option<Vec<YearSemesterOverride>>>,
    pub is_active: Option<bool>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct BranchPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub total_years: Option<Option<i64>>,
    pub semesters_per_year: Option<Option<i64>>,
    pub year_semester_config: Option<Option<Vec<YearSemesterOverride>>>,
    pub academic_year_id: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub metadata: Option<Value>,
}

/// The stored row after an update, with the number of students re-pointed.
#[derive(Debug, Clone)]
pub struct Updated<T> {
    pub record: T,
    pub students_updated: usize,
}

fn renamed(old: &str, new: &str) -> bool {
    old != new
}

pub fn update_college(
    conn: &Connection,
    id: &str,
    patch: &CollegePatch,
) -> AdminResult<Updated<CollegeRecord>> {
    let current = require_college(conn, id)?;
    let name = match patch.name.as_deref() {
        Some(n) => required_name(n, "name")?,
        None => current.name.clone(),
    };
    let code = match &patch.code {
        Some(c) => optional_code(c.as_deref()),
        None => current.code.clone(),
    };
    let is_active = patch.is_active.unwrap_or(current.is_active);
    let metadata = metadata_text(patch.metadata.as_ref().or(Some(&current.metadata)));
    let now = now_rfc3339();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE colleges SET name = ?, code = ?, is_active = ?, metadata = ?, updated_at = ?
         WHERE id = ?",
        (&name, &code, is_active as i64, &metadata, &now, id),
    )
    .map_err(|e| conflict_on_unique(e, format!("College name or code already exists: '{name}'")))?;
    let students_updated = if renamed(&current.name, &name) {
        tx.execute(
            "UPDATE students SET college = ?, updated_at = ? WHERE college = ?",
            (&name, &now, &current.name),
        )?
    } else {
        0
    };
    tx.commit()?;

    if renamed(&current.name, &name) {
        info!(college_id = %id, from = %current.name, to = %name, students_updated, "college renamed");
    }
    Ok(Updated {
        record: require_college(conn, id)?,
        students_updated,
    })
}

pub fn update_course(
    conn: &Connection,
    id: &str,
    patch: &CoursePatch,
) -> AdminResult<Updated<CourseRecord>> {
    let current = require_course(conn, id)?;
    let name = match patch.name.as_deref() {
        Some(n) => required_name(n, "name")?,
        None => current.name.clone(),
    };
    let code = match &patch.code {
        Some(c) => optional_code(c.as_deref()),
        None => current.code.clone(),
    };
    let total_years = check_total_years(patch.total_years.unwrap_or(current.total_years))?;
    let semesters_per_year =
        check_semesters_per_year(patch.semesters_per_year.unwrap_or(current.semesters_per_year))?;
    let cfg_source = match &patch.year_semester_config {
        Some(c) => c.as_deref(),
        None => current.year_semester_config.as_deref(),
    };
    let cfg = check_year_semester_config(cfg_source, Some(total_years))?;
    let is_active = patch.is_active.unwrap_or(current.is_active);
    let metadata = metadata_text(patch.metadata.as_ref().or(Some(&current.metadata)));
    let now = now_rfc3339();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE courses
         SET name = ?, code = ?, total_years = ?, semesters_per_year = ?, year_semester_config = ?,
             is_active = ?, metadata = ?, updated_at = ?
         WHERE id = ?",
        (
            &name,
            &code,
            total_years,
            semesters_per_year,
            &cfg,
            is_active as i64,
            &metadata,
            &now,
            id,
        ),
    )
    .map_err(|e| conflict_on_unique(e, format!("Course name or code already exists: '{name}'")))?;
    // Course names are unique, so the old name identifies its students exactly.
    let students_updated = if renamed(&current.name, &name) {
        tx.execute(
            "UPDATE students SET course = ?, updated_at = ? WHERE course = ?",
            (&name, &now, &current.name),
        )?
    } else {
        0
    };
    tx.commit()?;

    if renamed(&current.name, &name) {
        info!(course_id = %id, from = %current.name, to = %name, students_updated, "course renamed");
    }
    Ok(Updated {
        record: require_course(conn, id)?,
        students_updated,
    })
}

pub fn update_branch(
    conn: &Connection,
    id: &str,
    patch: &BranchPatch,
) -> AdminResult<Updated<BranchRecord>> {
    let current = require_branch(conn, id)?;
    let course = require_course(conn, &current.course_id)?;
    let name = match patch.name.as_deref() {
        Some(n) => required_name(n, "name")?,
        None => current.name.clone(),
    };
    let code = match patch.code.as_deref() {
        Some(c) => required_name(c, "code")?,
        None => current.code.clone(),
    };
    let total_years = match patch.total_years {
        Some(v) => v.map(check_total_years).transpose()?,
        None => current.total_years,
    };
    let semesters_per_year = match patch.semesters_per_year {
        Some(v) => v.map(check_semesters_per_year).transpose()?,
        None => current.semesters_per_year,
    };
    let cfg_source = match &patch.year_semester_config {
        Some(c) => c.as_deref(),
        None => current.year_semester_config.as_deref(),
    };
    let cfg = check_year_semester_config(
        cfg_source,
        Some(total_years.unwrap_or(course.total_years)),
    )?;
    let academic_year_id = match &patch.academic_year_id {
        Some(v) => v.clone(),
        None => current.academic_year_id.clone(),
    };
    if let Some(year_id) = academic_year_id.as_deref() {
        if find_academic_year(conn, year_id)?.is_none() {
            return Err(AdminError::not_found("academic year", year_id));
        }
    }
    let is_active = patch.is_active.unwrap_or(current.is_active);
    let metadata = metadata_text(patch.metadata.as_ref().or(Some(&current.metadata)));
    let now = now_rfc3339();

    // Which students belong to this row is decided before the row changes.
    let (scope_sql, scope_params) = branch_students(conn, &current, &course)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE branches
         SET name = ?, code = ?, total_years = ?, semesters_per_year = ?, year_semester_config = ?,
             academic_year_id = ?, is_active = ?, metadata = ?, updated_at = ?
         WHERE id = ?",
        (
            &name,
            &code,
            total_years,
            semesters_per_year,
            &cfg,
            &academic_year_id,
            is_active as i64,
            &metadata,
            &now,
            id,
        ),
    )
    .map_err(|e| {
        conflict_on_unique(
            e,
            format!(
                "Branch '{name}' ({code}) already exists under course '{}' for this academic year",
                course.name
            ),
        )
    })?;
    let students_updated = if renamed(&current.name, &name) {
        let mut params: Vec<SqlValue> =
            vec![SqlValue::Text(name.clone()), SqlValue::Text(now.clone())];
        params.extend(scope_params);
        tx.execute(
            &format!("UPDATE students SET branch = ?, updated_at = ? WHERE {scope_sql}"),
            params_from_iter(params.iter()),
        )?
    } else {
        0
    };
    tx.commit()?;

    if renamed(&current.name, &name) {
        info!(
            branch_id = %id,
            course = %course.name,
            from = %current.name,
            to = %name,
            students_updated,
            "branch renamed"
        );
    }
    Ok(Updated {
        record: require_branch(conn, id)?,
        students_updated,
    })
}
